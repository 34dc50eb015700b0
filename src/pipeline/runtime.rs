use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ndarray::Array1;

use crate::audio::{canonical_silence, is_valid_waveform, silence};
use crate::config::{ModelHyperParams, MAX_SPLIT_INTERVAL};
use crate::error::SynthesisError;
use crate::features::{FeatureBuilder, SegmentFeatures};
use crate::pipeline::cache::ModelCache;
use crate::pipeline::traits::{
    ModelGateway, ModelInput, StyleEncoder, StyleEncoderLoader, WaveformPostProcessor,
};
use crate::segment;
use crate::style::StyleVectorStore;
use crate::types::{Language, SynthesisRequest, SynthesisResult};

pub(crate) struct StyleEncoderSource {
    pub loader: Box<dyn StyleEncoderLoader>,
    pub cache: Arc<ModelCache<dyn StyleEncoder>>,
}

/// Turns text into a waveform: segment planning, per-segment feature building,
/// bounded model retries, aggregation and PCM conversion.
pub struct Synthesizer {
    hyper_params: ModelHyperParams,
    style_store: StyleVectorStore,
    gateway: Arc<dyn ModelGateway>,
    features: FeatureBuilder,
    post_processor: Box<dyn WaveformPostProcessor>,
    style_encoder: Option<StyleEncoderSource>,
    device: String,
    max_retries: usize,
    inference_timeout: Option<Duration>,
}

pub(crate) struct SynthesizerParts {
    pub hyper_params: ModelHyperParams,
    pub style_store: StyleVectorStore,
    pub gateway: Arc<dyn ModelGateway>,
    pub features: FeatureBuilder,
    pub post_processor: Box<dyn WaveformPostProcessor>,
    pub style_encoder: Option<StyleEncoderSource>,
    pub device: String,
    pub max_retries: usize,
    pub inference_timeout: Option<Duration>,
}

impl Synthesizer {
    pub(crate) fn from_parts(parts: SynthesizerParts) -> Self {
        Self {
            hyper_params: parts.hyper_params,
            style_store: parts.style_store,
            gateway: parts.gateway,
            features: parts.features,
            post_processor: parts.post_processor,
            style_encoder: parts.style_encoder,
            device: parts.device,
            max_retries: parts.max_retries,
            inference_timeout: parts.inference_timeout,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.hyper_params.data.sampling_rate
    }

    pub fn hyper_params(&self) -> &ModelHyperParams {
        &self.hyper_params
    }

    pub fn style_store(&self) -> &StyleVectorStore {
        &self.style_store
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The fallback returned whenever no usable audio could be produced.
    pub fn silence(&self) -> SynthesisResult {
        SynthesisResult {
            sample_rate: self.sample_rate(),
            samples: canonical_silence(self.sample_rate()),
        }
    }

    /// Synthesize `request`, degrading to [`Synthesizer::silence`] on any failure.
    pub fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResult {
        match self.try_synthesize(request) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    kind = err.kind(),
                    error = %err,
                    text_len = request.text.chars().count(),
                    "synthesis failed, returning silence"
                );
                self.silence()
            }
        }
    }

    /// Like [`Synthesizer::synthesize`] but reports why synthesis failed.
    /// Text too short to plan any segment yields `Ok` silence.
    pub fn try_synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.check_language(request.language)?;
        self.check_speaker(request.speaker_id)?;
        check_split_interval(request.split_interval)?;

        let segments = segment::plan(&request.text, request.line_split);
        if segments.is_empty() {
            tracing::warn!(
                text_len = request.text.chars().count(),
                "text too short to synthesize, returning silence"
            );
            return Ok(self.silence());
        }

        let style_vector = self.resolve_style(request)?;
        let waveform = if request.line_split {
            self.synthesize_lines(&segments, request, &style_vector)?
        } else {
            self.synthesize_segment(&segments[0], request, &style_vector)?
        };
        self.finish(&waveform)
    }

    /// Total wrapper over [`Synthesizer::try_synthesize_multilang`].
    pub fn synthesize_multilang(
        &self,
        pieces: &[(String, Language)],
        request: &SynthesisRequest,
    ) -> SynthesisResult {
        match self.try_synthesize_multilang(pieces, request) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    kind = err.kind(),
                    error = %err,
                    pieces = pieces.len(),
                    "multi-language synthesis failed, returning silence"
                );
                self.silence()
            }
        }
    }

    /// Synthesize text whose pieces are in different languages with a single
    /// model call. Boundary tokens are dropped at the joins between pieces; the
    /// request's `skip_start` and `skip_end` control the outer edges.
    pub fn try_synthesize_multilang(
        &self,
        pieces: &[(String, Language)],
        request: &SynthesisRequest,
    ) -> Result<SynthesisResult, SynthesisError> {
        if pieces.is_empty() {
            tracing::warn!("no text pieces given, returning silence");
            return Ok(self.silence());
        }
        for (_, language) in pieces {
            self.check_language(*language)?;
        }
        self.check_speaker(request.speaker_id)?;
        let style_vector = self.resolve_style(request)?;

        let assist = request.effective_assist();
        let last = pieces.len() - 1;
        let mut parts = Vec::with_capacity(pieces.len());
        for (idx, (text, language)) in pieces.iter().enumerate() {
            let mut features = self
                .features
                .build(text, *language, assist.as_ref(), None)?;
            let skip_start = idx != 0 || request.skip_start;
            let skip_end = idx != last || request.skip_end;
            features.strip_boundaries(skip_start, skip_end);
            parts.push(features);
        }
        let features = SegmentFeatures::concat(&parts)?;
        if features.is_empty() {
            return Err(SynthesisError::EmptyPhonemes {
                text: pieces
                    .iter()
                    .map(|(text, _)| text.as_str())
                    .collect::<Vec<_>>()
                    .join(""),
            });
        }

        let waveform = self.infer_with_retry(&features, request, &style_vector)?;
        self.finish(&waveform)
    }

    fn check_language(&self, language: Language) -> Result<(), SynthesisError> {
        if self.hyper_params.is_jp_extra() && language != Language::Jp {
            return Err(SynthesisError::UnsupportedLanguage {
                language: language.to_string(),
                version: self.hyper_params.version.clone(),
            });
        }
        Ok(())
    }

    fn check_speaker(&self, speaker_id: u32) -> Result<(), SynthesisError> {
        if !self.hyper_params.data.spk2id.is_empty()
            && self.hyper_params.speaker_name(speaker_id).is_none()
        {
            return Err(SynthesisError::invalid_input(format!(
                "speaker id {speaker_id} is not in the model's speaker table"
            )));
        }
        Ok(())
    }

    fn resolve_style(&self, request: &SynthesisRequest) -> Result<Array1<f32>, SynthesisError> {
        let Some(reference) = request.effective_reference_audio() else {
            return self
                .style_store
                .vector_by_name(&request.style, request.style_weight);
        };
        let source = self.style_encoder.as_ref().ok_or_else(|| {
            SynthesisError::invalid_input("reference audio given but no style encoder is configured")
        })?;
        let encoder = source
            .cache
            .get_or_load(&self.device, |device| source.loader.load(device))?;
        let embedding = encoder.encode(reference)?;
        self.style_store.blend(&embedding, request.style_weight)
    }

    fn synthesize_lines(
        &self,
        segments: &[String],
        request: &SynthesisRequest,
        style_vector: &Array1<f32>,
    ) -> Result<Vec<f32>, SynthesisError> {
        let mut gap: Option<Vec<f32>> = None;
        let mut waveform = Vec::new();
        let mut emitted = 0usize;
        for (index, text) in segments.iter().enumerate() {
            match self.synthesize_segment(text, request, style_vector) {
                Ok(audio) => {
                    if emitted > 0 {
                        let gap = gap.get_or_insert_with(|| {
                            silence(request.split_interval, self.sample_rate())
                        });
                        waveform.extend_from_slice(gap);
                    }
                    waveform.extend(audio);
                    emitted += 1;
                }
                Err(err) => tracing::warn!(
                    segment = index,
                    kind = err.kind(),
                    error = %err,
                    "skipping segment"
                ),
            }
        }
        if emitted == 0 {
            return Err(SynthesisError::NoAudibleSegments {
                segments: segments.len(),
            });
        }
        tracing::debug!(
            emitted,
            planned = segments.len(),
            samples = waveform.len(),
            "segments aggregated"
        );
        Ok(waveform)
    }

    fn synthesize_segment(
        &self,
        text: &str,
        request: &SynthesisRequest,
        style_vector: &Array1<f32>,
    ) -> Result<Vec<f32>, SynthesisError> {
        let assist = request.effective_assist();
        let mut features = self.features.build(
            text,
            request.language,
            assist.as_ref(),
            request.given_tone.as_deref(),
        )?;
        features.strip_boundaries(request.skip_start, request.skip_end);
        if features.is_empty() {
            return Err(SynthesisError::EmptyPhonemes {
                text: text.to_string(),
            });
        }
        self.infer_with_retry(&features, request, style_vector)
    }

    /// Call the model until it returns a non-silent waveform or the attempt
    /// budget is spent. Errors that another call cannot fix end the loop early.
    fn infer_with_retry(
        &self,
        features: &SegmentFeatures,
        request: &SynthesisRequest,
        style_vector: &Array1<f32>,
    ) -> Result<Vec<f32>, SynthesisError> {
        let mut input = ModelInput {
            features: features.clone(),
            style_vector: style_vector.clone(),
            speaker_id: request.speaker_id,
            params: request.params,
        };
        input.features.reconcile();

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.infer_once(&input) {
                Ok(audio) if is_valid_waveform(&audio) => {
                    tracing::debug!(attempt, samples = audio.len(), "model call succeeded");
                    return Ok(audio);
                }
                Ok(audio) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        samples = audio.len(),
                        "model returned empty or silent audio"
                    );
                    last_error = None;
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        kind = err.kind(),
                        error = %err,
                        "model call failed"
                    );
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SynthesisError::EmptyOutput {
            attempts: self.max_retries,
        }))
    }

    /// One attempt. A shape failure is retried once with every auxiliary track
    /// zeroed; whatever that retry returns is the attempt's result.
    fn infer_once(&self, input: &ModelInput) -> Result<Vec<f32>, SynthesisError> {
        match self.call_gateway(input.clone()) {
            Err(err) if err.is_shape_mismatch() => {
                tracing::warn!(
                    error = %err,
                    "retrying model call with zeroed tone, language and embedding tracks"
                );
                let zeroed = ModelInput {
                    features: input.features.with_zeroed_auxiliaries(),
                    ..input.clone()
                };
                self.call_gateway(zeroed)
            }
            other => other,
        }
    }

    fn call_gateway(&self, input: ModelInput) -> Result<Vec<f32>, SynthesisError> {
        let Some(limit) = self.inference_timeout else {
            return guarded_infer(self.gateway.as_ref(), &input);
        };

        let gateway = Arc::clone(&self.gateway);
        let (tx, rx) = mpsc::sync_channel(1);
        let started = Instant::now();
        thread::Builder::new()
            .name("model-call".to_string())
            .spawn(move || {
                // The receiver is gone once the call has timed out.
                let _ = tx.send(guarded_infer(gateway.as_ref(), &input));
            })
            .map_err(|e| SynthesisError::io("spawn model call thread", e))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SynthesisError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(SynthesisError::runtime(
                "model call",
                "worker exited without a result",
            )),
        }
    }

    fn finish(&self, waveform: &[f32]) -> Result<SynthesisResult, SynthesisError> {
        let samples = self.post_processor.process(waveform)?;
        Ok(SynthesisResult {
            sample_rate: self.sample_rate(),
            samples,
        })
    }
}

fn check_split_interval(secs: f32) -> Result<(), SynthesisError> {
    if !(0.0..=MAX_SPLIT_INTERVAL).contains(&secs) {
        return Err(SynthesisError::invalid_input(format!(
            "split interval {secs}s is outside 0..={MAX_SPLIT_INTERVAL}s"
        )));
    }
    Ok(())
}

/// Run one model call, turning a panic inside the gateway into a retryable error.
fn guarded_infer(
    gateway: &dyn ModelGateway,
    input: &ModelInput,
) -> Result<Vec<f32>, SynthesisError> {
    panic::catch_unwind(AssertUnwindSafe(|| gateway.infer(input))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(SynthesisError::runtime("model call panicked", message))
    })
}
