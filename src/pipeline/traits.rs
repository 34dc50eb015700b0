use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::SynthesisError;
use crate::features::SegmentFeatures;
use crate::types::{AssistText, CleanedText, InferenceParams, Language};

/// Everything one forward pass of the acoustic model consumes.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub features: SegmentFeatures,
    pub style_vector: Array1<f32>,
    pub speaker_id: u32,
    pub params: InferenceParams,
}

/// The acoustic model. Implementations report tensor shape problems as
/// [`SynthesisError::ShapeMismatch`] so the caller can retry with zeroed tracks.
///
/// A panic inside [`ModelGateway::infer`] is caught whether or not a timeout is
/// configured and counts as a failed, retryable attempt
/// ([`SynthesisError::Runtime`]).
pub trait ModelGateway: Send + Sync {
    fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, SynthesisError>;

    fn device_label(&self) -> String {
        "unknown".to_string()
    }
}

pub trait TextFrontend: Send + Sync {
    /// Normalize `text` and convert it to phoneme symbols with tones.
    fn clean(&self, text: &str, language: Language) -> Result<CleanedText, SynthesisError>;

    /// Map symbols to `(phone_ids, tone_ids, language_ids)`, all of equal length.
    fn to_sequence(
        &self,
        phones: &[String],
        tones: &[i64],
        language: Language,
    ) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>), SynthesisError>;
}

pub trait EmbeddingExtractor: Send + Sync {
    /// Per-phoneme embeddings shaped `[dim, sum(word2ph)]`.
    fn extract(
        &self,
        norm_text: &str,
        word2ph: &[usize],
        language: Language,
        assist: Option<&AssistText>,
    ) -> Result<Array2<f32>, SynthesisError>;
}

/// Derives a style embedding from a reference clip.
pub trait StyleEncoder: Send + Sync {
    fn encode(&self, reference_audio: &Path) -> Result<Array1<f32>, SynthesisError>;
}

/// Loads a [`StyleEncoder`] for a device; results are cached per device.
pub trait StyleEncoderLoader: Send + Sync {
    fn load(&self, device: &str) -> Result<Arc<dyn StyleEncoder>, SynthesisError>;
}

pub trait WaveformPostProcessor: Send + Sync {
    fn process(&self, waveform: &[f32]) -> Result<Vec<i16>, SynthesisError>;
}
