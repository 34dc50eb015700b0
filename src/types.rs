use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_ASSIST_TEXT_WEIGHT, DEFAULT_LENGTH, DEFAULT_LINE_SPLIT, DEFAULT_NOISE, DEFAULT_NOISEW,
    DEFAULT_SDP_RATIO, DEFAULT_SPLIT_INTERVAL, DEFAULT_STYLE, DEFAULT_STYLE_WEIGHT,
};
use crate::error::SynthesisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "JP")]
    Jp,
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "ZH")]
    Zh,
}

/// Which of the model's three linguistic embedding inputs carries real features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSlot {
    Bert,
    JaBert,
    EnBert,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jp => "JP",
            Self::En => "EN",
            Self::Zh => "ZH",
        }
    }

    /// Slot populated by this language's embeddings. `None` means the checkpoint has
    /// no usable embedding for the language and every slot is zero-filled.
    pub fn embedding_slot(self) -> Option<EmbeddingSlot> {
        match self {
            Self::Jp => Some(EmbeddingSlot::JaBert),
            Self::En => Some(EmbeddingSlot::EnBert),
            Self::Zh => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JP" | "JA" => Ok(Self::Jp),
            "EN" => Ok(Self::En),
            "ZH" => Ok(Self::Zh),
            other => Err(SynthesisError::invalid_input(format!(
                "unknown language code {other:?}"
            ))),
        }
    }
}

/// Stochastic duration / variance controls forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub sdp_ratio: f32,
    pub noise_scale: f32,
    pub noise_scale_w: f32,
    /// Overall speaking rate; 1.0 is neutral, larger is slower.
    pub length_scale: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            sdp_ratio: DEFAULT_SDP_RATIO,
            noise_scale: DEFAULT_NOISE,
            noise_scale_w: DEFAULT_NOISEW,
            length_scale: DEFAULT_LENGTH,
        }
    }
}

/// Output of the text front end before symbols are mapped to ids.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedText {
    pub norm_text: String,
    pub phones: Vec<String>,
    pub tones: Vec<i64>,
    /// Phonemes contributed by each normalized character.
    pub word2ph: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistText {
    pub text: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: Language,
    pub speaker_id: u32,
    /// Derive the style from this clip instead of the named style.
    pub reference_audio_path: Option<PathBuf>,
    pub params: InferenceParams,
    pub line_split: bool,
    /// Seconds of silence between line segments.
    pub split_interval: f32,
    pub assist_text: Option<String>,
    pub assist_text_weight: f32,
    pub use_assist_text: bool,
    pub style: String,
    pub style_weight: f32,
    pub given_tone: Option<Vec<i64>>,
    /// Drop the leading boundary tokens of each segment.
    pub skip_start: bool,
    /// Drop the trailing boundary tokens of each segment.
    pub skip_end: bool,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            language: Language::Jp,
            speaker_id: 0,
            reference_audio_path: None,
            params: InferenceParams::default(),
            line_split: DEFAULT_LINE_SPLIT,
            split_interval: DEFAULT_SPLIT_INTERVAL,
            assist_text: None,
            assist_text_weight: DEFAULT_ASSIST_TEXT_WEIGHT,
            use_assist_text: false,
            style: DEFAULT_STYLE.to_string(),
            style_weight: DEFAULT_STYLE_WEIGHT,
            given_tone: None,
            skip_start: false,
            skip_end: false,
        }
    }
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Assist text actually in effect: only when enabled and non-empty.
    pub fn effective_assist(&self) -> Option<AssistText> {
        if !self.use_assist_text {
            return None;
        }
        self.assist_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| AssistText {
                text: t.to_string(),
                weight: self.assist_text_weight,
            })
    }

    /// Reference clip actually in effect; an empty path counts as none.
    pub fn effective_reference_audio(&self) -> Option<&Path> {
        self.reference_audio_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl SynthesisResult {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    pub fn save_wav(&self, path: &Path) -> Result<(), SynthesisError> {
        crate::audio::save_wav(&self.samples, path, self.sample_rate)
    }
}
