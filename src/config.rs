use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SynthesisError;

pub const DEFAULT_SDP_RATIO: f32 = 0.2;
pub const DEFAULT_NOISE: f32 = 0.6;
pub const DEFAULT_NOISEW: f32 = 0.8;
pub const DEFAULT_LENGTH: f32 = 1.0;
pub const DEFAULT_LINE_SPLIT: bool = true;
pub const DEFAULT_SPLIT_INTERVAL: f32 = 0.5;
/// Longest gap a request may ask for between line segments, in seconds.
pub const MAX_SPLIT_INTERVAL: f32 = 60.0;
pub const DEFAULT_STYLE: &str = "Neutral";
pub const DEFAULT_STYLE_WEIGHT: f32 = 5.0;
pub const DEFAULT_ASSIST_TEXT_WEIGHT: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub config_path: String,
    pub style_vectors_path: String,
    pub device: String,
    /// Model calls per segment before the segment counts as failed.
    pub max_retries: usize,
    /// Upper bound for a single model call; `None` runs the call on the
    /// caller's thread and waits indefinitely. With a limit, each call runs on
    /// its own worker thread. A call that overruns is abandoned, not stopped:
    /// its thread keeps running until the gateway returns, so a gateway that
    /// never returns leaks one thread per timed-out attempt.
    pub inference_timeout: Option<Duration>,
}

impl SynthesisConfig {
    pub const DEFAULT_MAX_RETRIES: usize = 2;
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            config_path: String::new(),
            style_vectors_path: String::new(),
            device: "cpu".to_string(),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            inference_timeout: None,
        }
    }
}

/// Hyper-parameters shipped next to the model weights as `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelHyperParams {
    #[serde(default = "default_version")]
    pub version: String,
    pub data: DataParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataParams {
    pub sampling_rate: u32,
    #[serde(default)]
    pub spk2id: HashMap<String, u32>,
    #[serde(default)]
    pub style2id: Option<HashMap<String, usize>>,
    pub num_styles: usize,
    #[serde(default = "default_add_blank")]
    pub add_blank: bool,
}

fn default_version() -> String {
    "2.0".to_string()
}
fn default_add_blank() -> bool {
    true
}

impl ModelHyperParams {
    pub fn load(path: &Path) -> Result<Self, SynthesisError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| SynthesisError::io("read config.json", e))?;
        serde_json::from_str(&data).map_err(|e| SynthesisError::json("parse config.json", e))
    }

    /// JP-Extra checkpoints only carry the Japanese embedding input.
    pub fn is_jp_extra(&self) -> bool {
        self.version.ends_with("JP-Extra")
    }

    /// Style name table; checkpoints without one name their styles by index.
    pub fn style_table(&self) -> HashMap<String, usize> {
        match &self.data.style2id {
            Some(table) => table.clone(),
            None => (0..self.data.num_styles)
                .map(|i| (i.to_string(), i))
                .collect(),
        }
    }

    pub fn speaker_name(&self, speaker_id: u32) -> Option<&str> {
        self.data
            .spk2id
            .iter()
            .find(|(_, &id)| id == speaker_id)
            .map(|(name, _)| name.as_str())
    }
}
