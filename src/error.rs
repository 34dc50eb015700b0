use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("npy read error while {context}: {source}")]
    Npy {
        context: &'static str,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("shape mismatch: {message}")]
    ShapeMismatch { message: String },
    #[error("model call timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
    #[error("text front end produced no phonemes for {text:?}")]
    EmptyPhonemes { text: String },
    #[error("tone override has {given} entries but the phoneme sequence has {expected}")]
    InvalidTone { given: usize, expected: usize },
    #[error("language {language} is not supported by model version {version}")]
    UnsupportedLanguage { language: String, version: String },
    #[error("unknown style {name:?}")]
    UnknownStyle { name: String },
    #[error("style table integrity: {message}")]
    StyleIntegrity { message: String },
    #[error("model produced empty or silent audio after {attempts} attempt(s)")]
    EmptyOutput { attempts: usize },
    #[error("none of the {segments} segment(s) produced audio")]
    NoAudibleSegments { segments: usize },
    #[error("post-processing failed: {message}")]
    PostProcess { message: String },
}

impl SynthesisError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn npy(context: &'static str, source: ndarray_npy::ReadNpyError) -> Self {
        Self::Npy { context, source }
    }

    pub fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn style_integrity(message: impl Into<String>) -> Self {
        Self::StyleIntegrity {
            message: message.into(),
        }
    }

    pub(crate) fn post_process(message: impl Into<String>) -> Self {
        Self::PostProcess {
            message: message.into(),
        }
    }

    /// Stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
            Self::Npy { .. } => "npy",
            Self::Runtime { .. } => "runtime",
            Self::InvalidInput { .. } => "invalid_input",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::Timeout { .. } => "timeout",
            Self::EmptyPhonemes { .. } => "empty_phonemes",
            Self::InvalidTone { .. } => "invalid_tone",
            Self::UnsupportedLanguage { .. } => "unsupported_language",
            Self::UnknownStyle { .. } => "unknown_style",
            Self::StyleIntegrity { .. } => "style_integrity",
            Self::EmptyOutput { .. } => "empty_output",
            Self::NoAudibleSegments { .. } => "no_audible_segments",
            Self::PostProcess { .. } => "post_process",
        }
    }

    /// Whether another model call may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. } | Self::Timeout { .. } | Self::Runtime { .. }
        )
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(SynthesisError::invalid_input("x").kind(), "invalid_input");
        assert_eq!(SynthesisError::Timeout { elapsed_ms: 5 }.kind(), "timeout");
        assert_eq!(
            SynthesisError::EmptyOutput { attempts: 2 }.kind(),
            "empty_output"
        );
    }

    #[test]
    fn only_model_call_failures_are_retryable() {
        assert!(SynthesisError::shape_mismatch("bert 12 vs 10").is_retryable());
        assert!(SynthesisError::Timeout { elapsed_ms: 1 }.is_retryable());
        assert!(SynthesisError::runtime("forward", "oom").is_retryable());
        assert!(!SynthesisError::InvalidTone {
            given: 3,
            expected: 4
        }
        .is_retryable());
        assert!(!SynthesisError::UnknownStyle {
            name: "Angry".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn display_carries_context() {
        let err = SynthesisError::runtime("forward pass", "boom");
        assert_eq!(err.to_string(), "forward pass: boom");
        let err = SynthesisError::InvalidTone {
            given: 3,
            expected: 5,
        };
        assert!(err.to_string().contains("3 entries"));
    }
}
