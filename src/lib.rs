pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod reconcile;
pub mod segment;
pub mod style;
pub mod types;

pub use alignment::{maximum_path, maximum_path_from_mask, maximum_path_owned};
pub use config::{ModelHyperParams, SynthesisConfig};
pub use error::SynthesisError;
pub use features::{FeatureBuilder, LinguisticEmbeddings, SegmentFeatures};
pub use pipeline::builder::SynthesizerBuilder;
pub use pipeline::cache::ModelCache;
pub use pipeline::runtime::Synthesizer;
pub use pipeline::traits::{
    EmbeddingExtractor, ModelGateway, ModelInput, StyleEncoder, StyleEncoderLoader, TextFrontend,
    WaveformPostProcessor,
};
pub use style::StyleVectorStore;
pub use types::{
    AssistText, CleanedText, EmbeddingSlot, InferenceParams, Language, SynthesisRequest,
    SynthesisResult,
};
