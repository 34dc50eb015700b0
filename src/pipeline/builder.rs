use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelHyperParams, SynthesisConfig};
use crate::error::SynthesisError;
use crate::features::{FeatureBuilder, BERT_DIM};
use crate::pipeline::cache::ModelCache;
use crate::pipeline::defaults::Pcm16Converter;
use crate::pipeline::runtime::{StyleEncoderSource, Synthesizer, SynthesizerParts};
use crate::pipeline::traits::{
    EmbeddingExtractor, ModelGateway, StyleEncoder, StyleEncoderLoader, TextFrontend,
    WaveformPostProcessor,
};
use crate::style::StyleVectorStore;

pub struct SynthesizerBuilder {
    config: SynthesisConfig,
    hyper_params: Option<ModelHyperParams>,
    style_store: Option<StyleVectorStore>,
    gateway: Option<Arc<dyn ModelGateway>>,
    text_frontend: Option<Arc<dyn TextFrontend>>,
    embedding_extractor: Option<Arc<dyn EmbeddingExtractor>>,
    embedding_dim: usize,
    post_processor: Option<Box<dyn WaveformPostProcessor>>,
    style_encoder_loader: Option<Box<dyn StyleEncoderLoader>>,
    style_encoder_cache: Option<Arc<ModelCache<dyn StyleEncoder>>>,
}

impl SynthesizerBuilder {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            hyper_params: None,
            style_store: None,
            gateway: None,
            text_frontend: None,
            embedding_extractor: None,
            embedding_dim: BERT_DIM,
            post_processor: None,
            style_encoder_loader: None,
            style_encoder_cache: None,
        }
    }

    /// Use these hyper-parameters instead of reading `config_path`.
    pub fn with_hyper_params(mut self, hyper_params: ModelHyperParams) -> Self {
        self.hyper_params = Some(hyper_params);
        self
    }

    /// Use this style table instead of reading `style_vectors_path`.
    pub fn with_style_store(mut self, style_store: StyleVectorStore) -> Self {
        self.style_store = Some(style_store);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn ModelGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_text_frontend(mut self, text_frontend: Arc<dyn TextFrontend>) -> Self {
        self.text_frontend = Some(text_frontend);
        self
    }

    pub fn with_embedding_extractor(
        mut self,
        embedding_extractor: Arc<dyn EmbeddingExtractor>,
    ) -> Self {
        self.embedding_extractor = Some(embedding_extractor);
        self
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn with_post_processor(mut self, post_processor: Box<dyn WaveformPostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn with_style_encoder_loader(mut self, loader: Box<dyn StyleEncoderLoader>) -> Self {
        self.style_encoder_loader = Some(loader);
        self
    }

    /// Share an encoder cache between synthesizers built for the same process.
    pub fn with_style_encoder_cache(mut self, cache: Arc<ModelCache<dyn StyleEncoder>>) -> Self {
        self.style_encoder_cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Synthesizer, SynthesisError> {
        let hyper_params = match self.hyper_params {
            Some(hyper_params) => hyper_params,
            None => ModelHyperParams::load(Path::new(&self.config.config_path))?,
        };
        if hyper_params.data.sampling_rate == 0 {
            return Err(SynthesisError::invalid_input(
                "config.json declares a zero sampling rate",
            ));
        }

        let style_store = match self.style_store {
            Some(store) if store.num_styles() != hyper_params.data.num_styles => {
                return Err(SynthesisError::style_integrity(format!(
                    "number of styles ({}) does not match the number of style vectors ({})",
                    hyper_params.data.num_styles,
                    store.num_styles()
                )));
            }
            Some(store) => store,
            None => {
                StyleVectorStore::load(Path::new(&self.config.style_vectors_path), &hyper_params)?
            }
        };

        let gateway = self
            .gateway
            .ok_or_else(|| SynthesisError::invalid_input("a model gateway is required"))?;
        let text_frontend = self
            .text_frontend
            .ok_or_else(|| SynthesisError::invalid_input("a text front end is required"))?;
        let embedding_extractor = self.embedding_extractor.ok_or_else(|| {
            SynthesisError::invalid_input("an embedding extractor is required")
        })?;

        let max_retries = if self.config.max_retries == 0 {
            SynthesisConfig::DEFAULT_MAX_RETRIES
        } else {
            self.config.max_retries
        };

        let style_encoder = self.style_encoder_loader.map(|loader| StyleEncoderSource {
            loader,
            cache: self
                .style_encoder_cache
                .unwrap_or_else(|| Arc::new(ModelCache::new())),
        });

        tracing::info!(
            version = %hyper_params.version,
            sample_rate = hyper_params.data.sampling_rate,
            styles = style_store.num_styles(),
            device = %self.config.device,
            gateway = %gateway.device_label(),
            "synthesizer ready"
        );

        let features = FeatureBuilder::new(
            text_frontend,
            embedding_extractor,
            hyper_params.data.add_blank,
        )
        .with_embedding_dim(self.embedding_dim);

        Ok(Synthesizer::from_parts(SynthesizerParts {
            hyper_params,
            style_store,
            gateway,
            features,
            post_processor: self
                .post_processor
                .unwrap_or_else(|| Box::new(Pcm16Converter)),
            style_encoder,
            device: self.config.device,
            max_retries,
            inference_timeout: self.config.inference_timeout,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use ndarray::Array2;
    use ndarray_npy::WriteNpyExt;

    use super::*;
    use crate::pipeline::traits::ModelInput;
    use crate::types::{AssistText, CleanedText, Language};

    struct MockGateway;

    impl ModelGateway for MockGateway {
        fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, SynthesisError> {
            Ok(vec![0.5; input.features.len()])
        }

        fn device_label(&self) -> String {
            "mock".to_string()
        }
    }

    struct MockFrontend;

    impl TextFrontend for MockFrontend {
        fn clean(&self, text: &str, _language: Language) -> Result<CleanedText, SynthesisError> {
            let phones: Vec<String> = text.chars().map(|c| c.to_string()).collect();
            Ok(CleanedText {
                norm_text: text.to_string(),
                tones: vec![0; phones.len()],
                word2ph: vec![1; phones.len()],
                phones,
            })
        }

        fn to_sequence(
            &self,
            phones: &[String],
            tones: &[i64],
            _language: Language,
        ) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>), SynthesisError> {
            Ok((vec![1; phones.len()], tones.to_vec(), vec![0; phones.len()]))
        }
    }

    struct MockExtractor;

    impl EmbeddingExtractor for MockExtractor {
        fn extract(
            &self,
            _norm_text: &str,
            word2ph: &[usize],
            _language: Language,
            _assist: Option<&AssistText>,
        ) -> Result<Array2<f32>, SynthesisError> {
            Ok(Array2::ones((4, word2ph.iter().sum())))
        }
    }

    const MINIMAL_CONFIG_JSON: &str = r#"{
        "version": "2.0",
        "data": {
            "sampling_rate": 44100,
            "spk2id": {"mori": 0},
            "style2id": {"Neutral": 0, "Happy": 1},
            "num_styles": 2,
            "add_blank": false
        }
    }"#;

    fn write_fixtures(dir: &Path, styles: usize) -> SynthesisConfig {
        let config_path = dir.join("config.json");
        let style_path = dir.join("style_vectors.npy");
        std::fs::write(&config_path, MINIMAL_CONFIG_JSON).expect("write config");
        Array2::<f32>::zeros((styles, 3))
            .write_npy(File::create(&style_path).expect("create npy"))
            .expect("write npy");
        SynthesisConfig {
            config_path: config_path.to_string_lossy().to_string(),
            style_vectors_path: style_path.to_string_lossy().to_string(),
            ..SynthesisConfig::default()
        }
    }

    fn with_mocks(builder: SynthesizerBuilder) -> SynthesizerBuilder {
        builder
            .with_gateway(Arc::new(MockGateway))
            .with_text_frontend(Arc::new(MockFrontend))
            .with_embedding_extractor(Arc::new(MockExtractor))
            .with_embedding_dim(4)
    }

    #[test]
    fn build_success_with_mocks_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixtures(dir.path(), 2);
        let synthesizer = with_mocks(SynthesizerBuilder::new(config))
            .build()
            .expect("build should succeed");
        assert_eq!(synthesizer.sample_rate(), 44_100);
        assert_eq!(synthesizer.style_store().num_styles(), 2);
    }

    #[test]
    fn build_fails_on_invalid_config_path() {
        let config = SynthesisConfig {
            config_path: "/nonexistent/config.json".to_string(),
            ..SynthesisConfig::default()
        };
        let err = with_mocks(SynthesizerBuilder::new(config))
            .build()
            .err()
            .expect("missing config must fail");
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn build_fails_when_style_rows_disagree_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixtures(dir.path(), 3);
        let err = with_mocks(SynthesizerBuilder::new(config))
            .build()
            .err()
            .expect("style mismatch must fail");
        assert_eq!(err.kind(), "style_integrity");
    }

    #[test]
    fn injected_style_store_is_checked_against_hyper_params() {
        let hps: ModelHyperParams = serde_json::from_str(MINIMAL_CONFIG_JSON).unwrap();
        let store = StyleVectorStore::from_parts(
            Array2::zeros((1, 3)),
            [("Neutral".to_string(), 0)].into_iter().collect(),
            1,
        )
        .unwrap();
        let err = with_mocks(SynthesizerBuilder::new(SynthesisConfig::default()))
            .with_hyper_params(hps)
            .with_style_store(store)
            .build()
            .err()
            .expect("one style row against two declared styles");
        assert_eq!(err.kind(), "style_integrity");
    }

    #[test]
    fn build_requires_a_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixtures(dir.path(), 2);
        let err = SynthesizerBuilder::new(config)
            .with_text_frontend(Arc::new(MockFrontend))
            .with_embedding_extractor(Arc::new(MockExtractor))
            .build()
            .err()
            .expect("gateway is mandatory");
        assert!(err.to_string().contains("gateway"));
    }

    #[test]
    fn zero_retries_fall_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = SynthesisConfig {
            max_retries: 0,
            ..write_fixtures(dir.path(), 2)
        };
        let synthesizer = with_mocks(SynthesizerBuilder::new(config)).build().unwrap();
        assert_eq!(synthesizer.max_retries(), SynthesisConfig::DEFAULT_MAX_RETRIES);
    }
}
