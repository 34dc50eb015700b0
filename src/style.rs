//! Style conditioning vectors.
//!
//! A checkpoint ships one vector per style in `style_vectors.npy`; row 0 is the
//! neutral baseline. Requested styles are blended against that baseline with
//! `baseline + (style - baseline) * weight`.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_npy::ReadNpyExt;

use crate::config::ModelHyperParams;
use crate::error::SynthesisError;

#[derive(Debug, Clone)]
pub struct StyleVectorStore {
    vectors: Array2<f32>,
    style2id: HashMap<String, usize>,
}

impl StyleVectorStore {
    /// Load the style table and check it against the model's declared style count.
    pub fn load(path: &Path, hps: &ModelHyperParams) -> Result<Self, SynthesisError> {
        let file = File::open(path).map_err(|e| SynthesisError::io("open style vectors", e))?;
        let vectors = Array2::<f32>::read_npy(file)
            .map_err(|e| SynthesisError::npy("read style vectors", e))?;
        let store = Self::from_parts(vectors, hps.style_table(), hps.data.num_styles)?;
        tracing::info!(
            styles = store.num_styles(),
            dim = store.dim(),
            path = %path.display(),
            "style vectors loaded"
        );
        Ok(store)
    }

    pub fn from_parts(
        vectors: Array2<f32>,
        style2id: HashMap<String, usize>,
        num_styles: usize,
    ) -> Result<Self, SynthesisError> {
        if num_styles == 0 {
            return Err(SynthesisError::style_integrity(
                "model declares no styles; a neutral baseline is required",
            ));
        }
        if style2id.len() != num_styles {
            return Err(SynthesisError::style_integrity(format!(
                "number of styles ({num_styles}) does not match the style table ({})",
                style2id.len()
            )));
        }
        if vectors.nrows() != num_styles {
            return Err(SynthesisError::style_integrity(format!(
                "number of styles ({num_styles}) does not match the number of style vectors ({})",
                vectors.nrows()
            )));
        }
        if let Some((name, id)) = style2id.iter().find(|(_, &id)| id >= num_styles) {
            return Err(SynthesisError::style_integrity(format!(
                "style {name:?} maps to index {id}, beyond {num_styles} vectors"
            )));
        }
        Ok(Self { vectors, style2id })
    }

    pub fn num_styles(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn style_names(&self) -> impl Iterator<Item = &str> {
        self.style2id.keys().map(String::as_str)
    }

    pub fn baseline(&self) -> ArrayView1<'_, f32> {
        self.vectors.row(0)
    }

    pub fn style_id(&self, name: &str) -> Result<usize, SynthesisError> {
        self.style2id
            .get(name)
            .copied()
            .ok_or_else(|| SynthesisError::UnknownStyle {
                name: name.to_string(),
            })
    }

    pub fn vector(&self, style_id: usize, weight: f32) -> Result<Array1<f32>, SynthesisError> {
        if style_id >= self.num_styles() {
            return Err(SynthesisError::UnknownStyle {
                name: style_id.to_string(),
            });
        }
        Ok(self.blend_view(self.vectors.row(style_id), weight))
    }

    pub fn vector_by_name(&self, name: &str, weight: f32) -> Result<Array1<f32>, SynthesisError> {
        self.vector(self.style_id(name)?, weight)
    }

    /// Blend an externally derived embedding (e.g. from reference audio).
    pub fn blend(&self, embedding: &Array1<f32>, weight: f32) -> Result<Array1<f32>, SynthesisError> {
        if embedding.len() != self.dim() {
            return Err(SynthesisError::shape_mismatch(format!(
                "style embedding has {} dims, table has {}",
                embedding.len(),
                self.dim()
            )));
        }
        Ok(self.blend_view(embedding.view(), weight))
    }

    fn blend_view(&self, style: ArrayView1<'_, f32>, weight: f32) -> Array1<f32> {
        let base = self.baseline();
        &base + &((&style - &base) * weight)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};
    use ndarray_npy::WriteNpyExt;

    use super::*;

    fn table() -> HashMap<String, usize> {
        HashMap::from([("Neutral".to_string(), 0), ("Happy".to_string(), 1)])
    }

    fn store() -> StyleVectorStore {
        StyleVectorStore::from_parts(array![[1.0, 1.0], [3.0, -1.0]], table(), 2).unwrap()
    }

    #[test]
    fn weight_interpolates_from_baseline() {
        let s = store();
        assert_eq!(s.vector_by_name("Happy", 0.0).unwrap(), array![1.0, 1.0]);
        assert_eq!(s.vector_by_name("Happy", 1.0).unwrap(), array![3.0, -1.0]);
        assert_eq!(s.vector_by_name("Happy", 2.0).unwrap(), array![5.0, -3.0]);
        assert_eq!(s.vector_by_name("Neutral", 7.0).unwrap(), array![1.0, 1.0]);
    }

    #[test]
    fn unknown_style_is_an_error() {
        let err = store().vector_by_name("Angry", 1.0).unwrap_err();
        assert_eq!(err.kind(), "unknown_style");
        assert!(store().vector(5, 1.0).is_err());
    }

    #[test]
    fn row_count_mismatch_is_fatal() {
        let err = StyleVectorStore::from_parts(Array2::zeros((3, 2)), table(), 2).unwrap_err();
        assert_eq!(err.kind(), "style_integrity");
    }

    #[test]
    fn table_size_mismatch_is_fatal() {
        let err = StyleVectorStore::from_parts(Array2::zeros((3, 2)), table(), 3).unwrap_err();
        assert!(err.to_string().contains("style table (2)"));
    }

    #[test]
    fn out_of_range_style_id_is_fatal() {
        let bad = HashMap::from([("Neutral".to_string(), 0), ("Happy".to_string(), 4)]);
        assert!(StyleVectorStore::from_parts(Array2::zeros((2, 2)), bad, 2).is_err());
    }

    #[test]
    fn external_embedding_is_blended_like_a_style() {
        let s = store();
        let blended = s.blend(&array![2.0, 0.0], 0.5).unwrap();
        assert_eq!(blended, array![1.5, 0.5]);
        assert_eq!(
            s.blend(&array![1.0], 1.0).unwrap_err().kind(),
            "shape_mismatch"
        );
    }

    #[test]
    fn load_reads_npy_and_validates_against_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style_vectors.npy");
        let vectors: Array2<f32> = array![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]];
        vectors
            .write_npy(File::create(&path).unwrap())
            .expect("write npy");

        let hps: ModelHyperParams = serde_json::from_str(
            r#"{"data": {"sampling_rate": 44100, "num_styles": 2}}"#,
        )
        .unwrap();
        let s = StyleVectorStore::load(&path, &hps).unwrap();
        assert_eq!(s.num_styles(), 2);
        assert_eq!(s.dim(), 3);
        assert_eq!(s.vector_by_name("1", 1.0).unwrap(), array![1.0, 2.0, 3.0]);

        let hps_three: ModelHyperParams = serde_json::from_str(
            r#"{"data": {"sampling_rate": 44100, "num_styles": 3}}"#,
        )
        .unwrap();
        assert!(StyleVectorStore::load(&path, &hps_three).is_err());
    }
}
