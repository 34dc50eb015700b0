//! Per-segment model inputs: phoneme/tone/language id tracks plus the three
//! linguistic embedding slots, built from the external text front end and
//! embedding extractor and kept at one common length.

use std::ops::Range;
use std::sync::Arc;

use ndarray::{concatenate, s, Array2, Axis};

use crate::error::SynthesisError;
use crate::pipeline::traits::{EmbeddingExtractor, TextFrontend};
use crate::reconcile::{reconcile_track, FeatureTrack};
use crate::types::{AssistText, EmbeddingSlot, Language};

pub const BERT_DIM: usize = 1024;
/// Leading tokens removed by `skip_start` (sentence-start artifacts).
pub const SKIP_START_TOKENS: usize = 3;
/// Trailing tokens removed by `skip_end`.
pub const SKIP_END_TOKENS: usize = 2;

/// The model's three embedding inputs, each `[dim, tokens]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinguisticEmbeddings {
    pub bert: Array2<f32>,
    pub ja_bert: Array2<f32>,
    pub en_bert: Array2<f32>,
}

impl LinguisticEmbeddings {
    pub fn zeros(dim: usize, len: usize) -> Self {
        Self {
            bert: Array2::zeros((dim, len)),
            ja_bert: Array2::zeros((dim, len)),
            en_bert: Array2::zeros((dim, len)),
        }
    }

    /// Put `extracted` in the slot owned by `language`; the other slots are zero.
    pub fn for_language(language: Language, extracted: Array2<f32>) -> Self {
        let (dim, len) = extracted.dim();
        let mut out = Self::zeros(dim, len);
        match language.embedding_slot() {
            Some(slot) => *out.slot_mut(slot) = extracted,
            None => tracing::warn!(
                language = language.as_str(),
                "no embedding slot for language, using zeros"
            ),
        }
        out
    }

    pub fn slot(&self, slot: EmbeddingSlot) -> &Array2<f32> {
        match slot {
            EmbeddingSlot::Bert => &self.bert,
            EmbeddingSlot::JaBert => &self.ja_bert,
            EmbeddingSlot::EnBert => &self.en_bert,
        }
    }

    fn slot_mut(&mut self, slot: EmbeddingSlot) -> &mut Array2<f32> {
        match slot {
            EmbeddingSlot::Bert => &mut self.bert,
            EmbeddingSlot::JaBert => &mut self.ja_bert,
            EmbeddingSlot::EnBert => &mut self.en_bert,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFeatures {
    pub phones: Vec<i64>,
    pub tones: Vec<i64>,
    pub language_ids: Vec<i64>,
    pub embeddings: LinguisticEmbeddings,
}

impl SegmentFeatures {
    /// Target length shared by every track: the phoneme count.
    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    /// Zero-fill every auxiliary track whose length differs from the phoneme track.
    /// Returns the number of tracks replaced.
    pub fn reconcile(&mut self) -> usize {
        let target = self.phones.len();
        [
            reconcile_track(&mut self.tones, target, "tones"),
            reconcile_track(&mut self.language_ids, target, "language_ids"),
            reconcile_track(&mut self.embeddings.bert, target, "bert"),
            reconcile_track(&mut self.embeddings.ja_bert, target, "ja_bert"),
            reconcile_track(&mut self.embeddings.en_bert, target, "en_bert"),
        ]
        .into_iter()
        .filter(|&replaced| replaced)
        .count()
    }

    /// Remove sentence-boundary tokens from every track, then reconcile again since
    /// tracks are sliced independently.
    pub fn strip_boundaries(&mut self, skip_start: bool, skip_end: bool) {
        if !skip_start && !skip_end {
            return;
        }
        slice_ids(&mut self.phones, skip_start, skip_end);
        slice_ids(&mut self.tones, skip_start, skip_end);
        slice_ids(&mut self.language_ids, skip_start, skip_end);
        slice_rows(&mut self.embeddings.bert, skip_start, skip_end);
        slice_rows(&mut self.embeddings.ja_bert, skip_start, skip_end);
        slice_rows(&mut self.embeddings.en_bert, skip_start, skip_end);
        self.reconcile();
    }

    /// Copy keeping only the phoneme track; every other track is zero at the
    /// phoneme length. Used to retry a model call that failed on tensor shapes.
    pub fn with_zeroed_auxiliaries(&self) -> Self {
        let len = self.phones.len();
        Self {
            phones: self.phones.clone(),
            tones: self.tones.zero_filled(len),
            language_ids: self.language_ids.zero_filled(len),
            embeddings: LinguisticEmbeddings {
                bert: self.embeddings.bert.zero_filled(len),
                ja_bert: self.embeddings.ja_bert.zero_filled(len),
                en_bert: self.embeddings.en_bert.zero_filled(len),
            },
        }
    }

    /// Join reconciled segments end to end along the token axis.
    pub fn concat(parts: &[SegmentFeatures]) -> Result<Self, SynthesisError> {
        if parts.is_empty() {
            return Err(SynthesisError::invalid_input("no feature segments to join"));
        }
        Ok(Self {
            phones: parts.iter().flat_map(|p| p.phones.iter().copied()).collect(),
            tones: parts.iter().flat_map(|p| p.tones.iter().copied()).collect(),
            language_ids: parts
                .iter()
                .flat_map(|p| p.language_ids.iter().copied())
                .collect(),
            embeddings: LinguisticEmbeddings {
                bert: join_slot(parts, EmbeddingSlot::Bert)?,
                ja_bert: join_slot(parts, EmbeddingSlot::JaBert)?,
                en_bert: join_slot(parts, EmbeddingSlot::EnBert)?,
            },
        })
    }
}

fn join_slot(
    parts: &[SegmentFeatures],
    slot: EmbeddingSlot,
) -> Result<Array2<f32>, SynthesisError> {
    let views: Vec<_> = parts.iter().map(|p| p.embeddings.slot(slot).view()).collect();
    concatenate(Axis(1), &views)
        .map_err(|e| SynthesisError::shape_mismatch(format!("joining embeddings: {e}")))
}

fn boundary_range(len: usize, skip_start: bool, skip_end: bool) -> Range<usize> {
    let start = if skip_start {
        SKIP_START_TOKENS.min(len)
    } else {
        0
    };
    let end = if skip_end {
        len.saturating_sub(SKIP_END_TOKENS)
    } else {
        len
    };
    start..end.max(start)
}

fn slice_ids(ids: &mut Vec<i64>, skip_start: bool, skip_end: bool) {
    let range = boundary_range(ids.len(), skip_start, skip_end);
    ids.truncate(range.end);
    ids.drain(..range.start);
}

fn slice_rows(rows: &mut Array2<f32>, skip_start: bool, skip_end: bool) {
    let range = boundary_range(rows.ncols(), skip_start, skip_end);
    let trimmed = rows.slice(s![.., range]).to_owned();
    *rows = trimmed;
}

/// `[item, x0, item, x1, ..., item]`: the blank-token layout used by models trained
/// with `add_blank`.
pub fn intersperse(seq: &[i64], item: i64) -> Vec<i64> {
    let mut out = vec![item; seq.len() * 2 + 1];
    for (i, &x) in seq.iter().enumerate() {
        out[i * 2 + 1] = x;
    }
    out
}

/// Builds [`SegmentFeatures`] for one text segment.
pub struct FeatureBuilder {
    frontend: Arc<dyn TextFrontend>,
    extractor: Arc<dyn EmbeddingExtractor>,
    add_blank: bool,
    embedding_dim: usize,
}

impl FeatureBuilder {
    pub fn new(
        frontend: Arc<dyn TextFrontend>,
        extractor: Arc<dyn EmbeddingExtractor>,
        add_blank: bool,
    ) -> Self {
        Self {
            frontend,
            extractor,
            add_blank,
            embedding_dim: BERT_DIM,
        }
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn build(
        &self,
        text: &str,
        language: Language,
        assist: Option<&AssistText>,
        given_tone: Option<&[i64]>,
    ) -> Result<SegmentFeatures, SynthesisError> {
        let cleaned = self.frontend.clean(text, language)?;
        if cleaned.phones.is_empty() {
            return Err(SynthesisError::EmptyPhonemes {
                text: text.to_string(),
            });
        }

        let tones = match given_tone {
            Some(given) if given.len() != cleaned.phones.len() => {
                return Err(SynthesisError::InvalidTone {
                    given: given.len(),
                    expected: cleaned.phones.len(),
                });
            }
            Some(given) => given.to_vec(),
            None => cleaned.tones.clone(),
        };

        let (mut phones, mut tones, mut language_ids) =
            self.frontend.to_sequence(&cleaned.phones, &tones, language)?;
        let mut word2ph = cleaned.word2ph;
        if self.add_blank {
            phones = intersperse(&phones, 0);
            tones = intersperse(&tones, 0);
            language_ids = intersperse(&language_ids, 0);
            for n in word2ph.iter_mut() {
                *n *= 2;
            }
            if let Some(first) = word2ph.first_mut() {
                *first += 1;
            }
        }
        if word2ph.is_empty() {
            return Err(SynthesisError::invalid_input(format!(
                "word-to-phoneme table is empty for {:?}",
                cleaned.norm_text
            )));
        }

        let extracted = self
            .extractor
            .extract(&cleaned.norm_text, &word2ph, language, assist)?;
        let phone_len = phones.len();
        let (dim, len) = extracted.dim();
        let embeddings = if len == 0 || len != phone_len || dim != self.embedding_dim {
            tracing::warn!(
                bert_len = len,
                bert_dim = dim,
                phone_len,
                "embedding shape mismatch, using zeros"
            );
            LinguisticEmbeddings::zeros(self.embedding_dim, phone_len)
        } else {
            LinguisticEmbeddings::for_language(language, extracted)
        };

        let mut features = SegmentFeatures {
            phones,
            tones,
            language_ids,
            embeddings,
        };
        features.reconcile();
        Ok(features)
    }
}
