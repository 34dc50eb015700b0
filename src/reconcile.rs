//! Length reconciliation for parallel per-token feature tracks.
//!
//! Every track fed to the model must have one entry per phoneme. A track whose
//! length disagrees is replaced wholesale by a filler of the target length; it is
//! never truncated or padded.

use ndarray::Array2;

/// A per-token feature sequence whose length is counted in tokens.
pub trait FeatureTrack: Sized {
    fn track_len(&self) -> usize;

    /// Zero-valued track with `len` tokens and the same per-token shape as `self`.
    fn zero_filled(&self, len: usize) -> Self;
}

impl FeatureTrack for Vec<i64> {
    fn track_len(&self) -> usize {
        self.len()
    }

    fn zero_filled(&self, len: usize) -> Self {
        vec![0; len]
    }
}

/// Embedding rows are stored `[dim, tokens]`.
impl FeatureTrack for Array2<f32> {
    fn track_len(&self) -> usize {
        self.ncols()
    }

    fn zero_filled(&self, len: usize) -> Self {
        Array2::zeros((self.nrows(), len))
    }
}

/// Reconcile a batch of tracks of one kind against `target_len`.
///
/// Tracks already at `target_len` are returned unchanged; the rest are replaced by
/// `filler_for(track, target_len)`. Each replacement is logged.
pub fn reconcile<T, F>(sequences: Vec<T>, target_len: usize, filler_for: F) -> Vec<T>
where
    T: FeatureTrack,
    F: Fn(&T, usize) -> T,
{
    sequences
        .into_iter()
        .enumerate()
        .map(|(idx, seq)| {
            if seq.track_len() == target_len {
                return seq;
            }
            tracing::warn!(
                track = idx,
                len = seq.track_len(),
                target = target_len,
                "feature length mismatch, replacing track with filler"
            );
            filler_for(&seq, target_len)
        })
        .collect()
}

/// Reconcile a single named track with zero fill. Returns `true` when it was replaced.
pub fn reconcile_track<T: FeatureTrack>(track: &mut T, target_len: usize, label: &str) -> bool {
    let len = track.track_len();
    if len == target_len {
        return false;
    }
    tracing::warn!(
        track = label,
        len,
        target = target_len,
        "feature length mismatch, using zeros"
    );
    *track = track.zero_filled(target_len);
    true
}
