use ndarray::{Array3, ArrayViewMut2, Axis};

use crate::error::SynthesisError;

/// Score given to cells the path may not enter. Kept far from `f32::MIN` so that
/// adding a real score to it cannot overflow.
pub const MAX_NEG_VAL: f32 = -1e9;

/// Monotonic alignment search over a `[batch, frame, token]` score matrix.
///
/// `scores` is used as the cumulative-score table and is overwritten; callers that
/// still need the raw scores should use [`maximum_path_owned`]. Element `i` is
/// searched over its `frame_valid[i] x token_valid[i]` top-left region; elements
/// with a non-positive length are left all zero.
///
/// The returned path has the shape of `scores`: exactly one cell per valid frame
/// row is `1` and the selected token index never decreases as the frame index grows.
pub fn maximum_path(
    scores: &mut Array3<f32>,
    frame_valid: &[i32],
    token_valid: &[i32],
) -> Result<Array3<i32>, SynthesisError> {
    let mut paths = Array3::<i32>::zeros(scores.raw_dim());
    if scores.is_empty() || frame_valid.is_empty() || token_valid.is_empty() {
        return Ok(paths);
    }
    validate_lengths(scores.dim(), frame_valid, token_valid)?;

    for (b, (mut path, mut value)) in paths
        .axis_iter_mut(Axis(0))
        .zip(scores.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let (t_y, t_x) = (frame_valid[b], token_valid[b]);
        if t_y <= 0 || t_x <= 0 {
            tracing::trace!(batch = b, t_y, t_x, "alignment: skipping empty element");
            continue;
        }
        search_single(path.view_mut(), value.view_mut(), t_y as usize, t_x as usize);
    }
    Ok(paths)
}

/// Same as [`maximum_path`] but leaves `scores` untouched.
pub fn maximum_path_owned(
    scores: &Array3<f32>,
    frame_valid: &[i32],
    token_valid: &[i32],
) -> Result<Array3<i32>, SynthesisError> {
    let mut table = scores.to_owned();
    maximum_path(&mut table, frame_valid, token_valid)
}

/// Mask-driven entry point used by duration modeling.
///
/// `mask` has the shape of `neg_cent`; element `b`'s valid frame count is the sum of
/// its first token column and its valid token count the sum of its first frame row.
pub fn maximum_path_from_mask(
    neg_cent: &Array3<f32>,
    mask: &Array3<f32>,
) -> Result<Array3<i32>, SynthesisError> {
    if neg_cent.is_empty() || mask.is_empty() {
        return Ok(Array3::zeros(neg_cent.raw_dim()));
    }
    if mask.dim().0 != neg_cent.dim().0 {
        return Err(SynthesisError::invalid_input(format!(
            "mask batch {} does not match score batch {}",
            mask.dim().0,
            neg_cent.dim().0
        )));
    }

    let frame_valid: Vec<i32> = mask
        .axis_iter(Axis(0))
        .map(|m| m.column(0).sum().round() as i32)
        .collect();
    let token_valid: Vec<i32> = mask
        .axis_iter(Axis(0))
        .map(|m| m.row(0).sum().round() as i32)
        .collect();

    maximum_path_owned(neg_cent, &frame_valid, &token_valid)
}

fn validate_lengths(
    (batch, frame_len, token_len): (usize, usize, usize),
    frame_valid: &[i32],
    token_valid: &[i32],
) -> Result<(), SynthesisError> {
    if frame_valid.len() != batch || token_valid.len() != batch {
        return Err(SynthesisError::invalid_input(format!(
            "length vectors ({} frame, {} token) do not match batch size {batch}",
            frame_valid.len(),
            token_valid.len()
        )));
    }
    for (b, (&t_y, &t_x)) in frame_valid.iter().zip(token_valid).enumerate() {
        if t_y > 0 && t_y as usize > frame_len {
            return Err(SynthesisError::invalid_input(format!(
                "frame length {t_y} of element {b} exceeds frame axis {frame_len}"
            )));
        }
        if t_x > 0 && t_x as usize > token_len {
            return Err(SynthesisError::invalid_input(format!(
                "token length {t_x} of element {b} exceeds token axis {token_len}"
            )));
        }
    }
    Ok(())
}

fn search_single(
    mut path: ArrayViewMut2<'_, i32>,
    mut value: ArrayViewMut2<'_, f32>,
    t_y: usize,
    t_x: usize,
) {
    for y in 0..t_y {
        // Only cells from which every remaining token can still be reached.
        let lo = (t_x + y).saturating_sub(t_y);
        let hi = t_x.min(y + 1);
        for x in lo..hi {
            let v_cur = if x == y {
                MAX_NEG_VAL
            } else {
                value[[y - 1, x]]
            };
            let v_prev = if x == 0 {
                if y == 0 {
                    0.0
                } else {
                    MAX_NEG_VAL
                }
            } else {
                value[[y - 1, x - 1]]
            };
            value[[y, x]] += v_prev.max(v_cur);
        }
    }

    let mut index = t_x - 1;
    for y in (0..t_y).rev() {
        path[[y, index]] = 1;
        // y > 0 only matters when tokens outnumber frames; otherwise index reaches 0 first.
        if index != 0 && y > 0 && (index == y || value[[y - 1, index]] < value[[y - 1, index - 1]])
        {
            index -= 1;
        }
    }
}
