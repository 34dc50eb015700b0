use ndarray::{s, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vits2_synth::{maximum_path, maximum_path_from_mask, maximum_path_owned};

/// Scores on a 0.25 grid keep every path sum exact in f32.
fn grid_score(rng: &mut StdRng) -> f32 {
    rng.gen_range(0..41) as f32 * 0.25 - 5.0
}

fn random_scores(rng: &mut StdRng, frames: usize, tokens: usize) -> Array3<f32> {
    Array3::from_shape_fn((1, frames, tokens), |_| grid_score(rng))
}

/// Token index chosen at each frame, asserting one cell per row.
fn selected_tokens(path: &Array3<i32>, b: usize, frames: usize) -> Vec<usize> {
    (0..frames)
        .map(|t| {
            let row = path.slice(s![b, t, ..]);
            assert_eq!(row.sum(), 1, "frame {t} must select exactly one token");
            row.iter().position(|&v| v == 1).unwrap()
        })
        .collect()
}

/// Best total over every monotone path from token 0 to token `tokens - 1`.
fn brute_force_best(scores: &Array3<f32>, frames: usize, tokens: usize) -> f32 {
    fn walk(scores: &Array3<f32>, t: usize, x: usize, frames: usize, tokens: usize) -> f32 {
        let here = scores[[0, t, x]];
        if t == frames - 1 {
            return if x == tokens - 1 { here } else { f32::NEG_INFINITY };
        }
        let stay = walk(scores, t + 1, x, frames, tokens);
        let advance = if x + 1 < tokens {
            walk(scores, t + 1, x + 1, frames, tokens)
        } else {
            f32::NEG_INFINITY
        };
        here + stay.max(advance)
    }
    walk(scores, 0, 0, frames, tokens)
}

#[test]
fn random_paths_are_monotone_complete_and_optimal() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let frames = rng.gen_range(1..=9);
        let tokens = rng.gen_range(1..=frames);
        let scores = random_scores(&mut rng, frames, tokens);

        let path = maximum_path_owned(&scores, &[frames as i32], &[tokens as i32]).unwrap();
        let chosen = selected_tokens(&path, 0, frames);

        assert_eq!(chosen[0], 0);
        assert_eq!(chosen[frames - 1], tokens - 1);
        for pair in chosen.windows(2) {
            assert!(pair[1] == pair[0] || pair[1] == pair[0] + 1, "{chosen:?}");
        }

        let total: f32 = chosen
            .iter()
            .enumerate()
            .map(|(t, &x)| scores[[0, t, x]])
            .sum();
        let best = brute_force_best(&scores, frames, tokens);
        assert!(
            (total - best).abs() < 1e-4,
            "path total {total} below optimum {best} for {frames}x{tokens}"
        );
    }
}

#[test]
fn batch_elements_are_independent() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut scores = Array3::from_shape_fn((3, 6, 4), |_| grid_score(&mut rng));
    let single = maximum_path_owned(
        &scores.slice(s![1..2, .., ..]).to_owned(),
        &[5],
        &[3],
    )
    .unwrap();

    let batched = maximum_path(&mut scores, &[6, 5, 0], &[4, 3, 2]).unwrap();
    assert_eq!(batched.slice(s![1, .., ..]), single.slice(s![0, .., ..]));
    assert_eq!(batched.slice(s![1, 5, ..]).sum(), 0);
    assert_eq!(batched.slice(s![1, .., 3]).sum(), 0);
    assert_eq!(batched.slice(s![2, .., ..]).sum(), 0);
    assert_eq!(batched.slice(s![0, .., ..]).sum(), 6);
}

#[test]
fn mask_entry_point_matches_explicit_lengths() {
    let mut rng = StdRng::seed_from_u64(99);
    let scores = Array3::from_shape_fn((2, 7, 5), |_| grid_score(&mut rng));
    let mut mask = Array3::<f32>::zeros((2, 7, 5));
    mask.slice_mut(s![0, ..7, ..5]).fill(1.0);
    mask.slice_mut(s![1, ..4, ..2]).fill(1.0);

    let from_mask = maximum_path_from_mask(&scores, &mask).unwrap();
    let explicit = maximum_path_owned(&scores, &[7, 4], &[5, 2]).unwrap();
    assert_eq!(from_mask, explicit);
}

#[test]
fn wide_matrices_do_not_panic() {
    let mut scores = Array3::<f32>::zeros((1, 2, 5));
    let path = maximum_path(&mut scores, &[2], &[5]).unwrap();
    assert_eq!(path.dim(), (1, 2, 5));
}
