/// Segments shorter than this (in characters, after trimming) give unstable or
/// empty model output and are not synthesized.
pub const MIN_SEGMENT_CHARS: usize = 2;

/// Split input text into synthesizable segments.
///
/// With `split_by_lines` every line becomes a candidate segment; otherwise the whole
/// text is one candidate. Candidates are trimmed and dropped when shorter than
/// [`MIN_SEGMENT_CHARS`]. An empty result means there is nothing to synthesize.
pub fn plan(text: &str, split_by_lines: bool) -> Vec<String> {
    if !split_by_lines {
        return keep_if_long_enough(text).into_iter().collect();
    }
    text.split('\n').filter_map(keep_if_long_enough).collect()
}

fn keep_if_long_enough(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    (trimmed.chars().count() >= MIN_SEGMENT_CHARS).then(|| trimmed.to_string())
}
