//! Normalized sequence similarity used throughout the matching ladder.

use std::cmp::Ordering;

/// Similarity of two strings as twice the length of their longest common
/// subsequence over their combined length, computed over characters. Returns
/// 1.0 for identical strings and 0.0 when nothing is shared. Long shared runs
/// score high even when the strings differ in length, so "Q. Futter" against
/// "Quincy Futter" is still close.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() && b_chars.is_empty() {
        return 1.0;
    }
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }
    // Two-row dynamic program, keeping the shorter string on the inner loop.
    let (outer, inner) = if a_chars.len() >= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };
    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];
    for outer_ch in outer.iter() {
        for (j, inner_ch) in inner.iter().enumerate() {
            curr[j + 1] = if outer_ch == inner_ch {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[inner.len()];
    (2.0 * lcs as f64) / ((a_chars.len() + b_chars.len()) as f64)
}

/// Returns up to `limit` candidates scoring at least `cutoff` against
/// `target`, best first. Candidates with equal scores keep their input order,
/// and duplicates are preserved.
pub fn close_matches(
    target: &str,
    candidates: &[String],
    limit: usize,
    cutoff: f64,
) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .map(|candidate| (ratio(target, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(_, candidate)| candidate.clone()).collect()
}
