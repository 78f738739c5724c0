//! Ranking utilities shared by the memory backends.

use agentcanvas_core::memory::MemoryHit;
use std::collections::HashMap;

/// Standard Reciprocal Rank Fusion constant.
pub const RRF_K: f32 = 60.0;

/// Reciprocal Rank Fusion over any number of ranked lists.
///
/// Each hit's final score is the sum of `1 / (k + rank)` over the lists it
/// appears in, so memories found by both keyword and graph search rise to
/// the top. Results are deduplicated by id and sorted by fused score.
pub fn reciprocal_rank_fusion(lists: &[Vec<MemoryHit>], k: f32, limit: usize) -> Vec<MemoryHit> {
    let mut scores: HashMap<String, (f32, usize, MemoryHit)> = HashMap::new();
    let mut seen = 0usize;

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let rrf = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(hit.id.clone())
                .and_modify(|(score, _, _)| *score += rrf)
                .or_insert_with(|| {
                    seen += 1;
                    (rrf, seen, hit.clone())
                });
        }
    }

    let mut fused: Vec<(f32, usize, MemoryHit)> = scores.into_values().collect();
    // Ties keep first-seen order so results are deterministic.
    fused.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    fused.truncate(limit);
    fused
        .into_iter()
        .map(|(score, _, mut hit)| {
            hit.score = score;
            hit
        })
        .collect()
}

/// Lowercased search terms of a query, without very short words.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Lowercased alphanumeric words of a text, in order.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Whether `words` contains the entity `key` as a contiguous phrase.
pub fn mentions(words: &[String], key: &str) -> bool {
    let parts: Vec<&str> = key.split(' ').collect();
    !parts.is_empty()
        && words
            .windows(parts.len())
            .any(|w| w.iter().zip(&parts).all(|(a, b)| a == b))
}
