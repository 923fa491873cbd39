//! Term-vector similarity and diversity re-ranking.
//!
//! Pure-Rust implementations of:
//! - Bag-of-words term vectors
//! - Cosine similarity over sparse vectors
//! - Maximal Marginal Relevance (MMR) selection

use std::collections::HashMap;

/// Sparse term-frequency vector.
pub type TermVector = HashMap<String, f32>;

/// Lowercased alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Build a term-frequency vector.
pub fn term_vector(text: &str) -> TermVector {
    let mut v = TermVector::new();
    for token in tokenize(text) {
        *v.entry(token).or_insert(0.0) += 1.0;
    }
    v
}

/// Compute cosine similarity between two sparse vectors.
///
/// Returns a value in [0, 1] for non-negative vectors; 0.0 if either is empty.
pub fn cosine_similarity(a: &TermVector, b: &TermVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, x)| large.get(term).map(|y| (*x as f64) * (*y as f64)))
        .sum();

    let norm = |v: &TermVector| v.values().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Select `k` candidate indices by maximal marginal relevance.
///
/// `relevance[i]` is the similarity of candidate `i` to the query and
/// `pairwise(i, j)` the similarity between two candidates. `lambda = 1.0`
/// reduces to plain relevance order; lower values favour diversity.
pub fn mmr_select<F>(relevance: &[f32], k: usize, lambda: f32, pairwise: F) -> Vec<usize>
where
    F: Fn(usize, usize) -> f32,
{
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(relevance.len()));
    let mut remaining: Vec<usize> = (0..relevance.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| pairwise(candidate, s))
                .fold(0.0f32, f32::max);
            let score = lambda * relevance[candidate] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }

    selected
}
