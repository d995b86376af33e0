//! Vector comparison helpers.
//!
//! Cosine similarity and euclidean distance back the `compare` command, and
//! [`mmr_rerank`] implements maximal marginal relevance:
//!
//! `MMR = λ × sim(query, doc) - (1 - λ) × max(sim(doc, selected))`
//!
//! `λ = 1.0` is pure relevance, `λ = 0.0` pure diversity.

/// Euclidean norm of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|value| value * value).sum::<f32>().sqrt()
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has no magnitude.
///
/// Vectors of different lengths are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denominator = magnitude(a) * magnitude(b);
    if denominator == 0.0 {
        return 0.0;
    }
    dot(a, b) / denominator
}

/// Straight-line distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Relevance score on the `1 - d² / √2` scale, where `d²` is the squared euclidean distance
/// between unit vectors (`d² = 2 - 2 × cosine`).
///
/// Identical vectors score 1.0 and orthogonal ones about -0.41.
pub fn relevance_from_cosine(cosine: f32) -> f32 {
    1.0 - (2.0 - 2.0 * cosine) / std::f32::consts::SQRT_2
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Candidate considered by [`mmr_rerank`].
#[derive(Debug, Clone)]
pub struct MmrCandidate<T> {
    /// Caller-owned value carried through the rerank.
    pub item: T,
    /// Embedding of the candidate.
    pub vector: Vec<f32>,
}

/// Rerank candidates with maximal marginal relevance and keep the best `k`.
///
/// Selection is greedy: each round picks the candidate with the highest MMR score against the
/// already-selected set. Ties keep the earlier candidate, so input order (usually relevance)
/// breaks them.
pub fn mmr_rerank<T>(
    query: &[f32],
    candidates: Vec<MmrCandidate<T>>,
    k: usize,
    lambda: f32,
) -> Vec<T> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());
    let mut remaining: Vec<(f32, MmrCandidate<T>)> = candidates
        .into_iter()
        .map(|candidate| (cosine_similarity(query, &candidate.vector), candidate))
        .collect();
    let mut selected: Vec<MmrCandidate<T>> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, (relevance, candidate)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|chosen| cosine_similarity(&candidate.vector, &chosen.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        let (_, best) = remaining.remove(best_idx);
        selected.push(best);
    }

    selected.into_iter().map(|candidate| candidate.item).collect()
}
