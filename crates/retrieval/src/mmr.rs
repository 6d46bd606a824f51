//! Maximal Marginal Relevance selection.
//!
//! MMR = λ × sim(query, doc) − (1 − λ) × max(sim(doc, selected))
//!
//! λ = 1.0 ranks purely by relevance, λ = 0.0 purely by novelty. All vectors
//! are expected to be unit length so the dot product is the cosine.

use crate::embeddings::dot;

/// Select up to `top_k` candidate positions in pick order.
///
/// When the pool is no larger than `top_k` every candidate is returned in
/// its original order. Ties go to the earlier candidate.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], top_k: usize, lambda: f32) -> Vec<usize> {
    if candidates.len() <= top_k {
        return (0..candidates.len()).collect();
    }
    if top_k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let relevance: Vec<f32> = candidates.iter().map(|c| dot(query, c)).collect();

    let Some(first) = argmax(relevance.iter().copied().enumerate()) else {
        return Vec::new();
    };
    let mut selected = Vec::with_capacity(top_k);
    let mut taken = vec![false; candidates.len()];
    // Highest similarity of each candidate to anything selected so far.
    let mut max_sim = vec![f32::NEG_INFINITY; candidates.len()];
    let mut pick = first;

    loop {
        selected.push(pick);
        taken[pick] = true;
        if selected.len() == top_k {
            break;
        }
        for (i, c) in candidates.iter().enumerate() {
            if !taken[i] {
                max_sim[i] = max_sim[i].max(dot(c, candidates[pick]));
            }
        }
        let scores = (0..candidates.len())
            .filter(|&i| !taken[i])
            .map(|i| (i, lambda * relevance[i] - (1.0 - lambda) * max_sim[i]));
        match argmax(scores) {
            Some(next) => pick = next,
            None => break,
        }
    }
    selected
}

fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, s) in scores {
        if best.is_none_or(|(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}
