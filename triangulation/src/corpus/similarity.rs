//! Vector and text similarity helpers shared by the store, retrieval, and
//! agreement scoring.

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// Raw cosine similarity in [-1, 1].
///
/// Returns 0.0 for zero-norm vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let a_norm = l2_norm(a);
    let b_norm = l2_norm(b);
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    dot / (a_norm * b_norm)
}

/// Cosine similarity clamped to [0, 1]; opposed vectors score 0.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0) as f32
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Textual similarity in [0, 1] used for near-duplicate detection.
///
/// Sørensen–Dice over character bigrams of the lowercased,
/// whitespace-normalized text. Identical texts score 1.0.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_whitespace(a).to_lowercase();
    let b = normalize_whitespace(b).to_lowercase();
    if a == b {
        return 1.0;
    }
    strsim::sorensen_dice(&a, &b)
}

/// L2-normalize in place; zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}
