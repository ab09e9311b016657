//! Vector operations for embeddings.

use crate::{Error, Result};

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn normalize_vector(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / mag).collect()
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (mag_a * mag_b))
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub index: usize,
    pub score: f32,
}

/// Rank `candidates` against `query`, best first. Candidates of the wrong dimension are skipped.
pub fn find_most_similar(
    query: &[f32],
    candidates: &[Vec<f32>],
    top_k: usize,
    metric: SimilarityMetric,
) -> Vec<SimilarityResult> {
    let mut scores: Vec<SimilarityResult> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let score = match metric {
                SimilarityMetric::Cosine => cosine_similarity(query, c).ok(),
                SimilarityMetric::Euclidean => euclidean_distance(query, c).ok(),
                SimilarityMetric::DotProduct => dot_product(query, c).ok(),
            };
            score.map(|s| SimilarityResult { index: i, score: s })
        })
        .collect();
    match metric {
        SimilarityMetric::Cosine | SimilarityMetric::DotProduct => scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SimilarityMetric::Euclidean => scores.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
    }
    scores.truncate(top_k);
    scores
}

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::validation(format!(
            "Vector dimensions must match: {} != {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}
