use crate::error::RankError;
use crate::models::{Chunk, RankedChunk};
use std::cmp::Ordering;

/// Cosine of the angle between `a` and `b`; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Assigns each chunk its similarity to `task`. `vectors[i]` belongs to `chunks[i]`.
pub fn score_chunks(
    task: &[f32],
    chunks: &mut [Chunk],
    vectors: &[Vec<f32>],
) -> Result<(), RankError> {
    if chunks.len() != vectors.len() {
        return Err(RankError::LengthMismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }

    if let Some(vector) = vectors.iter().find(|vector| vector.len() != task.len()) {
        return Err(RankError::DimensionMismatch {
            expected: task.len(),
            actual: vector.len(),
        });
    }

    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.score = Some(cosine_similarity(task, vector));
    }

    Ok(())
}

/// Orders chunks by descending score and keeps the first `top_k`. The sort is
/// stable, so equal scores keep their encounter order. Unscored and NaN
/// scores sort last.
pub fn rank_chunks(mut chunks: Vec<Chunk>, top_k: usize) -> Vec<RankedChunk> {
    chunks.sort_by(|left, right| compare_scores(right.score, left.score));

    chunks
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(position, chunk)| RankedChunk {
            chunk,
            rank: position + 1,
        })
        .collect()
}

fn compare_scores(left: Option<f32>, right: Option<f32>) -> Ordering {
    let key = |score: Option<f32>| score.filter(|value| !value.is_nan());
    match (key(left), key(right)) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
