/// Cosine similarity mapped to `[0, 1]`: `clamp(1 - cosine_distance, 0, 1)`.
///
/// Accumulates in f64. Returns 0 for dimension mismatches, zero-norm vectors
/// and any non-finite input instead of propagating NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return 0.0;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    cos.clamp(0.0, 1.0) as f32
}

pub fn has_nan(v: &[f32]) -> bool {
    v.iter().any(|x| x.is_nan())
}

pub fn is_all_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// Element-wise mean of equally sized vectors.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut acc = vec![0.0f64; dim];
    for v in vectors {
        for (slot, &x) in acc.iter_mut().zip(v) {
            *slot += x as f64;
        }
    }
    let n = vectors.len() as f64;
    Some(acc.into_iter().map(|s| (s / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn identical_orthogonal_opposite() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        let s = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((s - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn random_vectors_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let dim = rng.gen_range(1..64);
            let a: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1e3f32..1e3)).collect();
            let b: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1e3f32..1e3)).collect();
            let s = cosine_similarity(&a, &b);
            assert!((0.0..=1.0).contains(&s), "{s}");
        }
    }

    #[test]
    fn mean_vector_averages() {
        assert_eq!(
            mean_vector(&[vec![1.0, 2.0], vec![3.0, 4.0]]),
            Some(vec![2.0, 3.0])
        );
        assert_eq!(mean_vector(&[]), None);
        assert_eq!(mean_vector(&[vec![1.0], vec![1.0, 2.0]]), None);
    }
}
