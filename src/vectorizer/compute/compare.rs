use num::Float;

/// Distance and similarity measures between dense rows of equal length.
pub trait Compare<N>
where
    N: Float,
{
    /// コサイン類似度
    /// cos(θ) = Σ(a_i * b_i) / (||a|| * ||b||), 0 when either side is all zero
    fn cosine_similarity(a: &[N], b: &[N]) -> f64;
    /// 二乗ユークリッド距離
    /// d(a, b) = Σ((a_i - b_i)^2)
    fn squared_euclidean(a: &[N], b: &[N]) -> f64;
    /// ユークリッド距離
    /// d(a, b) = sqrt(Σ((a_i - b_i)^2))
    fn euclidean_distance(a: &[N], b: &[N]) -> f64 {
        Self::squared_euclidean(a, b).sqrt()
    }
}

#[derive(Debug)]
pub struct DefaultCompare;

impl<N: Float> Compare<N> for DefaultCompare {
    #[inline(always)]
    fn cosine_similarity(a: &[N], b: &[N]) -> f64 {
        let mut dot = 0_f64;
        let mut norm_a = 0_f64;
        let mut norm_b = 0_f64;
        for (x, y) in a.iter().zip(b) {
            let (x, y) = (to_f64(*x), to_f64(*y));
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a.sqrt() * norm_b.sqrt())
        }
    }

    #[inline(always)]
    fn squared_euclidean(a: &[N], b: &[N]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| {
                let d = to_f64(*x) - to_f64(*y);
                d * d
            })
            .sum()
    }
}

#[inline(always)]
fn to_f64<N: Float>(v: N) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}
