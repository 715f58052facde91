//! Exact t-SNE projection to two dimensions.
//!
//! Small author matrices only (O(n²) memory and time per iteration); the
//! result depends on nothing but the input rows and the config, seed included.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::debug;

use crate::{
    config::TsneConfig,
    vectorizer::compute::{Compare, DefaultCompare},
};

const ENTROPY_TOL: f64 = 1e-5;
const BINARY_SEARCH_STEPS: usize = 50;
const MIN_GAIN: f64 = 0.01;
const P_FLOOR: f64 = 1e-12;

/// Perplexity actually used for `n` points: never above `(n - 1) / 3`, never below 1.
pub fn effective_perplexity(requested: f64, n: usize) -> f64 {
    let cap = n.saturating_sub(1) as f64 / 3.0;
    requested.min(cap).max(1.0)
}

/// Projects every row onto the plane. Output is aligned with `rows`.
pub fn embed(rows: &[Vec<f64>], config: &TsneConfig) -> Vec<[f64; 2]> {
    let n = rows.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![[0.0, 0.0]],
        _ => {}
    }
    let perplexity = effective_perplexity(config.perplexity, n);
    let p = joint_probabilities(rows, perplexity);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| {
            let a: f64 = rng.sample(StandardNormal);
            let b: f64 = rng.sample(StandardNormal);
            [a * 1e-4, b * 1e-4]
        })
        .collect();
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];

    for iter in 0..config.iterations {
        let early = iter < config.exaggeration_iters;
        let exaggeration = if early { config.early_exaggeration } else { 1.0 };
        let momentum = if early { 0.5 } else { 0.8 };

        let grads = gradient(&p, &y, exaggeration);
        for i in 0..n {
            for d in 0..2 {
                let g = grads[i][d];
                let gain = if (g > 0.0) != (update[i][d] > 0.0) {
                    gains[i][d] + 0.2
                } else {
                    gains[i][d] * 0.8
                };
                gains[i][d] = gain.max(MIN_GAIN);
                update[i][d] = momentum * update[i][d] - config.learning_rate * gains[i][d] * g;
                y[i][d] += update[i][d];
            }
        }
        recenter(&mut y);
    }
    debug!(points = n, perplexity, iterations = config.iterations, "t-SNE embedding done");
    y
}

/// Symmetrized input affinities `P`, row-major `n x n`.
fn joint_probabilities(rows: &[Vec<f64>], perplexity: f64) -> Vec<f64> {
    let n = rows.len();
    let target = perplexity.ln();
    let conditional: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let dist: Vec<f64> = rows
                .iter()
                .map(|r| <DefaultCompare as Compare<f64>>::squared_euclidean(&rows[i], r))
                .collect();
            conditional_row(&dist, i, target)
        })
        .collect();
    let scale = 2.0 * n as f64;
    let mut p = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                p[i * n + j] = ((conditional[i][j] + conditional[j][i]) / scale).max(P_FLOOR);
            }
        }
    }
    p
}

/// `P(j|i)` with the Gaussian precision found by bisection so that the row
/// entropy matches `target` (nats).
fn conditional_row(dist: &[f64], i: usize, target: f64) -> Vec<f64> {
    let d_min = dist
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(_, d)| *d)
        .fold(f64::INFINITY, f64::min);
    let mut beta = 1.0;
    let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
    let mut row = vec![0.0; dist.len()];
    for _ in 0..BINARY_SEARCH_STEPS {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for (j, d) in dist.iter().enumerate() {
            if j == i {
                row[j] = 0.0;
                continue;
            }
            let shifted = d - d_min;
            let v = (-shifted * beta).exp();
            row[j] = v;
            sum += v;
            weighted += shifted * v;
        }
        let entropy = sum.ln() + beta * weighted / sum;
        let diff = entropy - target;
        if diff.abs() < ENTROPY_TOL {
            break;
        }
        if diff > 0.0 {
            lo = beta;
            beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
        } else {
            hi = beta;
            beta = if lo.is_infinite() { beta / 2.0 } else { (beta + lo) / 2.0 };
        }
    }
    let sum: f64 = row.iter().sum();
    row.iter_mut().for_each(|v| *v /= sum);
    row
}

/// KL gradient per point, Student-t kernel in the embedding.
fn gradient(p: &[f64], y: &[[f64; 2]], exaggeration: f64) -> Vec<[f64; 2]> {
    let n = y.len();
    let kernel: Vec<f64> = (0..n * n)
        .into_par_iter()
        .map(|idx| {
            let (i, j) = (idx / n, idx % n);
            if i == j {
                return 0.0;
            }
            let dx = y[i][0] - y[j][0];
            let dy = y[i][1] - y[j][1];
            1.0 / (1.0 + dx * dx + dy * dy)
        })
        .collect();
    let z = kernel.iter().sum::<f64>().max(f64::MIN_POSITIVE);
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut g = [0.0; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let k = kernel[i * n + j];
                let mult = (exaggeration * p[i * n + j] - k / z) * k;
                g[0] += mult * (y[i][0] - y[j][0]);
                g[1] += mult * (y[i][1] - y[j][1]);
            }
            [4.0 * g[0], 4.0 * g[1]]
        })
        .collect()
}

fn recenter(y: &mut [[f64; 2]]) {
    let n = y.len() as f64;
    let mean = y
        .iter()
        .fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
    let mean = [mean[0] / n, mean[1] / n];
    for p in y.iter_mut() {
        p[0] -= mean[0];
        p[1] -= mean[1];
    }
}
