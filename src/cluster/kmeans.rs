use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    cluster::knee::knee_point,
    config::KMeansConfig,
    error::{AnalysisError, Result},
    vectorizer::compute::{Compare, DefaultCompare},
};

#[inline]
fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    <DefaultCompare as Compare<f64>>::squared_euclidean(a, b)
}

/// Outcome of one k-means fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansFit {
    pub k: usize,
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// sum of squared distances to the assigned centroid
    pub inertia: f64,
    pub iterations: usize,
}

/// Seeded k-means: k-means++ initialisation, Lloyd iterations, `n_init`
/// restarts keeping the lowest inertia (earliest restart on ties).
pub fn fit(data: &[Vec<f64>], k: usize, config: &KMeansConfig) -> Result<KMeansFit> {
    if k == 0 || k > data.len() {
        return Err(AnalysisError::InvalidClusterCount { k, rows: data.len() });
    }
    let mut best: Option<KMeansFit> = None;
    for run in 0..config.n_init.max(1) {
        let candidate = run_once(data, k, config, config.seed.wrapping_add(run as u64));
        if best.as_ref().map_or(true, |b| candidate.inertia < b.inertia) {
            best = Some(candidate);
        }
    }
    best.ok_or(AnalysisError::InvalidClusterCount { k, rows: data.len() })
}

fn run_once(data: &[Vec<f64>], k: usize, config: &KMeansConfig, seed: u64) -> KMeansFit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids = init_plus_plus(data, k, &mut rng);
    let tol = config.tol * mean_feature_variance(data);

    let mut iterations = 0;
    for _ in 0..config.max_iter {
        iterations += 1;
        let (labels, _) = assign(data, &centroids);
        let updated = update_centroids(data, &labels, &centroids);
        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| sq_dist(a, b))
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }
    let (labels, inertia) = assign(data, &centroids);
    KMeansFit {
        k,
        labels,
        centroids,
        inertia,
        iterations,
    }
}

/// k-means++ seeding, D² weighted.
/// When every point already coincides with a center, the next center is the
/// first point not yet picked.
fn init_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = data.len();
    let first = rng.gen_range(0..n);
    let mut picked = vec![first];
    let mut nearest: Vec<f64> = data.iter().map(|x| sq_dist(x, &data[first])).collect();

    while picked.len() < k {
        let total: f64 = nearest.iter().sum();
        let next = if total > 0.0 {
            let mut r = rng.gen::<f64>() * total;
            let mut idx = None;
            for (i, w) in nearest.iter().enumerate() {
                if *w > 0.0 && r <= *w {
                    idx = Some(i);
                    break;
                }
                r -= w;
            }
            // rounding can leave r just above the last weight
            idx.or_else(|| nearest.iter().rposition(|w| *w > 0.0))
        } else {
            None
        };
        let next = next
            .or_else(|| (0..n).find(|i| !picked.contains(i)))
            .unwrap_or(first);
        picked.push(next);
        for (i, x) in data.iter().enumerate() {
            nearest[i] = nearest[i].min(sq_dist(x, &data[next]));
        }
    }
    picked.into_iter().map(|i| data[i].clone()).collect()
}

/// Nearest centroid per point (lowest centroid index on ties) and the inertia.
fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>]) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = data
        .iter()
        .map(|x| {
            let mut best = (0usize, f64::INFINITY);
            for (c, center) in centroids.iter().enumerate() {
                let d = sq_dist(x, center);
                if d < best.1 {
                    best = (c, d);
                }
            }
            inertia += best.1;
            best.0
        })
        .collect();
    (labels, inertia)
}

/// Means of the assigned points. An empty cluster takes over the point that
/// lies furthest from its current centroid.
fn update_centroids(data: &[Vec<f64>], labels: &[usize], old: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = data.first().map_or(0, Vec::len);
    let k = old.len();
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (x, &c) in data.iter().zip(labels) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(x) {
            *s += v;
        }
    }
    let mut taken: Vec<usize> = Vec::new();
    for c in 0..k {
        if counts[c] > 0 {
            let inv = 1.0 / counts[c] as f64;
            sums[c].iter_mut().for_each(|s| *s *= inv);
            continue;
        }
        let far = data
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken.contains(i))
            .map(|(i, x)| (i, sq_dist(x, &old[labels[i]])))
            .fold(None, |acc: Option<(usize, f64)>, (i, d)| match acc {
                Some((_, bd)) if bd >= d => acc,
                _ => Some((i, d)),
            });
        match far {
            Some((i, _)) => {
                taken.push(i);
                sums[c] = data[i].clone();
            }
            None => sums[c] = old[c].clone(),
        }
    }
    sums
}

fn mean_feature_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dim = data.first().map_or(0, Vec::len);
    if dim == 0 || data.is_empty() {
        return 0.0;
    }
    let total: f64 = (0..dim)
        .map(|d| {
            let mean = data.iter().map(|x| x[d]).sum::<f64>() / n;
            data.iter().map(|x| (x[d] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dim as f64
}

/// Inertia curve of the candidate `k` range and the k chosen from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KSelection {
    pub k: usize,
    pub curve: Vec<(usize, f64)>,
}

/// Elbow selection over `k = 1..=rows/4`, returning the chosen fit.
pub fn fit_auto(data: &[Vec<f64>], config: &KMeansConfig) -> Result<(KMeansFit, KSelection)> {
    let max_k = data.len() / 4;
    if max_k < 1 {
        return Err(AnalysisError::ClusteringUnavailable { rows: data.len() });
    }
    let fits: Vec<KMeansFit> = (1..=max_k)
        .into_par_iter()
        .map(|k| fit(data, k, config))
        .collect::<Result<_>>()?;
    let curve: Vec<(usize, f64)> = fits.iter().map(|f| (f.k, f.inertia)).collect();
    let xs: Vec<f64> = curve.iter().map(|(k, _)| *k as f64).collect();
    let ys: Vec<f64> = curve.iter().map(|(_, i)| *i).collect();
    let idx = match knee_point(&xs, &ys) {
        Some(idx) => idx,
        None => {
            warn!(candidates = max_k, "no knee in the inertia curve, using the smallest k");
            0
        }
    };
    for (k, inertia) in &curve {
        debug!(k, inertia, "k-means inertia");
    }
    let chosen = fits.into_iter().nth(idx).ok_or(AnalysisError::ClusteringUnavailable {
        rows: data.len(),
    })?;
    info!(k = chosen.k, candidates = max_k, "k selected by elbow");
    let selection = KSelection {
        k: chosen.k,
        curve,
    };
    Ok((chosen, selection))
}
