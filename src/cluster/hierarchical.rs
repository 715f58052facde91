use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{AnalysisError, Result},
    vectorizer::compute::{Compare, DefaultCompare},
};

/// Linkage criterion for agglomerative clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
    Weighted,
    Centroid,
    Median,
    Ward,
}

impl LinkageMethod {
    pub const ALL: [LinkageMethod; 7] = [
        LinkageMethod::Single,
        LinkageMethod::Complete,
        LinkageMethod::Average,
        LinkageMethod::Weighted,
        LinkageMethod::Centroid,
        LinkageMethod::Median,
        LinkageMethod::Ward,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LinkageMethod::Single => "single",
            LinkageMethod::Complete => "complete",
            LinkageMethod::Average => "average",
            LinkageMethod::Weighted => "weighted",
            LinkageMethod::Centroid => "centroid",
            LinkageMethod::Median => "median",
            LinkageMethod::Ward => "ward",
        }
    }

    /// centroid, median and ward are updated on squared distances
    fn squared(&self) -> bool {
        matches!(self, LinkageMethod::Centroid | LinkageMethod::Median | LinkageMethod::Ward)
    }

    /// Lance-Williams update: distance from the merge of `i` and `j` to `k`.
    fn update(&self, d_ik: f64, d_jk: f64, d_ij: f64, n_i: f64, n_j: f64, n_k: f64) -> f64 {
        match self {
            LinkageMethod::Single => d_ik.min(d_jk),
            LinkageMethod::Complete => d_ik.max(d_jk),
            LinkageMethod::Average => (n_i * d_ik + n_j * d_jk) / (n_i + n_j),
            LinkageMethod::Weighted => (d_ik + d_jk) / 2.0,
            LinkageMethod::Centroid => {
                let n = n_i + n_j;
                (n_i * d_ik + n_j * d_jk) / n - n_i * n_j * d_ij / (n * n)
            }
            LinkageMethod::Median => d_ik / 2.0 + d_jk / 2.0 - d_ij / 4.0,
            LinkageMethod::Ward => {
                ((n_i + n_k) * d_ik + (n_j + n_k) * d_jk - n_k * d_ij) / (n_i + n_j + n_k)
            }
        }
    }
}

impl FromStr for LinkageMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        LinkageMethod::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| AnalysisError::InvalidLinkage(s.to_string()))
    }
}

impl fmt::Display for LinkageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One merge. Leaves are `0..n`, the cluster formed at step `s` is `n + s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkageStep {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// leaves under the new cluster
    pub size: usize,
}

/// `n - 1` merges in order, `left < right` on every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkageMatrix {
    pub method: LinkageMethod,
    pub leaves: usize,
    pub steps: Vec<LinkageStep>,
}

impl LinkageMatrix {
    /// Agglomerative clustering over Euclidean distances between rows.
    /// The closest pair merges first; equal distances go to the lowest slot pair.
    pub fn compute(data: &[Vec<f64>], method: LinkageMethod) -> Self {
        let n = data.len();
        let squared = method.squared();
        let mut dist = vec![0.0f64; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = if squared {
                    <DefaultCompare as Compare<f64>>::squared_euclidean(&data[i], &data[j])
                } else {
                    <DefaultCompare as Compare<f64>>::euclidean_distance(&data[i], &data[j])
                };
                dist[i * n + j] = d;
                dist[j * n + i] = d;
            }
        }

        // slot -> (cluster id, size); a slot is freed when merged into a lower one
        let mut active: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
        let mut steps = Vec::with_capacity(n.saturating_sub(1));
        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if active[i].is_none() {
                    continue;
                }
                for j in (i + 1)..n {
                    if active[j].is_none() {
                        continue;
                    }
                    let d = dist[i * n + j];
                    if best.map_or(true, |(_, _, b)| d < b) {
                        best = Some((i, j, d));
                    }
                }
            }
            let Some((i, j, d_ij)) = best else { break };
            let (Some((id_i, n_i)), Some((id_j, n_j))) = (active[i], active[j]) else {
                break;
            };
            for k in 0..n {
                if k == i || k == j {
                    continue;
                }
                let Some((_, n_k)) = active[k] else { continue };
                let d = method
                    .update(
                        dist[i * n + k],
                        dist[j * n + k],
                        d_ij,
                        n_i as f64,
                        n_j as f64,
                        n_k as f64,
                    )
                    .max(0.0);
                dist[i * n + k] = d;
                dist[k * n + i] = d;
            }
            active[i] = Some((n + step, n_i + n_j));
            active[j] = None;
            steps.push(LinkageStep {
                left: id_i.min(id_j),
                right: id_i.max(id_j),
                distance: if squared { d_ij.sqrt() } else { d_ij },
                size: n_i + n_j,
            });
        }
        Self {
            method,
            leaves: n,
            steps,
        }
    }

    /// Flat labels for a distance threshold: every subtree whose merges all
    /// happen at or below `cutoff` becomes one cluster. Labels are numbered
    /// by first appearance in leaf order.
    pub fn cut(&self, cutoff: f64) -> Vec<usize> {
        let n = self.leaves;
        if n == 0 {
            return Vec::new();
        }
        // highest merge distance anywhere inside each internal node
        let mut max_dist = vec![0.0f64; self.steps.len()];
        for (s, step) in self.steps.iter().enumerate() {
            let child = |c: usize| if c >= n { max_dist[c - n] } else { 0.0 };
            let d = step.distance.max(child(step.left)).max(child(step.right));
            max_dist[s] = d;
        }

        let mut raw = vec![usize::MAX; n];
        let mut next_cluster = 0usize;
        // roots: nodes never used as a child
        let mut is_child = vec![false; n + self.steps.len()];
        for step in &self.steps {
            is_child[step.left] = true;
            is_child[step.right] = true;
        }
        let mut stack: Vec<usize> = (0..n + self.steps.len()).filter(|c| !is_child[*c]).collect();
        while let Some(node) = stack.pop() {
            if node < n {
                raw[node] = next_cluster;
                next_cluster += 1;
            } else if max_dist[node - n] <= cutoff {
                for leaf in self.leaves_under(node) {
                    raw[leaf] = next_cluster;
                }
                next_cluster += 1;
            } else {
                let step = &self.steps[node - n];
                stack.push(step.right);
                stack.push(step.left);
            }
        }
        super::relabel_by_first_appearance(&raw)
    }

    fn leaves_under(&self, node: usize) -> Vec<usize> {
        let n = self.leaves;
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(c) = stack.pop() {
            if c < n {
                out.push(c);
            } else {
                let step = &self.steps[c - n];
                stack.push(step.left);
                stack.push(step.right);
            }
        }
        out
    }
}
