pub mod hierarchical;
pub mod kmeans;
pub mod knee;
pub mod results;
pub mod tsne;

use tracing::{debug, info};

use crate::{
    config::{ClusterCount, KMeansConfig},
    error::{AnalysisError, Result},
    vectorizer::score::ActiveMatrix,
};

use hierarchical::{LinkageMatrix, LinkageMethod};
use results::{ClusterMethod, ClusterResult};

/// Renumbers labels so that the first row carries 0, the next unseen label 1, and so on.
pub fn relabel_by_first_appearance(labels: &[usize]) -> Vec<usize> {
    let mut seen: Vec<usize> = Vec::new();
    labels
        .iter()
        .map(|l| match seen.iter().position(|s| s == l) {
            Some(pos) => pos,
            None => {
                seen.push(*l);
                seen.len() - 1
            }
        })
        .collect()
}

/// Lifecycle of an `AuthorCluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// nothing fitted yet
    Unfit,
    /// a linkage matrix exists, no labels yet
    Fit,
    /// at least one labeling produced
    Labeled,
}

/// Result of `AuthorCluster::hierarchical`.
#[derive(Debug, Clone, PartialEq)]
pub enum HierarchicalOutcome {
    Uncut(LinkageMatrix),
    Labeled(ClusterResult),
}

/// Clustering views over the active rows of one period's score matrix.
///
/// All views share the matrix's cached projection.
#[derive(Debug)]
pub struct AuthorCluster<'m> {
    matrix: &'m ActiveMatrix,
    state: ClusterState,
    linkage: Option<LinkageMatrix>,
}

impl<'m> AuthorCluster<'m> {
    pub fn new(matrix: &'m ActiveMatrix) -> Self {
        Self {
            matrix,
            state: ClusterState::Unfit,
            linkage: None,
        }
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn matrix(&self) -> &ActiveMatrix {
        self.matrix
    }

    /// k-means labels for the active authors.
    pub fn kmeans(&mut self, count: ClusterCount, config: &KMeansConfig) -> Result<ClusterResult> {
        let rows = &self.matrix.rows;
        let (fit, selection) = match count {
            ClusterCount::Auto => {
                let (fit, selection) = kmeans::fit_auto(rows, config)?;
                (fit, Some(selection))
            }
            ClusterCount::Fixed(k) => (kmeans::fit(rows, k, config)?, None),
        };
        info!(
            period = self.matrix.period,
            k = fit.k,
            authors = rows.len(),
            inertia = fit.inertia,
            "k-means fitted"
        );
        self.state = ClusterState::Labeled;
        Ok(self.result(
            ClusterMethod::KMeans { k: fit.k, selection },
            relabel_by_first_appearance(&fit.labels),
        ))
    }

    /// Computes the linkage matrix, reusing the cached one when `method` matches.
    pub fn fit_linkage(&mut self, method: LinkageMethod) -> &LinkageMatrix {
        if self.linkage.as_ref().is_some_and(|l| l.method != method) {
            self.linkage = None;
        }
        if self.state == ClusterState::Unfit {
            self.state = ClusterState::Fit;
        }
        let matrix = self.matrix;
        self.linkage.get_or_insert_with(|| {
            debug!(period = matrix.period, %method, "computing linkage");
            LinkageMatrix::compute(&matrix.rows, method)
        })
    }

    pub fn linkage(&self) -> Option<&LinkageMatrix> {
        self.linkage.as_ref()
    }

    /// Flat labels from the current linkage matrix.
    pub fn cut(&mut self, cutoff: f64) -> Result<ClusterResult> {
        let linkage = self.linkage.as_ref().ok_or(AnalysisError::LinkageMissing)?;
        let labels = linkage.cut(cutoff);
        let method = ClusterMethod::Hierarchical {
            linkage: linkage.method,
            cutoff,
        };
        self.state = ClusterState::Labeled;
        Ok(self.result(method, labels))
    }

    /// Linkage for `method`, cut at `cutoff` when one is given.
    pub fn hierarchical(
        &mut self,
        method: LinkageMethod,
        cutoff: Option<f64>,
    ) -> Result<HierarchicalOutcome> {
        let linkage = self.fit_linkage(method).clone();
        match cutoff {
            None => Ok(HierarchicalOutcome::Uncut(linkage)),
            Some(c) => self.cut(c).map(HierarchicalOutcome::Labeled),
        }
    }

    fn result(&self, method: ClusterMethod, labels: Vec<usize>) -> ClusterResult {
        ClusterResult {
            period: self.matrix.period,
            method,
            authors: self.matrix.authors.clone(),
            labels,
            embedding: self.matrix.embedding().to_vec(),
            omitted: self.matrix.omitted.clone(),
        }
    }
}
