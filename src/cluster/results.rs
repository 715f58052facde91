use std::{collections::BTreeMap, fmt::Write as _, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    cluster::{hierarchical::LinkageMethod, kmeans::KSelection},
    document::AuthorKey,
    error::{AnalysisError, Result},
    persist,
    period::{PeriodId, PeriodMap},
};

/// How a set of labels was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusterMethod {
    KMeans {
        k: usize,
        selection: Option<KSelection>,
    },
    Hierarchical {
        linkage: LinkageMethod,
        cutoff: f64,
    },
}

/// Labels, projection and omitted authors of one period.
///
/// `labels[i]` and `embedding[i]` belong to `authors[i]`; omitted authors had
/// no nonzero score and were never clustered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub period: PeriodId,
    pub method: ClusterMethod,
    pub authors: Vec<AuthorKey>,
    pub labels: Vec<usize>,
    pub embedding: Vec<[f64; 2]>,
    pub omitted: Vec<AuthorKey>,
}

impl ClusterResult {
    pub fn cluster_count(&self) -> usize {
        self.labels.iter().max().map_or(0, |m| m + 1)
    }

    /// Authors per label, in label order, keeping row order inside a group.
    pub fn groups(&self) -> BTreeMap<usize, Vec<&AuthorKey>> {
        let mut groups: BTreeMap<usize, Vec<&AuthorKey>> = BTreeMap::new();
        for (author, label) in self.authors.iter().zip(&self.labels) {
            groups.entry(*label).or_default().push(author);
        }
        groups
    }

    /// Plain text listing; clusters are numbered from 1.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\nYear Period beginning: {}", self.period);
        for (label, authors) in self.groups() {
            let _ = writeln!(out, "\n\tCluster: {}\n", label + 1);
            for a in authors {
                let _ = writeln!(out, "\t\t{a}");
            }
        }
        if !self.omitted.is_empty() {
            let _ = writeln!(out, "\n\tOmitted (no keyword weight):\n");
            for a in &self.omitted {
                let _ = writeln!(out, "\t\t{a}");
            }
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persist::write_snapshot(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        persist::read_snapshot(path)
    }
}

/// Writes the grouped listing of every period to one text file.
pub fn write_groups(results: &PeriodMap<ClusterResult>, path: impl AsRef<Path>) -> Result<()> {
    let path = persist::checked_output_path(path.as_ref())?;
    let text: String = results.values().map(ClusterResult::report).collect();
    fs::write(path, text).map_err(|e| AnalysisError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ClusterResult {
        ClusterResult {
            period: 1850,
            method: ClusterMethod::KMeans { k: 2, selection: None },
            authors: ["b", "a", "c"].into_iter().map(AuthorKey::normalize).collect(),
            labels: vec![0, 1, 0],
            embedding: vec![[0.0, 0.0]; 3],
            omitted: vec![AuthorKey::normalize("z")],
        }
    }

    #[test]
    fn groups_follow_labels() {
        let r = result();
        assert_eq!(r.cluster_count(), 2);
        let g = r.groups();
        let names: Vec<&str> = g[&0].iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(g[&1].len(), 1);
    }

    #[test]
    fn report_numbers_clusters_from_one() {
        let text = result().report();
        assert!(text.contains("Year Period beginning: 1850"));
        assert!(text.contains("Cluster: 1"));
        assert!(text.contains("Cluster: 2"));
        assert!(!text.contains("Cluster: 0"));
        assert!(text.contains("\t\tz\n"));
    }

    #[test]
    fn writes_all_periods() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/groups.txt");
        let mut results = PeriodMap::new();
        results.insert(1850, result());
        write_groups(&results, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Cluster: 2"));
    }

    #[test]
    fn empty_path_is_rejected() {
        let results = PeriodMap::new();
        assert!(matches!(write_groups(&results, ""), Err(AnalysisError::EmptyOutputPath)));
    }
}
