use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// A period is identified by its lower bound year.
pub type PeriodId = i32;

/// Per-period results, in ascending period order.
pub type PeriodMap<V> = IndexMap<PeriodId, V>;

/// Period Index
/// Maps a year onto one of the half-open periods `[b_i, b_{i+1})` defined by a
/// strictly increasing list of boundaries.
///
/// # Serialization
/// Serialized as the plain boundary list; deserialization re-validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct PeriodIndex {
    boundaries: Vec<i32>,
}

impl PeriodIndex {
    /// 境界リストから生成
    /// # Arguments
    /// * `boundaries` - strictly increasing, at least two entries
    pub fn new(boundaries: Vec<i32>) -> Result<Self> {
        if boundaries.len() < 2 || boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalysisError::InvalidBoundaries(boundaries));
        }
        Ok(Self { boundaries })
    }

    /// Assigns a year to the period whose range contains it.
    pub fn assign(&self, year: i32) -> Result<PeriodId> {
        let (start, end) = (self.start(), self.end());
        if year < start || year >= end {
            return Err(AnalysisError::OutOfRange { year, start, end });
        }
        // number of boundaries <= year, at least 1 here
        let upper = self.boundaries.partition_point(|b| *b <= year);
        Ok(self.boundaries[upper - 1])
    }

    /// Period ids (lower bounds) in ascending order.
    pub fn periods(&self) -> impl Iterator<Item = PeriodId> + '_ {
        self.boundaries[..self.boundaries.len() - 1].iter().copied()
    }

    /// `[start, end)` of the given period.
    pub fn range(&self, period: PeriodId) -> Option<(i32, i32)> {
        let pos = self.boundaries.binary_search(&period).ok()?;
        self.boundaries.get(pos + 1).map(|end| (period, *end))
    }

    pub fn contains(&self, period: PeriodId) -> bool {
        self.range(period).is_some()
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self) -> i32 {
        self.boundaries[0]
    }

    pub fn end(&self) -> i32 {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn boundaries(&self) -> &[i32] {
        &self.boundaries
    }

    /// Empty map with one slot per period, in period order.
    pub fn map_with<V>(&self, mut init: impl FnMut(PeriodId) -> V) -> PeriodMap<V> {
        self.periods().map(|p| (p, init(p))).collect()
    }
}

impl TryFrom<Vec<i32>> for PeriodIndex {
    type Error = AnalysisError;

    fn try_from(value: Vec<i32>) -> Result<Self> {
        PeriodIndex::new(value)
    }
}

impl From<PeriodIndex> for Vec<i32> {
    fn from(value: PeriodIndex) -> Self {
        value.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PeriodIndex {
        PeriodIndex::new(vec![1800, 1850, 1900]).unwrap()
    }

    #[test]
    fn rejects_invalid_boundaries() {
        assert!(matches!(PeriodIndex::new(vec![]), Err(AnalysisError::InvalidBoundaries(_))));
        assert!(matches!(PeriodIndex::new(vec![1800]), Err(AnalysisError::InvalidBoundaries(_))));
        assert!(matches!(
            PeriodIndex::new(vec![1800, 1800, 1900]),
            Err(AnalysisError::InvalidBoundaries(_))
        ));
        assert!(matches!(
            PeriodIndex::new(vec![1900, 1850]),
            Err(AnalysisError::InvalidBoundaries(_))
        ));
    }

    #[test]
    fn assigns_half_open_ranges() {
        let idx = index();
        assert_eq!(idx.assign(1800).unwrap(), 1800);
        assert_eq!(idx.assign(1849).unwrap(), 1800);
        assert_eq!(idx.assign(1850).unwrap(), 1850);
        assert_eq!(idx.assign(1899).unwrap(), 1850);
        assert!(matches!(
            idx.assign(1900),
            Err(AnalysisError::OutOfRange { year: 1900, start: 1800, end: 1900 })
        ));
        assert!(matches!(idx.assign(1799), Err(AnalysisError::OutOfRange { .. })));
    }

    #[test]
    fn every_in_range_year_lands_in_exactly_one_period() {
        let idx = PeriodIndex::new(vec![1700, 1713, 1800, 1801, 1950]).unwrap();
        for year in 1650..2000 {
            let hits: Vec<PeriodId> = idx
                .periods()
                .filter(|p| {
                    let (s, e) = idx.range(*p).unwrap();
                    s <= year && year < e
                })
                .collect();
            match idx.assign(year) {
                Ok(p) => assert_eq!(hits, vec![p], "year {year}"),
                Err(_) => assert!(hits.is_empty(), "year {year}"),
            }
        }
    }

    #[test]
    fn periods_and_ranges() {
        let idx = index();
        assert_eq!(idx.periods().collect::<Vec<_>>(), vec![1800, 1850]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.range(1850), Some((1850, 1900)));
        assert_eq!(idx.range(1900), None);
        assert!(!idx.contains(1825));
        let m = idx.map_with(|p| p * 2);
        assert_eq!(m.keys().copied().collect::<Vec<_>>(), vec![1800, 1850]);
    }

    #[test]
    fn deserialization_validates() {
        let idx: PeriodIndex = serde_json::from_str("[1800,1850]").unwrap();
        assert_eq!(idx.boundaries(), &[1800, 1850]);
        assert!(serde_json::from_str::<PeriodIndex>("[1850,1800]").is_err());
    }
}
