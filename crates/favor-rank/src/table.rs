//! Rank threshold table and the rank/exp lookups

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::builtin::THRESHOLDS;

/// Error type for tables that break the threshold invariants
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RankTableError {
    #[error("rank table must contain at least one rank")]
    Empty,

    #[error("rank table must start at rank 0 with threshold 0")]
    MissingRankZero,

    #[error("threshold for rank {rank} ({threshold}) must be greater than rank {previous_rank} ({previous_threshold})")]
    NotIncreasing {
        rank: u32,
        threshold: u64,
        previous_rank: u32,
        previous_threshold: u64,
    },
}

/// A rank and the exp accumulated past that rank's threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RankResult {
    pub rank: u32,
    pub exp_into_rank: u64,
}

impl RankResult {
    pub const fn new(rank: u32, exp_into_rank: u64) -> Self {
        Self {
            rank,
            exp_into_rank,
        }
    }
}

impl From<RankResult> for (u32, u64) {
    fn from(result: RankResult) -> Self {
        (result.rank, result.exp_into_rank)
    }
}

/// Ordered mapping of rank -> minimum cumulative exp for that rank
///
/// The table is immutable once built. [`RankTable::builtin`] returns the
/// process-wide default; tables loaded from configuration go through
/// [`RankTable::try_from_thresholds`] so they are checked before use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u32, u64>", into = "BTreeMap<u32, u64>")]
pub struct RankTable {
    thresholds: BTreeMap<u32, u64>,
}

static BUILTIN: OnceLock<RankTable> = OnceLock::new();

impl RankTable {
    /// The built-in table for ranks 0 through 100
    pub fn builtin() -> &'static RankTable {
        BUILTIN.get_or_init(|| {
            Self::from_thresholds(
                THRESHOLDS
                    .iter()
                    .enumerate()
                    .map(|(rank, &threshold)| (rank as u32, threshold)),
            )
        })
    }

    /// Build a table without checking the invariants
    pub fn from_thresholds(thresholds: impl IntoIterator<Item = (u32, u64)>) -> Self {
        Self {
            thresholds: thresholds.into_iter().collect(),
        }
    }

    /// Build a table, rejecting it unless it starts at `0 -> 0` and grows
    /// strictly with rank
    pub fn try_from_thresholds(
        thresholds: impl IntoIterator<Item = (u32, u64)>,
    ) -> Result<Self, RankTableError> {
        let table = Self::from_thresholds(thresholds);
        table.validate()?;
        Ok(table)
    }

    /// Check the table invariants
    pub fn validate(&self) -> Result<(), RankTableError> {
        let mut iter = self.thresholds.iter();

        match iter.next() {
            None => return Err(RankTableError::Empty),
            Some((&0, &0)) => {}
            Some(_) => return Err(RankTableError::MissingRankZero),
        }

        let mut previous = (0u32, 0u64);
        for (&rank, &threshold) in iter {
            if threshold <= previous.1 {
                return Err(RankTableError::NotIncreasing {
                    rank,
                    threshold,
                    previous_rank: previous.0,
                    previous_threshold: previous.1,
                });
            }
            previous = (rank, threshold);
        }

        Ok(())
    }

    /// Cumulative exp for `extra_exp` past the threshold of `rank`
    ///
    /// A rank outside the table counts as threshold 0, so the result is
    /// `extra_exp` unchanged.
    pub fn total_for(&self, rank: u32, extra_exp: u64) -> u64 {
        self.thresholds
            .get(&rank)
            .copied()
            .unwrap_or(0)
            .saturating_add(extra_exp)
    }

    /// Rank held at `cumulative_exp`, and the exp accumulated inside it
    ///
    /// Scans from the highest rank down and stops at the first threshold the
    /// value reaches. Returns `(0, 0)` when nothing matches.
    pub fn rank_for(&self, cumulative_exp: u64) -> RankResult {
        self.thresholds
            .iter()
            .rev()
            .find(|(_, &threshold)| cumulative_exp >= threshold)
            .map(|(&rank, &threshold)| RankResult::new(rank, cumulative_exp - threshold))
            .unwrap_or_default()
    }

    /// Exp still needed to reach the next rank
    ///
    /// Always 0 at or past the highest rank in the table.
    pub fn remaining_to_next(&self, cumulative_exp: u64) -> u64 {
        let current = self.rank_for(cumulative_exp).rank;
        match self.max_rank() {
            Some(max) if current < max => self
                .total_for(current + 1, 0)
                .saturating_sub(cumulative_exp),
            _ => 0,
        }
    }

    /// Threshold of a rank, if the table defines it
    pub fn threshold(&self, rank: u32) -> Option<u64> {
        self.thresholds.get(&rank).copied()
    }

    /// Highest rank in the table
    pub fn max_rank(&self) -> Option<u32> {
        self.thresholds.keys().next_back().copied()
    }

    /// Number of ranks in the table
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Check if the table has no ranks
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Iterate `(rank, threshold)` pairs in ascending rank order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u32, u64)> + '_ {
        self.thresholds.iter().map(|(&rank, &threshold)| (rank, threshold))
    }
}

impl TryFrom<BTreeMap<u32, u64>> for RankTable {
    type Error = RankTableError;

    fn try_from(thresholds: BTreeMap<u32, u64>) -> Result<Self, Self::Error> {
        Self::try_from_thresholds(thresholds)
    }
}

impl From<RankTable> for BTreeMap<u32, u64> {
    fn from(table: RankTable) -> Self {
        table.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_MAX_EXP, MAX_RANK};

    #[test]
    fn test_builtin_shape() {
        let table = RankTable::builtin();
        assert_eq!(table.len(), 101);
        assert_eq!(table.max_rank(), Some(MAX_RANK));
        assert_eq!(table.threshold(0), Some(0));
        assert_eq!(table.threshold(MAX_RANK), Some(DEFAULT_MAX_EXP));
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_builtin_is_shared() {
        assert!(std::ptr::eq(RankTable::builtin(), RankTable::builtin()));
    }

    #[test]
    fn test_total_for() {
        let table = RankTable::builtin();
        assert_eq!(table.total_for(0, 0), 0);
        assert_eq!(table.total_for(1, 0), 15);
        assert_eq!(table.total_for(2, 7), 37);
        assert_eq!(table.total_for(100, 0), 240_225);
    }

    #[test]
    fn test_total_for_unknown_rank() {
        let table = RankTable::builtin();
        assert_eq!(table.total_for(101, 0), 0);
        assert_eq!(table.total_for(101, 42), 42);
        assert_eq!(table.total_for(u32::MAX, 7), 7);
    }

    #[test]
    fn test_total_for_saturates() {
        let table = RankTable::builtin();
        assert_eq!(table.total_for(100, u64::MAX), u64::MAX);
    }

    #[test]
    fn test_rank_for_zero() {
        assert_eq!(RankTable::builtin().rank_for(0), RankResult::new(0, 0));
    }

    #[test]
    fn test_rank_for_inside_rank() {
        let table = RankTable::builtin();
        assert_eq!(table.rank_for(14), RankResult::new(0, 14));
        assert_eq!(table.rank_for(15), RankResult::new(1, 0));
        assert_eq!(table.rank_for(29), RankResult::new(1, 14));
        assert_eq!(table.rank_for(1000), RankResult::new(15, 46));
    }

    #[test]
    fn test_rank_for_at_cap() {
        let table = RankTable::builtin();
        assert_eq!(table.rank_for(240_225), RankResult::new(100, 0));
        assert_eq!(table.rank_for(240_224), RankResult::new(99, 7141));
    }

    #[test]
    fn test_rank_for_past_cap() {
        let table = RankTable::builtin();
        assert_eq!(table.rank_for(250_000), RankResult::new(100, 9775));
    }

    #[test]
    fn test_rank_for_empty_table() {
        let table = RankTable::default();
        assert_eq!(table.rank_for(0), RankResult::new(0, 0));
        assert_eq!(table.rank_for(12_345), RankResult::new(0, 0));
        assert_eq!(table.total_for(3, 9), 9);
        assert_eq!(table.remaining_to_next(12_345), 0);
    }

    #[test]
    fn test_rank_for_table_without_zero() {
        let table = RankTable::from_thresholds([(1, 10), (2, 20)]);
        assert_eq!(table.rank_for(5), RankResult::new(0, 0));
        assert_eq!(table.rank_for(25), RankResult::new(2, 5));
    }

    #[test]
    fn test_remaining_to_next() {
        let table = RankTable::builtin();
        assert_eq!(table.remaining_to_next(0), 15);
        assert_eq!(table.remaining_to_next(20), 10);
        assert_eq!(table.remaining_to_next(233_083), 7142);
        assert_eq!(table.remaining_to_next(240_224), 1);
    }

    #[test]
    fn test_remaining_to_next_at_max_rank() {
        let table = RankTable::builtin();
        assert_eq!(table.remaining_to_next(240_225), 0);
        assert_eq!(table.remaining_to_next(999_999), 0);
    }

    #[test]
    fn test_remaining_to_next_with_gap_in_ranks() {
        // rank 2 is missing, so its threshold falls back to 0
        let table = RankTable::from_thresholds([(0, 0), (1, 10), (3, 30)]);
        assert_eq!(table.remaining_to_next(15), 0);
        assert_eq!(table.remaining_to_next(5), 5);
    }

    #[test]
    fn test_validate_errors() {
        assert_eq!(
            RankTable::try_from_thresholds([]).unwrap_err(),
            RankTableError::Empty
        );
        assert_eq!(
            RankTable::try_from_thresholds([(0, 5), (1, 10)]).unwrap_err(),
            RankTableError::MissingRankZero
        );
        assert_eq!(
            RankTable::try_from_thresholds([(1, 0), (2, 10)]).unwrap_err(),
            RankTableError::MissingRankZero
        );
        assert_eq!(
            RankTable::try_from_thresholds([(0, 0), (1, 10), (2, 10)]).unwrap_err(),
            RankTableError::NotIncreasing {
                rank: 2,
                threshold: 10,
                previous_rank: 1,
                previous_threshold: 10,
            }
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let table: RankTable = serde_json::from_str(r#"{"0": 0, "1": 10, "2": 25}"#).unwrap();
        assert_eq!(table.max_rank(), Some(2));
        assert_eq!(table.rank_for(24), RankResult::new(1, 14));

        let bad = serde_json::from_str::<RankTable>(r#"{"0": 0, "1": 10, "2": 5}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_rank_result_into_tuple() {
        let pair: (u32, u64) = RankResult::new(4, 9).into();
        assert_eq!(pair, (4, 9));
    }
}
