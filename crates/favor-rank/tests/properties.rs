//! Property tests for the rank table laws

use favor_rank::{percent_of_max, RankResult, RankTable, DEFAULT_MAX_EXP, MAX_RANK};
use proptest::prelude::*;

fn gap_after(table: &RankTable, rank: u32) -> Option<u64> {
    let here = table.threshold(rank)?;
    let next = table.threshold(rank + 1)?;
    Some(next - here)
}

#[test]
fn every_threshold_lands_on_its_rank() {
    let table = RankTable::builtin();
    for (rank, threshold) in table.iter() {
        assert_eq!(table.rank_for(threshold), RankResult::new(rank, 0));
    }
}

#[test]
fn last_exp_before_threshold_belongs_to_previous_rank() {
    let table = RankTable::builtin();
    for (rank, threshold) in table.iter().skip(1) {
        let below = table.rank_for(threshold - 1);
        assert_eq!(below.rank, rank - 1);
        assert_eq!(Some(below.exp_into_rank + 1), gap_after(table, rank - 1));
    }
}

proptest! {
    #[test]
    fn round_trip_within_rank(rank in 0..MAX_RANK, offset in any::<u64>()) {
        let table = RankTable::builtin();
        let gap = gap_after(table, rank).unwrap();
        let extra = offset % gap;

        let result = table.rank_for(table.total_for(rank, extra));
        prop_assert_eq!(result, RankResult::new(rank, extra));
    }

    #[test]
    fn round_trip_at_max_rank(extra in 0u64..1_000_000) {
        let table = RankTable::builtin();
        let result = table.rank_for(table.total_for(MAX_RANK, extra));
        prop_assert_eq!(result, RankResult::new(MAX_RANK, extra));
    }

    #[test]
    fn rank_is_monotonic(a in 0u64..300_000, b in 0u64..300_000) {
        let table = RankTable::builtin();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(table.rank_for(low).rank <= table.rank_for(high).rank);
    }

    #[test]
    fn exp_into_rank_stays_below_gap(cumulative in 0u64..DEFAULT_MAX_EXP) {
        let table = RankTable::builtin();
        let result = table.rank_for(cumulative);
        let gap = gap_after(table, result.rank).unwrap();
        prop_assert!(result.exp_into_rank < gap);
    }

    #[test]
    fn unknown_rank_adds_nothing(rank in (MAX_RANK + 1)..=u32::MAX, extra in any::<u64>()) {
        prop_assert_eq!(RankTable::builtin().total_for(rank, extra), extra);
    }

    #[test]
    fn remaining_never_overshoots(cumulative in 0u64..400_000) {
        let table = RankTable::builtin();
        let remaining = table.remaining_to_next(cumulative);
        let rank = table.rank_for(cumulative).rank;
        if rank >= MAX_RANK {
            prop_assert_eq!(remaining, 0);
        } else {
            prop_assert!(remaining > 0);
            prop_assert_eq!(table.rank_for(cumulative + remaining).rank, rank + 1);
        }
    }

    #[test]
    fn percent_is_monotonic(a in 0u64..DEFAULT_MAX_EXP, b in 0u64..DEFAULT_MAX_EXP) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(percent_of_max(low, DEFAULT_MAX_EXP) <= percent_of_max(high, DEFAULT_MAX_EXP));
    }
}
