//! Display values derived from a cumulative exp total

use serde::{Deserialize, Serialize};

use crate::table::RankTable;

/// Decimal places kept by [`percent_of_max`]
pub const PERCENT_DECIMALS: i32 = 4;

/// Progress towards `max_exp`, in percent rounded to [`PERCENT_DECIMALS`]
///
/// A cap of 0 yields 0.0.
pub fn percent_of_max(cumulative_exp: u64, max_exp: u64) -> f64 {
    if max_exp == 0 {
        return 0.0;
    }
    let scale = 10f64.powi(PERCENT_DECIMALS);
    let percent = cumulative_exp as f64 / max_exp as f64 * 100.0;
    (percent * scale).round() / scale
}

/// Everything shown for one student, recomputed from the cumulative total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FavorProgress {
    pub cumulative: u64,
    pub rank: u32,
    pub exp_into_rank: u64,
    pub remaining_to_next: u64,
    pub percent_of_max: f64,
}

impl FavorProgress {
    pub fn compute(table: &RankTable, cumulative: u64, max_exp: u64) -> Self {
        let result = table.rank_for(cumulative);
        Self {
            cumulative,
            rank: result.rank,
            exp_into_rank: result.exp_into_rank,
            remaining_to_next: table.remaining_to_next(cumulative),
            percent_of_max: percent_of_max(cumulative, max_exp),
        }
    }
}
