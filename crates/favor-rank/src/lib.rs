//! Favor rank conversion
//!
//! This crate owns the threshold table that maps a student's favor rank to the
//! minimum cumulative experience needed to hold it, and the two lookups built
//! on top of it:
//!
//! - [`RankTable::total_for`] - rank + exp inside the rank -> cumulative exp
//! - [`RankTable::rank_for`] - cumulative exp -> rank + exp inside the rank
//!
//! Lookups never fail. A rank missing from the table has a threshold of 0, and
//! a value no threshold matches resolves to `(0, 0)`.
//!
//! # Example
//!
//! ```
//! use favor_rank::{RankResult, RankTable};
//!
//! let table = RankTable::builtin();
//! let total = table.total_for(20, 100);
//! assert_eq!(table.rank_for(total), RankResult::new(20, 100));
//! ```

mod builtin;
mod progress;
mod table;

pub use builtin::{DEFAULT_MAX_EXP, MAX_RANK};
pub use progress::{percent_of_max, FavorProgress, PERCENT_DECIMALS};
pub use table::{RankResult, RankTable, RankTableError};
