//! Turning rendered markup into structured data
//!
//! - `table`: one HTML table into a [`RawTable`](crate::models::RawTable)
//! - `visibility`: which of several tables is the one on screen
//! - `normalize`: raw tables into typed statistic rows

mod normalize;
mod table;
mod visibility;

pub use normalize::*;
pub use table::*;
pub use visibility::*;
