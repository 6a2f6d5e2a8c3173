//! Bind/result codec between caller [`Value`](crate::Value)s and `rusqlite` values.
//!
//! - params: caller values to native bind values
//! - extract: native result columns/rows to structured tables

pub(crate) mod extract;
pub(crate) mod params;

pub use extract::build_result_table;
pub use params::{BindValues, value_to_native};

/// Timestamp layouts accepted when decoding date columns; the first is also the bind format.
pub(crate) const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
