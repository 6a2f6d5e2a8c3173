//! Structured results handed back to the caller.

mod row;
mod table;

pub use row::Row;
pub use table::{ColumnMetadata, ExecuteOutcome, ResultTable};
