//! Spreadsheet loading: raw rows in, populated reference graph out.

pub mod parse;
pub mod row;

pub use parse::{load_sheet, read_rows};
pub use row::{AuxMacro, MetricRecord, TopdownNode};
