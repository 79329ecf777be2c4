pub mod collections;
pub mod metric;
