//! Run reports.

pub mod generator;

pub use generator::write_report;
