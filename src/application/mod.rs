//! Application services driving the fetch engine from the command line.

pub mod batch;
pub mod error;
