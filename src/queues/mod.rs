//! Stream-processing pipelines for each subcommand.

pub mod classify;
pub mod scan;
pub mod work;
