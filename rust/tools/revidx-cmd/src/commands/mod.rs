//! Command implementations for the revidx command line

pub mod build;
pub mod query;
pub mod remove;
