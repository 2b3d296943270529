//! Test utilities for the revidx crates.
//!
//! - [`data_gen`]: deterministic synthetic review corpora
//! - [`dirs`]: scratch directories for index builds

pub mod data_gen;
pub mod dirs;
