//! Core definitions shared by all revidx-* crates: the error type, the `Result` alias
//! and the argument/data verification macros.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;
