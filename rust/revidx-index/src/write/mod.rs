//! Index construction: external sorting of occurrence pairs, posting list and
//! dictionary encoding, review metadata, and the [`IndexWriter`] pipeline.

pub mod builder;
pub mod dictionary;
pub mod postings;
pub mod reviews;
pub mod sorter;
pub mod vocabulary;

pub use builder::{IndexSummary, IndexWriter, IndexWriterParams, remove_index};
pub use reviews::ReviewEntry;
