//! Disk-resident inverted index over product reviews.
//!
//! # Overview
//!
//! An index is built once from a line-oriented review corpus and then queried from
//! its on-disk artifacts without touching the corpus again:
//!
//! - two front-coded dictionaries, one of review terms and one of product ids;
//! - two postings files with gap-encoded lists of review ids per dictionary entry;
//! - a fixed-width review metadata store addressed by review id.
//!
//! Construction ([`IndexWriter`]) runs a parallel two-pass scan of the corpus and
//! sorts the `(id, review_id)` occurrence pairs externally, so memory use stays
//! bounded regardless of corpus size. Queries go through [`IndexReader`].
//!
//! # Quick Start
//!
//! ```no_run
//! use revidx_index::{IndexReader, IndexWriter, IndexWriterParams};
//!
//! # fn main() -> revidx_common::Result<()> {
//! let writer = IndexWriter::new(IndexWriterParams::default());
//! writer.write("reviews.txt".as_ref(), "index".as_ref())?;
//!
//! let reader = IndexReader::open("index")?;
//! let count = reader.token_frequency("tasty");
//! let reviews = reader.reviews_with_token("tasty")?;
//! # Ok(())
//! # }
//! ```

pub mod corpus;
pub mod layout;
pub mod read;
pub mod tokenizer;
pub mod varint;
pub mod write;

pub use layout::DictionaryKind;
pub use read::{IndexReader, TermPosting};
pub use write::{IndexSummary, IndexWriter, IndexWriterParams, ReviewEntry, remove_index};
