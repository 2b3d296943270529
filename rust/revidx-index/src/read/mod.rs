//! Query-side decoders: dictionaries, posting lists, review metadata and the
//! [`IndexReader`] facade that ties them together.

pub mod dictionary;
pub mod postings;
pub mod reader;
pub mod reviews;

pub use dictionary::{DictionaryEntry, FrontCodedDictionary};
pub use postings::TermPosting;
pub use reader::IndexReader;
