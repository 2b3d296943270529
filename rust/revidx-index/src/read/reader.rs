//! High-level query interface over an index directory.

use std::path::{Path, PathBuf};

use log::debug;
use revidx_common::{Result, error::Error};

use crate::{
    layout::DictionaryKind,
    read::{
        dictionary::{DictionaryEntry, FrontCodedDictionary},
        postings::{PostingsReader, TermPosting},
        reviews::ReviewStore,
    },
    tokenizer::{normalize_product_id, normalize_term},
    write::reviews::ReviewEntry,
};

/// Read-only view of a built index.
///
/// Dictionaries and review metadata are held in memory; posting lists are read
/// from disk on demand.
///
/// Lookups that miss (unknown token, unknown product, review id outside
/// `1..=number_of_reviews()`) return empty, zero or `None` results. Errors are
/// reserved for I/O failures and corrupt index files.
pub struct IndexReader {
    dir: PathBuf,
    terms: FrontCodedDictionary,
    products: FrontCodedDictionary,
    term_postings: PostingsReader,
    product_postings: PostingsReader,
    reviews: ReviewStore,
}

impl IndexReader {
    /// Opens the index stored in `dir`.
    ///
    /// # Errors
    /// Returns an error if an index file is missing, unreadable or malformed.
    pub fn open(dir: impl AsRef<Path>) -> Result<IndexReader> {
        let dir = dir.as_ref();
        let terms = FrontCodedDictionary::open(dir, DictionaryKind::Term)?;
        let products = FrontCodedDictionary::open(dir, DictionaryKind::Product)?;
        let term_postings = PostingsReader::open(dir, DictionaryKind::Term)?;
        let product_postings = PostingsReader::open(dir, DictionaryKind::Product)?;
        let reviews = ReviewStore::open(dir)?;

        let dangling = |id: u32| {
            reviews
                .get(id)
                .is_some_and(|r| r.product_index as usize >= products.len())
        };
        if let Some(bad) = (1..=reviews.len() as u32).find(|&id| dangling(id)) {
            return Err(Error::invalid_format(
                "reviews",
                format!("review {bad} references a missing product"),
            ));
        }

        debug!(
            "opened index {}: {} reviews, {} terms, {} products",
            dir.display(),
            reviews.len(),
            terms.len(),
            products.len()
        );
        Ok(IndexReader {
            dir: dir.to_path_buf(),
            terms,
            products,
            term_postings,
            product_postings,
            reviews,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn term_dictionary(&self) -> &FrontCodedDictionary {
        &self.terms
    }

    pub fn product_dictionary(&self) -> &FrontCodedDictionary {
        &self.products
    }

    /// Returns the full metadata of a review.
    pub fn review(&self, review_id: u32) -> Option<&ReviewEntry> {
        self.reviews.get(review_id)
    }

    /// Returns the product identifier of a review, upper-cased.
    pub fn product_id(&self, review_id: u32) -> Option<String> {
        let entry = self.reviews.get(review_id)?;
        let product = self.products.term_at(entry.product_index as usize)?;
        Some(String::from_utf8_lossy(&product).to_ascii_uppercase())
    }

    pub fn review_score(&self, review_id: u32) -> Option<u8> {
        self.reviews.get(review_id).map(|r| r.score)
    }

    pub fn review_helpfulness_numerator(&self, review_id: u32) -> Option<u16> {
        self.reviews.get(review_id).map(|r| r.helpfulness_numerator)
    }

    pub fn review_helpfulness_denominator(&self, review_id: u32) -> Option<u16> {
        self.reviews.get(review_id).map(|r| r.helpfulness_denominator)
    }

    /// Number of tokens in the review text.
    pub fn review_length(&self, review_id: u32) -> Option<u32> {
        self.reviews.get(review_id).map(|r| r.length)
    }

    fn term_entry(&self, token: &str) -> Option<DictionaryEntry> {
        let index = self.terms.find(&normalize_term(token))?;
        self.terms.entry(index)
    }

    /// Number of reviews containing `token`; 0 for unknown tokens.
    pub fn token_frequency(&self, token: &str) -> u32 {
        self.term_entry(token).map_or(0, |e| e.frequency)
    }

    /// Total number of occurrences of `token` over all reviews.
    pub fn token_collection_frequency(&self, token: &str) -> Result<u64> {
        match self.term_entry(token) {
            Some(entry) => self.term_postings.collection_frequency(entry),
            None => Ok(0),
        }
    }

    /// Reviews containing `token`, ascending by review id, with per-review counts.
    pub fn reviews_with_token(&self, token: &str) -> Result<Vec<TermPosting>> {
        match self.term_entry(token) {
            Some(entry) => self.term_postings.term_postings(entry),
            None => Ok(Vec::new()),
        }
    }

    /// Ids of the reviews of a product, ascending. Matching is case-insensitive.
    pub fn product_reviews(&self, product_id: &str) -> Result<Vec<u32>> {
        let entry = self
            .products
            .find(&normalize_product_id(product_id.as_bytes()))
            .and_then(|index| self.products.entry(index));
        match entry {
            Some(entry) => self.product_postings.review_ids(entry),
            None => Ok(Vec::new()),
        }
    }

    pub fn number_of_reviews(&self) -> u32 {
        self.reviews.len() as u32
    }

    /// Total number of tokens over all reviews.
    pub fn token_size_of_reviews(&self) -> u64 {
        self.reviews.total_tokens()
    }
}
