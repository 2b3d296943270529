use std::{fs, path::Path};

use byteorder::{BigEndian, ByteOrder};
use revidx_common::{Result, error::Error, verify_data};

use crate::{
    layout::{COUNT_HEADER_SIZE, reviews_path},
    write::reviews::{REVIEW_ENTRY_SIZE, ReviewEntry},
};

/// In-memory review metadata, addressed by 1-based review id.
pub struct ReviewStore {
    entries: Vec<ReviewEntry>,
    total_tokens: u64,
}

impl ReviewStore {
    pub fn open(dir: &Path) -> Result<ReviewStore> {
        let path = reviews_path(dir);
        let data = fs::read(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
        ReviewStore::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<ReviewStore> {
        verify_data!(reviews, data.len() >= COUNT_HEADER_SIZE);
        let count = BigEndian::read_u32(data) as usize;
        verify_data!(
            reviews,
            data.len() == COUNT_HEADER_SIZE + count * REVIEW_ENTRY_SIZE
        );

        let entries = data[COUNT_HEADER_SIZE..]
            .chunks_exact(REVIEW_ENTRY_SIZE)
            .map(|record| ReviewEntry {
                product_index: BigEndian::read_u32(&record[0..4]),
                helpfulness_numerator: BigEndian::read_u16(&record[4..6]),
                helpfulness_denominator: BigEndian::read_u16(&record[6..8]),
                score: record[8],
                length: BigEndian::read_u32(&record[9..13]),
            })
            .collect::<Vec<_>>();
        let total_tokens = entries.iter().map(|e| e.length as u64).sum();
        Ok(ReviewStore {
            entries,
            total_tokens,
        })
    }

    /// Number of reviews.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the token counts of all reviews.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Returns the metadata of `review_id`, or `None` outside `1..=len`.
    pub fn get(&self, review_id: u32) -> Option<&ReviewEntry> {
        (review_id as usize)
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }
}
