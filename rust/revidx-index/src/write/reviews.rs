//! Review metadata store builder.
//!
//! File layout (big-endian): a `u32` review count followed by one fixed 13-byte
//! record per review in id order:
//! `product_index u32, helpfulness_numerator u16, helpfulness_denominator u16,
//! score u8, length u32`.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use byteorder::{BigEndian, WriteBytesExt};
use revidx_common::{Result, error::Error};

/// Serialized size of a [`ReviewEntry`].
pub const REVIEW_ENTRY_SIZE: usize = 4 + 2 + 2 + 1 + 4;

/// Per-review metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewEntry {
    /// Index of the review's product in the product dictionary.
    pub product_index: u32,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub score: u8,
    /// Number of tokens in the review text.
    pub length: u32,
}

impl ReviewEntry {
    pub(crate) fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_u32::<BigEndian>(self.product_index)?;
        writer.write_u16::<BigEndian>(self.helpfulness_numerator)?;
        writer.write_u16::<BigEndian>(self.helpfulness_denominator)?;
        writer.write_u8(self.score)?;
        writer.write_u32::<BigEndian>(self.length)
    }
}

/// Collects review entries from concurrent writers.
///
/// Every review id owns a write-once slot, so workers filling disjoint id ranges
/// never contend.
pub struct ReviewStoreBuilder {
    slots: Box<[OnceLock<ReviewEntry>]>,
    total_tokens: AtomicU64,
}

impl ReviewStoreBuilder {
    /// Creates a builder for reviews `1..=count`.
    pub fn new(count: u32) -> ReviewStoreBuilder {
        ReviewStoreBuilder {
            slots: (0..count).map(|_| OnceLock::new()).collect(),
            total_tokens: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records the metadata of `review_id` (1-based).
    pub fn add_review(&self, review_id: u32, entry: ReviewEntry) -> Result<()> {
        let slot = (review_id as usize)
            .checked_sub(1)
            .and_then(|index| self.slots.get(index))
            .ok_or_else(|| {
                Error::invalid_arg(
                    "review_id",
                    format!("{review_id} is outside 1..={}", self.slots.len()),
                )
            })?;
        slot.set(entry).map_err(|_| {
            Error::invalid_operation(format!("review {review_id} is already recorded"))
        })?;
        self.total_tokens
            .fetch_add(entry.length as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    /// Writes the store to `path`. Fails if any review slot was left empty.
    pub fn write(self, path: &Path) -> Result<u64> {
        let file = File::create(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let mut writer = BufWriter::new(file);
        writer.write_u32::<BigEndian>(self.slots.len() as u32)?;
        for (index, slot) in self.slots.iter().enumerate() {
            let entry = slot.get().ok_or_else(|| {
                Error::invalid_operation(format!("review {} was never recorded", index + 1))
            })?;
            entry.write_to(&mut writer)?;
        }
        writer
            .flush()
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(self.total_tokens())
    }
}
