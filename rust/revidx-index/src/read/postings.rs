//! Random-access posting list decoding.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Mutex,
};

use revidx_common::{Result, error::Error, verify_data};

use crate::{layout::DictionaryKind, read::dictionary::DictionaryEntry, varint::VarIntReader};

/// A review that contains a term, with the number of occurrences in that review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TermPosting {
    pub review_id: u32,
    pub frequency: u32,
}

/// Reader over one postings file.
pub struct PostingsReader {
    kind: DictionaryKind,
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl PostingsReader {
    pub fn open(dir: &Path, kind: DictionaryKind) -> Result<PostingsReader> {
        let path = kind.postings_path(dir);
        let file = File::open(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let len = file.metadata()?.len();
        Ok(PostingsReader {
            kind,
            path,
            file: Mutex::new(file),
            len,
        })
    }

    /// Size of the postings file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the encoded bytes of the list described by `entry`.
    ///
    /// A list never occupies more than `frequency * max_row_size` bytes; the read is
    /// clamped to the end of the file.
    fn read_list(&self, entry: DictionaryEntry) -> Result<Vec<u8>> {
        if entry.frequency == 0 {
            return Ok(Vec::new());
        }
        verify_data!(posting_ptr, entry.posting_ptr < self.len);
        let max_len = entry.frequency as u64 * self.kind.max_row_size() as u64;
        let len = max_len.min(self.len - entry.posting_ptr) as usize;

        let mut buf = vec![0u8; len];
        let mut file = self
            .file
            .lock()
            .map_err(|_| Error::invalid_operation("postings file lock poisoned"))?;
        file.seek(SeekFrom::Start(entry.posting_ptr))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| Error::io(self.path.display().to_string(), e))?;
        Ok(buf)
    }

    /// Decodes `entry.frequency` rows, passing each `(review_id, frequency)` to `f`.
    fn decode(&self, entry: DictionaryEntry, mut f: impl FnMut(u32, u32)) -> Result<()> {
        let buf = self.read_list(entry)?;
        let mut reader = VarIntReader::new(&buf);
        let mut review_id = 0u32;
        for _ in 0..entry.frequency {
            let gap = reader.read()?;
            verify_data!(gap, gap > 0);
            review_id = review_id
                .checked_add(gap)
                .ok_or_else(|| Error::invalid_format("postings", "review id overflow"))?;
            let frequency = if self.kind.has_frequencies() {
                reader.read()?
            } else {
                1
            };
            f(review_id, frequency);
        }
        Ok(())
    }

    /// Decodes a term posting list.
    pub fn term_postings(&self, entry: DictionaryEntry) -> Result<Vec<TermPosting>> {
        let mut postings = Vec::with_capacity(entry.frequency as usize);
        self.decode(entry, |review_id, frequency| {
            postings.push(TermPosting {
                review_id,
                frequency,
            })
        })?;
        Ok(postings)
    }

    /// Decodes the review ids of a posting list.
    pub fn review_ids(&self, entry: DictionaryEntry) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(entry.frequency as usize);
        self.decode(entry, |review_id, _| ids.push(review_id))?;
        Ok(ids)
    }

    /// Sum of the per-review frequencies of a term posting list.
    pub fn collection_frequency(&self, entry: DictionaryEntry) -> Result<u64> {
        let mut total = 0u64;
        self.decode(entry, |_, frequency| total += frequency as u64)?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn reader_over(kind: DictionaryKind, bytes: &[u8]) -> (tempfile::TempDir, PostingsReader) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(kind.postings_path(dir.path()), bytes).unwrap();
        let reader = PostingsReader::open(dir.path(), kind).unwrap();
        (dir, reader)
    }

    fn entry(frequency: u32, posting_ptr: u64) -> DictionaryEntry {
        DictionaryEntry {
            frequency,
            posting_ptr,
        }
    }

    #[test]
    fn test_decode_term_lists() {
        let (_dir, reader) = reader_over(DictionaryKind::Term, &[3, 1, 1, 2, 1, 1]);
        assert_eq!(reader.term_postings(entry(1, 0)).unwrap(), vec![TermPosting {
            review_id: 3,
            frequency: 1
        }]);
        // The last list is shorter than its `frequency * 8` read window.
        assert_eq!(reader.term_postings(entry(2, 2)).unwrap(), vec![
            TermPosting {
                review_id: 1,
                frequency: 2
            },
            TermPosting {
                review_id: 2,
                frequency: 1
            }
        ]);
        assert_eq!(reader.collection_frequency(entry(2, 2)).unwrap(), 3);
        assert!(reader.term_postings(entry(0, 6)).unwrap().is_empty());
    }

    #[test]
    fn test_decode_product_lists() {
        let (_dir, reader) = reader_over(DictionaryKind::Product, &[1, 1, 0x40, 98, 3]);
        assert_eq!(reader.review_ids(entry(3, 0)).unwrap(), vec![1, 2, 100]);
        assert_eq!(reader.review_ids(entry(1, 4)).unwrap(), vec![3]);
    }

    #[test]
    fn test_truncated_list() {
        let (_dir, reader) = reader_over(DictionaryKind::Product, &[1, 1]);
        assert!(reader.review_ids(entry(3, 0)).is_err());
        assert!(reader.review_ids(entry(1, 7)).is_err());
    }
}
