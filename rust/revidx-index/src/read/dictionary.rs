//! Front-coded dictionary reader.
//!
//! The table and the string blob are loaded into memory and fully validated when
//! the dictionary is opened, so that lookups and iteration never fail afterwards.

use std::{fs, path::Path};

use byteorder::{BigEndian, ByteOrder};
use revidx_common::{Result, error::Error, verify_arg, verify_data};

use crate::layout::{
    COUNT_HEADER_SIZE, DictionaryKind, dictionary_row_offset, dictionary_table_size,
};

/// Posting list location and document frequency of a dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    /// Number of reviews containing the entry; also the posting list row count.
    pub frequency: u32,
    /// Byte offset of the posting list within the postings file.
    pub posting_ptr: u64,
}

/// Sorted, block front-coded string dictionary.
pub struct FrontCodedDictionary {
    block_size: usize,
    count: usize,
    table: Vec<u8>,
    strings: Vec<u8>,
}

impl FrontCodedDictionary {
    /// Loads the dictionary of the given kind from an index directory.
    pub fn open(dir: &Path, kind: DictionaryKind) -> Result<FrontCodedDictionary> {
        let read =
            |path: &Path| fs::read(path).map_err(|e| Error::io(path.display().to_string(), e));
        let table = read(&kind.table_path(dir))?;
        let strings = read(&kind.string_path(dir))?;
        FrontCodedDictionary::from_parts(table, strings, kind.block_size())
    }

    /// Creates a dictionary over an encoded table and string blob.
    ///
    /// # Errors
    /// Returns `InvalidFormat` when the table size does not match its entry count,
    /// when a row references bytes outside the blob, or when the decoded entries are
    /// not strictly increasing.
    pub fn from_parts(
        table: Vec<u8>,
        strings: Vec<u8>,
        block_size: usize,
    ) -> Result<FrontCodedDictionary> {
        verify_arg!(block_size, block_size >= 2);
        verify_data!(table, table.len() >= COUNT_HEADER_SIZE);
        let count = BigEndian::read_u32(&table) as usize;
        verify_data!(table, table.len() == dictionary_table_size(count, block_size));

        let dict = FrontCodedDictionary {
            block_size,
            count,
            table,
            strings,
        };
        dict.validate()?;
        Ok(dict)
    }

    fn validate(&self) -> Result<()> {
        let mut previous_head = None;
        for block in 0..self.block_count() {
            let offset = self.block_offset(block);
            verify_data!(block_offset, previous_head.is_none_or(|prev| prev < offset));
            previous_head = Some(offset);
        }

        let mut cursor = self.cursor();
        let mut previous = Vec::new();
        while cursor.try_advance()? {
            if cursor.index() > 0 && previous.as_slice() >= cursor.term() {
                return Err(Error::invalid_format(
                    "dictionary",
                    format!("entry {} is out of order", cursor.index()),
                ));
            }
            previous.clear();
            previous.extend_from_slice(cursor.term());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.count.div_ceil(self.block_size)
    }

    fn row(&self, index: usize) -> &[u8] {
        &self.table[dictionary_row_offset(index, self.block_size)..]
    }

    fn is_last_in_block(&self, index: usize) -> bool {
        index % self.block_size == self.block_size - 1
    }

    /// Blob offset of the head string of `block`.
    fn block_offset(&self, block: usize) -> usize {
        BigEndian::read_u32(&self.row(block * self.block_size)[13..17]) as usize
    }

    /// Full length of the entry, for rows that store it.
    fn stored_len(&self, index: usize) -> usize {
        self.row(index)[12] as usize + 1
    }

    /// Shared prefix length of a non-head entry.
    fn prefix_len(&self, index: usize) -> usize {
        if self.is_last_in_block(index) {
            self.row(index)[12] as usize
        } else {
            self.row(index)[13] as usize
        }
    }

    fn head_term(&self, block: usize) -> &[u8] {
        let start = self.block_offset(block);
        let len = self.stored_len(block * self.block_size);
        &self.strings[start..start + len]
    }

    /// Returns the frequency and posting pointer of the entry at `index`.
    pub fn entry(&self, index: usize) -> Option<DictionaryEntry> {
        if index >= self.count {
            return None;
        }
        let row = self.row(index);
        Some(DictionaryEntry {
            frequency: BigEndian::read_u32(&row[0..4]),
            posting_ptr: BigEndian::read_u64(&row[4..12]),
        })
    }

    pub fn frequency(&self, index: usize) -> Option<u32> {
        self.entry(index).map(|e| e.frequency)
    }

    pub fn posting_ptr(&self, index: usize) -> Option<u64> {
        self.entry(index).map(|e| e.posting_ptr)
    }

    /// Exact-match lookup.
    ///
    /// Binary search over the block heads locates the last block whose head is not
    /// greater than `term`, then the block is decoded entry by entry.
    ///
    /// # Returns
    /// The index of `term`, or `None` when the dictionary does not contain it.
    pub fn find(&self, term: &[u8]) -> Option<usize> {
        if self.count == 0 {
            return None;
        }

        let mut lo = 0;
        let mut hi = self.block_count();
        // Invariant: head(b) <= term for b < lo, head(b) > term for b >= hi.
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.head_term(mid).cmp(term) {
                std::cmp::Ordering::Equal => return Some(mid * self.block_size),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        if lo == 0 {
            // `term` sorts before the first entry.
            return None;
        }
        let block = lo - 1;

        let mut cursor = self.cursor_at_block(block);
        let block_end = ((block + 1) * self.block_size).min(self.count);
        while cursor.next_index() < block_end && cursor.advance() {
            match cursor.term().cmp(term) {
                std::cmp::Ordering::Equal => return Some(cursor.index()),
                std::cmp::Ordering::Greater => return None,
                std::cmp::Ordering::Less => {}
            }
        }
        None
    }

    /// Reconstructs the entry string at `index`.
    pub fn term_at(&self, index: usize) -> Option<Vec<u8>> {
        if index >= self.count {
            return None;
        }
        let mut cursor = self.cursor_at_block(index / self.block_size);
        while cursor.advance() {
            if cursor.index() == index {
                return Some(cursor.term().to_vec());
            }
        }
        None
    }

    /// Returns a cursor positioned before the first entry.
    pub fn cursor(&self) -> TermCursor<'_> {
        self.cursor_at_block(0)
    }

    fn cursor_at_block(&self, block: usize) -> TermCursor<'_> {
        TermCursor {
            dict: self,
            next: block * self.block_size,
            string_pos: 0,
            term: Vec::with_capacity(64),
        }
    }

    /// Iterates over all entry strings in order.
    pub fn terms(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        let mut cursor = self.cursor();
        std::iter::from_fn(move || cursor.advance().then(|| cursor.term().to_vec()))
    }
}

/// Forward cursor that incrementally reconstructs dictionary entries.
pub struct TermCursor<'a> {
    dict: &'a FrontCodedDictionary,
    /// Index of the entry decoded by the next `advance`.
    next: usize,
    /// Blob offset of the next suffix.
    string_pos: usize,
    term: Vec<u8>,
}

impl TermCursor<'_> {
    /// Moves to the next entry. Returns `false` past the last entry.
    pub fn advance(&mut self) -> bool {
        // Entries are validated when the dictionary is opened.
        self.try_advance().unwrap_or(false)
    }

    /// Index of the current entry. Only meaningful after a successful `advance`.
    pub fn index(&self) -> usize {
        self.next - 1
    }

    fn next_index(&self) -> usize {
        self.next
    }

    /// The current entry string.
    pub fn term(&self) -> &[u8] {
        &self.term
    }

    fn try_advance(&mut self) -> Result<bool> {
        let dict = self.dict;
        let index = self.next;
        if index >= dict.count {
            return Ok(false);
        }

        let block = index / dict.block_size;
        let (prefix, start, end) = if index % dict.block_size == 0 {
            let start = dict.block_offset(block);
            (0, start, start + dict.stored_len(index))
        } else {
            let prefix = dict.prefix_len(index);
            verify_data!(prefix, prefix <= self.term.len());
            let end = if dict.is_last_in_block(index) {
                if block + 1 < dict.block_count() {
                    dict.block_offset(block + 1)
                } else {
                    dict.strings.len()
                }
            } else {
                let len = dict.stored_len(index);
                verify_data!(len, len > prefix);
                self.string_pos + (len - prefix)
            };
            (prefix, self.string_pos, end)
        };

        let suffix = dict.strings.get(start..end).ok_or_else(|| {
            Error::invalid_format(
                "dictionary strings",
                format!("entry {index} references {start}..{end}"),
            )
        })?;
        self.term.truncate(prefix);
        self.term.extend_from_slice(suffix);
        self.string_pos = end;
        self.next += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::dictionary::DictionaryWriter;

    fn build(terms: &[Vec<u8>], block_size: usize) -> FrontCodedDictionary {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("table");
        let strings = dir.path().join("strings");
        let mut writer = DictionaryWriter::create(&table, &strings, block_size).unwrap();
        for (i, term) in terms.iter().enumerate() {
            writer.push(term, i as u32 * 2, i as u64 * 100).unwrap();
        }
        writer.finish().unwrap();
        FrontCodedDictionary::from_parts(
            std::fs::read(table).unwrap(),
            std::fs::read(strings).unwrap(),
            block_size,
        )
        .unwrap()
    }

    fn words(list: &[&str]) -> Vec<Vec<u8>> {
        list.iter().map(|w| w.as_bytes().to_vec()).collect()
    }

    fn random_vocabulary(count: usize) -> Vec<Vec<u8>> {
        let mut set = std::collections::BTreeSet::new();
        while set.len() < count {
            let len = fastrand::usize(1..12);
            set.insert(
                (0..len)
                    .map(|_| fastrand::alphanumeric().to_ascii_lowercase() as u8)
                    .collect::<Vec<u8>>(),
            );
        }
        set.into_iter().collect()
    }

    #[test]
    fn test_find_and_reconstruct() {
        fastrand::seed(11);
        for block_size in [2, 3, 10, 100] {
            let terms = random_vocabulary(1234);
            let dict = build(&terms, block_size);
            assert_eq!(dict.len(), terms.len());
            for (i, term) in terms.iter().enumerate() {
                assert_eq!(dict.find(term), Some(i), "block size {block_size}");
                assert_eq!(dict.term_at(i).as_ref(), Some(term));
                assert_eq!(
                    dict.entry(i),
                    Some(DictionaryEntry {
                        frequency: i as u32 * 2,
                        posting_ptr: i as u64 * 100
                    })
                );
            }
            assert_eq!(dict.terms().collect::<Vec<_>>(), terms);
        }
    }

    #[test]
    fn test_misses() {
        let dict = build(&words(&["bb", "bd", "bf", "ca", "cc", "cz", "d"]), 3);
        for miss in ["a", "b", "bc", "be", "bg", "c", "cb", "cd", "czz", "da", "zzz"] {
            assert_eq!(dict.find(miss.as_bytes()), None, "{miss}");
        }
        assert_eq!(dict.term_at(7), None);
        assert_eq!(dict.entry(7), None);
    }

    #[test]
    fn test_block_heads_and_single_block() {
        let terms = words(&["alpha", "beta", "gamma", "omega"]);
        let dict = build(&terms, 2);
        assert_eq!(dict.find(b"alpha"), Some(0));
        assert_eq!(dict.find(b"gamma"), Some(2));
        assert_eq!(dict.find(b"omega"), Some(3));

        let single = build(&terms, 100);
        for (i, term) in terms.iter().enumerate() {
            assert_eq!(single.find(term), Some(i));
        }
        assert_eq!(single.find(b"zeta"), None);
    }

    #[test]
    fn test_long_shared_prefixes() {
        let base = vec![b'a'; 255];
        let mut terms = Vec::new();
        terms.push(base.clone());
        for last in [b'a', b'b', b'c'] {
            let mut term = base.clone();
            term.push(last);
            terms.push(term);
        }
        terms.push(vec![b'b']);
        let dict = build(&terms, 3);
        for (i, term) in terms.iter().enumerate() {
            assert_eq!(dict.find(term), Some(i));
            assert_eq!(dict.term_at(i).as_ref(), Some(term));
        }
    }

    #[test]
    fn test_empty_dictionary() {
        let dict = build(&[], 10);
        assert!(dict.is_empty());
        assert_eq!(dict.find(b"x"), None);
        assert_eq!(dict.terms().count(), 0);
    }

    #[test]
    fn test_corrupt_input() {
        // Count says two entries, but the table holds one row.
        let mut table = vec![0, 0, 0, 2];
        table.extend_from_slice(&[0; 17]);
        assert!(FrontCodedDictionary::from_parts(table, b"a".to_vec(), 10).is_err());

        // Head row points past the blob.
        let mut table = vec![0, 0, 0, 1];
        table.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0]);
        assert!(FrontCodedDictionary::from_parts(table, b"ab".to_vec(), 10).is_err());
    }
}
