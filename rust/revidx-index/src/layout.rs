//! On-disk artifact names and per-dictionary constants.

use std::path::{Path, PathBuf};

/// Review metadata store.
pub const REVIEWS_FILE_NAME: &str = "reviewsObj";

/// Default I/O block size used by run files and posting lists.
pub const DEFAULT_IO_BLOCK_SIZE: usize = 4096;

/// Maximum length of a stored term in bytes. Longer tokens are truncated.
pub const MAX_TERM_LENGTH: usize = 256;

/// Size of the entry count stored at the start of the dictionary table and the
/// review store.
pub const COUNT_HEADER_SIZE: usize = 4;

/// Dictionary row of a block head: frequency, posting pointer, length, string offset.
pub const HEAD_ROW_SIZE: usize = 4 + 8 + 1 + 4;

/// Dictionary row inside a block: frequency, posting pointer, length, prefix.
pub const INTERIOR_ROW_SIZE: usize = 4 + 8 + 1 + 1;

/// Dictionary row of the last entry of a block: frequency, posting pointer, prefix.
pub const LAST_ROW_SIZE: usize = 4 + 8 + 1;

/// Table size of a complete dictionary block of `block_size` entries.
pub fn dictionary_block_bytes(block_size: usize) -> usize {
    HEAD_ROW_SIZE + INTERIOR_ROW_SIZE * (block_size - 2) + LAST_ROW_SIZE
}

/// Offset of row `index` in a dictionary table, count header included.
pub fn dictionary_row_offset(index: usize, block_size: usize) -> usize {
    let block = index / block_size;
    let pos = index % block_size;
    let within = if pos == 0 {
        0
    } else {
        HEAD_ROW_SIZE + INTERIOR_ROW_SIZE * (pos - 1)
    };
    COUNT_HEADER_SIZE + block * dictionary_block_bytes(block_size) + within
}

/// Expected dictionary table size for `count` entries.
pub fn dictionary_table_size(count: usize, block_size: usize) -> usize {
    if count == 0 {
        return COUNT_HEADER_SIZE;
    }
    let last = count - 1;
    let last_row = if last % block_size == block_size - 1 {
        LAST_ROW_SIZE
    } else if last % block_size == 0 {
        HEAD_ROW_SIZE
    } else {
        INTERIOR_ROW_SIZE
    };
    dictionary_row_offset(last, block_size) + last_row
}

/// The two vocabularies indexed by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryKind {
    /// Tokens extracted from review text. Posting rows carry a per-review frequency.
    Term,
    /// Product identifiers. Posting rows are review ids only.
    Product,
}

impl DictionaryKind {
    pub fn name(self) -> &'static str {
        match self {
            DictionaryKind::Term => "term",
            DictionaryKind::Product => "product",
        }
    }

    /// Number of entries per front-coded block.
    pub fn block_size(self) -> usize {
        match self {
            DictionaryKind::Term => 100,
            DictionaryKind::Product => 10,
        }
    }

    /// Maximum number of sorted runs merged by a single merge task.
    pub fn merge_fan_in(self) -> usize {
        match self {
            DictionaryKind::Term => 1000,
            DictionaryKind::Product => 50,
        }
    }

    /// Number of I/O blocks budgeted for the in-memory sort buffers.
    pub fn memory_blocks(self) -> usize {
        match self {
            DictionaryKind::Term => 20400,
            DictionaryKind::Product => 100,
        }
    }

    pub fn has_frequencies(self) -> bool {
        matches!(self, DictionaryKind::Term)
    }

    /// Upper bound on the encoded size of a single posting row.
    pub fn max_row_size(self) -> usize {
        match self {
            DictionaryKind::Term => 8,
            DictionaryKind::Product => 4,
        }
    }

    pub fn table_file_name(self) -> &'static str {
        match self {
            DictionaryKind::Term => "dictionaryTable",
            DictionaryKind::Product => "dictionaryProductTable",
        }
    }

    pub fn string_file_name(self) -> &'static str {
        match self {
            DictionaryKind::Term => "dictionaryString",
            DictionaryKind::Product => "dictionaryProductString",
        }
    }

    pub fn postings_file_name(self) -> &'static str {
        match self {
            DictionaryKind::Term => "invertedIndexObj",
            DictionaryKind::Product => "invertedIndexProductObj",
        }
    }

    pub fn run_prefix(self) -> &'static str {
        match self {
            DictionaryKind::Term => "sortedPairs",
            DictionaryKind::Product => "productIdSortedPairs",
        }
    }

    pub fn table_path(self, dir: &Path) -> PathBuf {
        dir.join(self.table_file_name())
    }

    pub fn string_path(self, dir: &Path) -> PathBuf {
        dir.join(self.string_file_name())
    }

    pub fn postings_path(self, dir: &Path) -> PathBuf {
        dir.join(self.postings_file_name())
    }
}

pub fn reviews_path(dir: &Path) -> PathBuf {
    dir.join(REVIEWS_FILE_NAME)
}
