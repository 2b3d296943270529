//! Front-coded dictionary writer.
//!
//! Entries arrive in strictly increasing byte order and are grouped into blocks of
//! `block_size` entries. The first entry of a block (the block head) is stored in
//! full and records the offset of its string in the blob. Every following entry
//! stores only the suffix beyond the prefix it shares with its predecessor.
//!
//! Table rows, all integers big-endian:
//!
//! | position in block | row                                              |
//! |-------------------|--------------------------------------------------|
//! | 0                 | frequency u32, posting u64, len-1 u8, offset u32 |
//! | 1 ..= K-2         | frequency u32, posting u64, len-1 u8, prefix u8  |
//! | K-1               | frequency u32, posting u64, prefix u8            |
//!
//! The suffix of the last entry of a block ends where the next block's head string
//! starts, or at the end of the blob.

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, WriteBytesExt};
use revidx_common::{Result, error::Error, verify_arg};

use crate::layout::MAX_TERM_LENGTH;

pub struct DictionaryWriter {
    block_size: usize,
    table: BufWriter<File>,
    table_path: PathBuf,
    strings: BufWriter<File>,
    strings_len: u64,
    count: u32,
    previous: Vec<u8>,
}

impl DictionaryWriter {
    pub fn create(table_path: &Path, string_path: &Path, block_size: usize) -> Result<Self> {
        verify_arg!(block_size, block_size >= 2);
        let create = |path: &Path| {
            File::create(path)
                .map(BufWriter::new)
                .map_err(|e| Error::io(path.display().to_string(), e))
        };
        let mut table = create(table_path)?;
        // Entry count placeholder, patched by `finish`.
        table.write_u32::<BigEndian>(0)?;
        Ok(DictionaryWriter {
            block_size,
            table,
            table_path: table_path.to_path_buf(),
            strings: create(string_path)?,
            strings_len: 0,
            count: 0,
            previous: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends the next entry.
    ///
    /// # Arguments
    /// * `term` - entry string, 1 to 256 bytes, greater than the previous entry
    /// * `frequency` - number of reviews that contain the entry
    /// * `posting_ptr` - byte offset of the entry's posting list
    pub fn push(&mut self, term: &[u8], frequency: u32, posting_ptr: u64) -> Result<()> {
        verify_arg!(term, !term.is_empty() && term.len() <= MAX_TERM_LENGTH);
        if self.count > 0 && self.previous.as_slice() >= term {
            return Err(Error::invalid_arg(
                "term",
                format!(
                    "'{}' is not greater than the previous entry '{}'",
                    String::from_utf8_lossy(term),
                    String::from_utf8_lossy(&self.previous)
                ),
            ));
        }

        let pos = self.count as usize % self.block_size;
        let length_byte = (term.len() - 1) as u8;

        self.table.write_u32::<BigEndian>(frequency)?;
        self.table.write_u64::<BigEndian>(posting_ptr)?;
        if pos == 0 {
            let offset = u32::try_from(self.strings_len).map_err(|_| {
                Error::invalid_operation("dictionary string blob exceeds 4 GiB")
            })?;
            self.table.write_u8(length_byte)?;
            self.table.write_u32::<BigEndian>(offset)?;
            self.write_string(term)?;
        } else {
            // A strict successor never shares more than 255 bytes with its predecessor.
            let prefix = common_prefix_len(&self.previous, term);
            if pos != self.block_size - 1 {
                self.table.write_u8(length_byte)?;
            }
            self.table.write_u8(prefix as u8)?;
            self.write_string(&term[prefix..])?;
        }

        self.previous.clear();
        self.previous.extend_from_slice(term);
        self.count += 1;
        Ok(())
    }

    fn write_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.strings.write_all(bytes)?;
        self.strings_len += bytes.len() as u64;
        Ok(())
    }

    /// Flushes both files and records the final entry count.
    pub fn finish(mut self) -> Result<usize> {
        self.strings.flush()?;
        let mut table = self.table.into_inner().map_err(|e| e.into_error())?;
        table
            .seek(SeekFrom::Start(0))
            .and_then(|_| table.write_u32::<BigEndian>(self.count))
            .and_then(|_| table.flush())
            .map_err(|e| Error::io(self.table_path.display().to_string(), e))?;
        Ok(self.count as usize)
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b)
        .take_while(|(x, y)| x == y)
        .count()
        .min(u8::MAX as usize)
}
