//! Posting list construction.
//!
//! Consumes a sorted run of `(id, review_id)` pairs and writes one gap-encoded
//! posting list per vocabulary id into a single postings file, registering each
//! list in the front-coded dictionary as it goes.
//!
//! Row layout (see [`crate::varint`]):
//! - terms: `varint(review_id - previous_review_id)`, `varint(frequency_in_review)`
//! - products: `varint(review_id - previous_review_id)`
//!
//! The first gap of every list is relative to 0.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use revidx_common::{Result, error::Error};

use crate::{
    layout::DictionaryKind,
    varint,
    write::{
        dictionary::DictionaryWriter,
        sorter::SortedRun,
        vocabulary::Vocabulary,
    },
};

/// Counters reported after a postings file has been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingsStats {
    /// Number of dictionary entries written; equals the vocabulary size.
    pub entries: usize,
    /// Total number of posting rows.
    pub rows: u64,
    /// Size of the postings file in bytes.
    pub bytes: u64,
}

/// Writes the posting lists and the dictionary of one vocabulary into `dir`.
pub fn write_postings(
    run: &SortedRun,
    vocabulary: &Vocabulary,
    kind: DictionaryKind,
    dir: &Path,
    io_block_size: usize,
) -> Result<PostingsStats> {
    let mut dictionary = DictionaryWriter::create(
        &kind.table_path(dir),
        &kind.string_path(dir),
        kind.block_size(),
    )?;
    let mut writer = PostingsWriter::create(&kind.postings_path(dir), kind, io_block_size)?;

    let mut stats = PostingsStats::default();
    let mut next_id = 0u32;
    let mut pairs = run.reader(io_block_size)?.peekable();
    while let Some(first) = pairs.next().transpose()? {
        let id = first.id;
        if id < next_id || id as usize >= vocabulary.len() {
            return Err(Error::invalid_format(
                "sorted pairs",
                format!("unexpected id {id}, expected at least {next_id}"),
            ));
        }
        // Vocabulary items without occurrences keep their rank in the dictionary.
        while next_id < id {
            register(&mut dictionary, vocabulary, next_id, 0, writer.offset())?;
            next_id += 1;
        }

        let ptr = writer.offset();
        let mut list = writer.start_list();
        let mut current = first;
        let mut frequency = 1u32;
        loop {
            let next = match pairs.next_if(|p| matches!(p, Ok(p) if p.id == id)) {
                Some(next) => Some(next?),
                None => None,
            };
            match next {
                Some(pair) if pair.review_id == current.review_id => frequency += 1,
                Some(pair) => {
                    list.push(current.review_id, frequency)?;
                    current = pair;
                    frequency = 1;
                }
                None => {
                    list.push(current.review_id, frequency)?;
                    break;
                }
            }
        }
        let rows = list.rows;
        stats.rows += rows as u64;
        register(&mut dictionary, vocabulary, id, rows, ptr)?;
        next_id = id + 1;
    }
    while (next_id as usize) < vocabulary.len() {
        register(&mut dictionary, vocabulary, next_id, 0, writer.offset())?;
        next_id += 1;
    }

    stats.bytes = writer.finish()?;
    stats.entries = dictionary.finish()?;
    Ok(stats)
}

fn register(
    dictionary: &mut DictionaryWriter,
    vocabulary: &Vocabulary,
    id: u32,
    frequency: u32,
    ptr: u64,
) -> Result<()> {
    let item = vocabulary
        .get(id)
        .ok_or_else(|| Error::invalid_arg("id", format!("{id} is not in the vocabulary")))?;
    dictionary.push(item, frequency, ptr)
}

/// Sequential writer of posting rows.
struct PostingsWriter {
    kind: DictionaryKind,
    writer: BufWriter<File>,
    offset: u64,
    row: Vec<u8>,
}

impl PostingsWriter {
    fn create(path: &Path, kind: DictionaryKind, io_block_size: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(PostingsWriter {
            kind,
            writer: BufWriter::with_capacity(io_block_size, file),
            offset: 0,
            row: Vec::with_capacity(varint::MAX_ENCODED_LEN * 2),
        })
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn start_list(&mut self) -> ListWriter<'_> {
        ListWriter {
            writer: self,
            previous: 0,
            rows: 0,
        }
    }

    fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.offset)
    }
}

/// Appends the rows of a single posting list.
struct ListWriter<'a> {
    writer: &'a mut PostingsWriter,
    previous: u32,
    rows: u32,
}

impl ListWriter<'_> {
    fn push(&mut self, review_id: u32, frequency: u32) -> Result<()> {
        let gap = review_id
            .checked_sub(self.previous)
            .filter(|&gap| gap > 0)
            .ok_or_else(|| {
                Error::invalid_format(
                    "sorted pairs",
                    format!("review {review_id} follows review {}", self.previous),
                )
            })?;
        let w = &mut *self.writer;
        w.row.clear();
        varint::encode_into(gap, &mut w.row)?;
        if w.kind.has_frequencies() {
            varint::encode_into(frequency, &mut w.row)?;
        }
        w.writer.write_all(&w.row)?;
        w.offset += w.row.len() as u64;
        self.previous = review_id;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::write::sorter::ExternalSorter;

    fn sorted_run(dir: &Path, pairs: &[(u32, u32)]) -> SortedRun {
        let sorter = ExternalSorter::new(dir, "pairs", 4, 2, 64).unwrap();
        let mut buffer = sorter.run_buffer();
        for &(id, review_id) in pairs {
            buffer.push(id, review_id).unwrap();
        }
        buffer.finish().unwrap();
        sorter.finish().unwrap()
    }

    fn vocabulary(items: &[&str]) -> Vocabulary {
        Vocabulary::from_sets([items.iter().map(|s| s.as_bytes().to_vec()).collect()]).unwrap()
    }

    #[test]
    fn test_term_postings_layout() {
        let dir = tempfile::tempdir().unwrap();
        // "bad" (0) in review 3; "good" (1) in reviews 1 (twice) and 2; "ugly" (2) nowhere.
        let run = sorted_run(dir.path(), &[(1, 1), (1, 2), (0, 3), (1, 1)]);
        let vocabulary = vocabulary(&["good", "bad", "ugly"]);

        let stats = write_postings(
            &run,
            &vocabulary,
            DictionaryKind::Term,
            dir.path(),
            4096,
        )
        .unwrap();
        assert_eq!(stats, PostingsStats {
            entries: 3,
            rows: 3,
            bytes: 6
        });

        let postings = fs::read(DictionaryKind::Term.postings_path(dir.path())).unwrap();
        // bad: [gap 3, freq 1]; good: [gap 1, freq 2], [gap 1, freq 1]
        assert_eq!(postings, vec![3, 1, 1, 2, 1, 1]);
    }

    #[test]
    fn test_product_postings_layout() {
        let dir = tempfile::tempdir().unwrap();
        let run = sorted_run(dir.path(), &[(0, 1), (0, 2), (1, 3), (0, 100)]);
        let vocabulary = vocabulary(&["a1", "b2"]);

        let stats = write_postings(
            &run,
            &vocabulary,
            DictionaryKind::Product,
            dir.path(),
            4096,
        )
        .unwrap();
        assert_eq!(stats.rows, 4);

        let postings = fs::read(DictionaryKind::Product.postings_path(dir.path())).unwrap();
        // a1: gaps 1, 1, 98 (two bytes); b2: gap 3
        assert_eq!(postings, vec![1, 1, 0x40, 98, 3]);
    }

    #[test]
    fn test_id_outside_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let run = sorted_run(dir.path(), &[(5, 1)]);
        let result = write_postings(
            &run,
            &vocabulary(&["only"]),
            DictionaryKind::Product,
            dir.path(),
            4096,
        );
        assert!(result.is_err());
    }
}
