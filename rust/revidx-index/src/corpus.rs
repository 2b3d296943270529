//! Parsing of the raw review corpus.
//!
//! The corpus is a line-oriented text file made of consecutive review blocks:
//!
//! ```text
//! product/productId: B001E4KFG0
//! review/userId: A3SGXH7AUHU8GW
//! review/helpfulness: 1/1
//! review/score: 5.0
//! review/summary: Good Quality Dog Food
//! review/text: I have bought several of the Vitality canned dog food products...
//! ```
//!
//! A block starts at a `product/productId:` line. Header lines other than the ones
//! listed in [`ReviewRecord`] are skipped. The review text starts at the
//! `review/text:` line and extends up to the next `product/productId:` line.
//!
//! For parallel processing the file is split into byte ranges with [`split_shards`];
//! a [`RecordReader`] opened over a shard yields exactly the records whose first byte
//! falls into that range.

use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    ops::Range,
    path::Path,
};

use revidx_common::{Result, error::Error, try_or_ret_some_err};

use crate::{layout::MAX_TERM_LENGTH, tokenizer::normalize_product_id};

const PRODUCT_ID_KEY: &[u8] = b"product/productId:";
const HELPFULNESS_KEY: &[u8] = b"review/helpfulness:";
const SCORE_KEY: &[u8] = b"review/score:";
const TEXT_KEY: &[u8] = b"review/text:";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A single parsed review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    /// Byte offset of the record's `product/productId:` line in the input.
    pub offset: u64,
    /// Trimmed, lower-cased product identifier.
    pub product_id: Vec<u8>,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub score: u8,
    /// Review text; continuation lines are joined with `\n`.
    pub text: Vec<u8>,
}

/// Splits `[0, len)` into `count` contiguous, nearly equal byte ranges.
///
/// Empty ranges are produced when `len < count`.
pub fn split_shards(len: u64, count: usize) -> Vec<Range<u64>> {
    let count = count.max(1) as u64;
    let boundary = |i: u64| ((len as u128 * i as u128).div_ceil(count as u128)) as u64;
    (0..count).map(|i| boundary(i)..boundary(i + 1)).collect()
}

/// Streaming review parser over a buffered reader.
pub struct RecordReader<R> {
    reader: R,
    /// Offset of the next unread line.
    pos: u64,
    /// Records starting at or beyond this offset belong to the next shard.
    end: u64,
    /// A `product/productId:` line read ahead of the record it starts.
    pending: Option<(u64, Vec<u8>)>,
    line: Vec<u8>,
    done: bool,
}

impl RecordReader<BufReader<File>> {
    /// Opens a reader over the records of `path` that start inside `range`.
    pub fn open_shard(path: &Path, range: Range<u64>) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut pos = 0;
        if range.start > 0 {
            // The line containing `range.start - 1` belongs to the previous shard.
            pos = range.start - 1;
            reader.seek(SeekFrom::Start(pos))?;
            let mut partial = Vec::new();
            pos += reader.read_until(b'\n', &mut partial)? as u64;
        }
        Ok(RecordReader::with_bounds(reader, pos, range.end))
    }
}

impl<R: BufRead> RecordReader<R> {
    /// Creates a reader that parses every record of `reader`.
    pub fn new(reader: R) -> Self {
        Self::with_bounds(reader, 0, u64::MAX)
    }

    fn with_bounds(reader: R, pos: u64, end: u64) -> Self {
        RecordReader {
            reader,
            pos,
            end,
            pending: None,
            line: Vec::new(),
            done: false,
        }
    }

    /// Reads the next line into `self.line` without its terminator.
    ///
    /// Returns the offset of the line, or `None` at the end of input.
    fn read_line(&mut self) -> Result<Option<u64>> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(None);
        }
        let offset = self.pos;
        self.pos += n as u64;
        while matches!(self.line.last(), Some(b'\n' | b'\r')) {
            self.line.pop();
        }
        Ok(Some(offset))
    }

    /// Positions the reader at the next record start.
    fn next_record_start(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        while let Some(offset) = self.read_line()? {
            if self.line.starts_with(PRODUCT_ID_KEY) {
                return Ok(Some((offset, std::mem::take(&mut self.line))));
            }
        }
        Ok(None)
    }

    fn read_record(&mut self, offset: u64, header: &[u8]) -> Result<ReviewRecord> {
        let product_id = normalize_product_id(header_value(header, PRODUCT_ID_KEY));
        if product_id.is_empty() {
            return Err(Error::malformed_record(offset, "empty product id"));
        }
        if product_id.len() > MAX_TERM_LENGTH {
            return Err(Error::malformed_record(
                offset,
                format!(
                    "product id of {} bytes exceeds {MAX_TERM_LENGTH}",
                    product_id.len()
                ),
            ));
        }

        let mut helpfulness = None;
        let mut score = None;
        let mut text: Option<Vec<u8>> = None;

        while let Some(line_offset) = self.read_line()? {
            let line = &self.line;
            if line.starts_with(PRODUCT_ID_KEY) {
                self.pending = Some((line_offset, std::mem::take(&mut self.line)));
                break;
            }
            if let Some(text) = text.as_mut() {
                text.push(b'\n');
                text.extend_from_slice(line);
            } else if line.starts_with(TEXT_KEY) {
                text = Some(header_value(line, TEXT_KEY).to_vec());
            } else if line.starts_with(HELPFULNESS_KEY) {
                helpfulness = Some(parse_helpfulness(
                    header_value(line, HELPFULNESS_KEY),
                    line_offset,
                )?);
            } else if line.starts_with(SCORE_KEY) {
                score = Some(parse_score(header_value(line, SCORE_KEY), line_offset)?);
            }
        }

        let (helpfulness_numerator, helpfulness_denominator) = helpfulness
            .ok_or_else(|| Error::malformed_record(offset, "missing review/helpfulness"))?;
        let score = score.ok_or_else(|| Error::malformed_record(offset, "missing review/score"))?;
        let mut text =
            text.ok_or_else(|| Error::malformed_record(offset, "missing review/text"))?;
        while matches!(text.last(), Some(b'\n')) {
            text.pop();
        }

        Ok(ReviewRecord {
            offset,
            product_id,
            helpfulness_numerator,
            helpfulness_denominator,
            score,
            text,
        })
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<ReviewRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some((offset, header)) = try_or_ret_some_err!(self.next_record_start()) else {
            self.done = true;
            return None;
        };
        if offset >= self.end {
            self.done = true;
            return None;
        }
        let record = self.read_record(offset, &header);
        if record.is_err() {
            self.done = true;
        }
        Some(record)
    }
}

fn header_value<'a>(line: &'a [u8], key: &[u8]) -> &'a [u8] {
    line[key.len()..].trim_ascii_start()
}

fn parse_helpfulness(value: &[u8], offset: u64) -> Result<(u16, u16)> {
    let malformed = || {
        Error::malformed_record(
            offset,
            format!(
                "invalid review/helpfulness '{}'",
                String::from_utf8_lossy(value)
            ),
        )
    };
    let text = std::str::from_utf8(value).map_err(|_| malformed())?;
    let (numerator, denominator) = text.trim().split_once('/').ok_or_else(malformed)?;
    let numerator = numerator.trim().parse::<u16>().map_err(|_| malformed())?;
    let denominator = denominator.trim().parse::<u16>().map_err(|_| malformed())?;
    Ok((numerator, denominator))
}

fn parse_score(value: &[u8], offset: u64) -> Result<u8> {
    let malformed = || {
        Error::malformed_record(
            offset,
            format!("invalid review/score '{}'", String::from_utf8_lossy(value)),
        )
    };
    let text = std::str::from_utf8(value).map_err(|_| malformed())?;
    let score = text.trim().parse::<f64>().map_err(|_| malformed())?;
    if !(0.0..256.0).contains(&score) {
        return Err(malformed());
    }
    Ok(score as u8)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use revidx_common::error::ErrorKind;

    use super::*;

    const SAMPLE: &str = "\
product/productId: B001E4KFG0
review/userId: A3SGXH7AUHU8GW
review/profileName: delmartian
review/helpfulness: 1/1
review/score: 5.0
review/time: 1303862400
review/summary: Good Quality Dog Food
review/text: I have bought several of the Vitality canned dog food products.

product/productId: B00813GRG4
review/userId: A1D87F6ZCVE5NK
review/helpfulness: 0/0
review/score: 1.0
review/summary: Not as Advertised
review/text: Product arrived labeled as Jumbo Salted Peanuts.
The peanuts were actually small sized.

";

    fn parse_all(input: &str) -> Result<Vec<ReviewRecord>> {
        RecordReader::new(Cursor::new(input.as_bytes())).collect()
    }

    #[test]
    fn test_parse_records() {
        let records = parse_all(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].offset, 0);
        assert_eq!(records[0].product_id, b"b001e4kfg0");
        assert_eq!(records[0].helpfulness_numerator, 1);
        assert_eq!(records[0].helpfulness_denominator, 1);
        assert_eq!(records[0].score, 5);
        assert_eq!(
            records[0].text,
            b"I have bought several of the Vitality canned dog food products."
        );

        assert_eq!(
            records[1].offset as usize,
            SAMPLE.find("product/productId: B00813GRG4").unwrap()
        );
        assert_eq!(records[1].score, 1);
        assert_eq!(
            records[1].text,
            b"Product arrived labeled as Jumbo Salted Peanuts.\nThe peanuts were actually small sized."
        );
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let input = format!("some preamble\n\n{SAMPLE}");
        let records = parse_all(&input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, "some preamble\n\n".len() as u64);
    }

    #[test]
    fn test_crlf_lines() {
        let input = SAMPLE.replace('\n', "\r\n");
        let records = parse_all(&input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product_id, b"b001e4kfg0");
        assert_eq!(
            records[1].text,
            b"Product arrived labeled as Jumbo Salted Peanuts.\nThe peanuts were actually small sized."
        );
    }

    #[test]
    fn test_malformed_records() {
        let missing_score = "product/productId: A1\nreview/helpfulness: 1/2\nreview/text: hi\n";
        let err = parse_all(missing_score).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedRecord { offset: 0, .. }));

        let bad_helpfulness =
            "product/productId: A1\nreview/helpfulness: 1-2\nreview/score: 3.0\nreview/text: hi\n";
        let err = parse_all(bad_helpfulness).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::MalformedRecord { offset: 22, .. }
        ));

        let overflow =
            "product/productId: A1\nreview/helpfulness: 70000/1\nreview/score: 3.0\nreview/text: hi\n";
        assert!(parse_all(overflow).is_err());

        let bad_score =
            "product/productId: A1\nreview/helpfulness: 1/1\nreview/score: great\nreview/text: hi\n";
        assert!(parse_all(bad_score).is_err());

        let missing_text = "product/productId: A1\nreview/helpfulness: 1/1\nreview/score: 2.0\n";
        assert!(parse_all(missing_text).is_err());
    }

    #[test]
    fn test_product_id_length() {
        let record = |id: &str| {
            format!(
                "product/productId: {id}\nreview/helpfulness: 1/1\nreview/score: 2.0\nreview/text: hi\n"
            )
        };

        let longest = "P".repeat(MAX_TERM_LENGTH);
        let records = parse_all(&record(&longest)).unwrap();
        assert_eq!(records[0].product_id.len(), MAX_TERM_LENGTH);

        let input = format!("{}{}", record("A1"), record(&"P".repeat(MAX_TERM_LENGTH + 1)));
        let second = input.rfind("product/productId:").unwrap() as u64;
        let mut reader = RecordReader::new(Cursor::new(input.as_bytes()));
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::MalformedRecord { offset, .. } if *offset == second
        ));

        let empty = record("  ");
        assert!(parse_all(&empty).is_err());
    }

    #[test]
    fn test_error_stops_iteration() {
        let input = format!("product/productId: A1\nreview/text: x\n{SAMPLE}");
        let mut reader = RecordReader::new(Cursor::new(input.as_bytes()));
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_split_shards() {
        assert_eq!(split_shards(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(split_shards(2, 4), vec![0..1, 1..1, 1..2, 2..2]);
        assert_eq!(split_shards(0, 2), vec![0..0, 0..0]);
        assert_eq!(split_shards(9, 0), vec![0..9]);
    }

    #[test]
    fn test_every_record_lands_in_one_shard() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let corpus = SAMPLE.repeat(7);
        file.write_all(corpus.as_bytes()).unwrap();
        file.flush().unwrap();

        let expected = parse_all(&corpus).unwrap();
        for shard_count in 1..=40 {
            let mut collected = Vec::new();
            for range in split_shards(corpus.len() as u64, shard_count) {
                for record in RecordReader::open_shard(file.path(), range.clone()).unwrap() {
                    let record = record.unwrap();
                    assert!(range.contains(&record.offset));
                    collected.push(record);
                }
            }
            assert_eq!(collected, expected, "shard count {shard_count}");
        }
    }
}
