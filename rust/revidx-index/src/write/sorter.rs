//! External sort-merge of `(id, review_id)` pairs.
//!
//! Producers fill private [`RunBuffer`]s. A full buffer is sorted (both halves in
//! parallel, then merged) and spilled to a run file in the index directory. Once all
//! producers are done, [`ExternalSorter::finish`] merges the runs in batches of at
//! most `fan_in` files, running the batches of one merge generation in parallel, until
//! a single sorted run remains.
//!
//! Run file format: a flat sequence of pairs, each one a big-endian `u32` id followed
//! by a big-endian `u32` review id. Run files are named
//! `<prefix>-<generation>-<index>`, so no file is ever renamed or overwritten.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, binary_heap::PeekMut},
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::{self, AtomicUsize},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use rayon::prelude::*;
use revidx_common::{Result, error::Error, verify_arg, verify_data};

/// Serialized size of a [`Pair`].
pub const PAIR_SIZE: usize = 8;

/// Run buffers grow up to their capacity on demand.
const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// An occurrence of a vocabulary item (term or product) in a review.
///
/// Pairs order by `id` first and by `review_id` second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub id: u32,
    pub review_id: u32,
}

impl Pair {
    pub fn new(id: u32, review_id: u32) -> Pair {
        Pair { id, review_id }
    }
}

/// Bounded-memory sorter shared by all producers of one vocabulary.
pub struct ExternalSorter {
    dir: PathBuf,
    prefix: &'static str,
    run_capacity: usize,
    fan_in: usize,
    io_block_size: usize,
    /// Number of generation-zero runs written so far.
    run_count: AtomicUsize,
}

impl ExternalSorter {
    /// Creates a sorter that spills its runs into `dir`.
    ///
    /// # Arguments
    /// * `prefix` - file name prefix of the run files
    /// * `run_capacity` - number of pairs held by a [`RunBuffer`] before it spills
    /// * `fan_in` - maximum number of runs merged by a single merge task
    /// * `io_block_size` - read and write buffer size per run file
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: &'static str,
        run_capacity: usize,
        fan_in: usize,
        io_block_size: usize,
    ) -> Result<ExternalSorter> {
        verify_arg!(run_capacity, run_capacity > 0);
        verify_arg!(fan_in, fan_in >= 2);
        verify_arg!(io_block_size, io_block_size >= PAIR_SIZE);
        Ok(ExternalSorter {
            dir: dir.into(),
            prefix,
            run_capacity,
            fan_in,
            io_block_size,
            run_count: AtomicUsize::new(0),
        })
    }

    /// Returns a new producer-local buffer feeding this sorter.
    pub fn run_buffer(&self) -> RunBuffer<'_> {
        RunBuffer {
            sorter: self,
            pairs: Vec::with_capacity(self.run_capacity.min(INITIAL_BUFFER_CAPACITY)),
        }
    }

    /// Number of runs spilled by the producers so far.
    pub fn run_count(&self) -> usize {
        self.run_count.load(atomic::Ordering::Acquire)
    }

    fn run_path(&self, generation: usize, index: usize) -> PathBuf {
        self.dir.join(format!("{}-{generation}-{index}", self.prefix))
    }

    /// Sorts `pairs` and writes them out as a new generation-zero run.
    fn spill(&self, pairs: &mut [Pair]) -> Result<()> {
        let index = self.run_count.fetch_add(1, atomic::Ordering::AcqRel);
        let path = self.run_path(0, index);

        let mid = pairs.len() / 2;
        let (left, right) = pairs.split_at_mut(mid);
        rayon::join(|| left.sort_unstable(), || right.sort_unstable());

        let mut writer = RunWriter::create(&path, self.io_block_size)?;
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            if left[i] <= right[j] {
                writer.push(left[i])?;
                i += 1;
            } else {
                writer.push(right[j])?;
                j += 1;
            }
        }
        for &pair in left[i..].iter().chain(&right[j..]) {
            writer.push(pair)?;
        }
        let count = writer.finish()?;
        debug!("{}: spilled run {index} with {count} pairs", self.prefix);
        Ok(())
    }

    /// Merges all spilled runs into a single sorted run.
    ///
    /// Every consumed run file is deleted by the merge task that read it. When no pair
    /// was ever pushed, the result is an empty run.
    pub fn finish(self) -> Result<SortedRun> {
        let mut runs = (0..self.run_count())
            .map(|index| self.run_path(0, index))
            .collect::<Vec<_>>();
        if runs.is_empty() {
            let path = self.run_path(0, 0);
            RunWriter::create(&path, self.io_block_size)?.finish()?;
            runs.push(path);
        }

        let mut generation = 0;
        while runs.len() > 1 {
            generation += 1;
            debug!(
                "{}: merge generation {generation}, {} runs, fan-in {}",
                self.prefix,
                runs.len(),
                self.fan_in
            );
            runs = runs
                .par_chunks(self.fan_in)
                .enumerate()
                .map(|(index, batch)| {
                    let output = self.run_path(generation, index);
                    merge_runs(batch, &output, self.io_block_size)?;
                    Ok(output)
                })
                .collect::<Result<Vec<_>>>()?;
        }

        let path = runs
            .pop()
            .ok_or_else(|| Error::invalid_operation("sorter produced no runs"))?;
        SortedRun::open(path)
    }
}

/// Producer-local, fixed-capacity pair buffer.
pub struct RunBuffer<'a> {
    sorter: &'a ExternalSorter,
    pairs: Vec<Pair>,
}

impl RunBuffer<'_> {
    pub fn push(&mut self, id: u32, review_id: u32) -> Result<()> {
        self.pairs.push(Pair::new(id, review_id));
        if self.pairs.len() >= self.sorter.run_capacity {
            self.sorter.spill(&mut self.pairs)?;
            self.pairs.clear();
        }
        Ok(())
    }

    /// Spills the remaining pairs, if any.
    pub fn finish(mut self) -> Result<()> {
        if !self.pairs.is_empty() {
            self.sorter.spill(&mut self.pairs)?;
        }
        Ok(())
    }
}

/// The fully merged output of an [`ExternalSorter`].
#[derive(Debug)]
pub struct SortedRun {
    path: PathBuf,
    len: u64,
}

impl SortedRun {
    fn open(path: PathBuf) -> Result<SortedRun> {
        let size = fs::metadata(&path)
            .map_err(|e| Error::io(path.display().to_string(), e))?
            .len();
        verify_data!(size, size % PAIR_SIZE as u64 == 0);
        Ok(SortedRun {
            path,
            len: size / PAIR_SIZE as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pairs in the run.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reader(&self, io_block_size: usize) -> Result<RunReader> {
        RunReader::open(&self.path, io_block_size)
    }

    /// Deletes the run file.
    pub fn remove(self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| Error::io(self.path.display().to_string(), e))
    }
}

/// Sequential reader over a run file, refilled one I/O block at a time.
pub struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    pub fn open(path: &Path, io_block_size: usize) -> Result<RunReader> {
        let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let size = file.metadata()?.len();
        verify_data!(size, size % PAIR_SIZE as u64 == 0);
        Ok(RunReader {
            reader: BufReader::with_capacity(io_block_size, file),
            remaining: size / PAIR_SIZE as u64,
        })
    }

    fn read_pair(&mut self) -> Result<Pair> {
        let id = self.reader.read_u32::<BigEndian>()?;
        let review_id = self.reader.read_u32::<BigEndian>()?;
        self.remaining -= 1;
        Ok(Pair { id, review_id })
    }
}

impl Iterator for RunReader {
    type Item = Result<Pair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        Some(self.read_pair())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

struct RunWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    count: u64,
}

impl RunWriter {
    fn create(path: &Path, io_block_size: usize) -> Result<RunWriter> {
        let file = File::create(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(RunWriter {
            writer: BufWriter::with_capacity(io_block_size, file),
            path: path.to_path_buf(),
            count: 0,
        })
    }

    fn push(&mut self, pair: Pair) -> Result<()> {
        self.writer.write_u32::<BigEndian>(pair.id)?;
        self.writer.write_u32::<BigEndian>(pair.review_id)?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| Error::io(self.path.display().to_string(), e))?;
        Ok(self.count)
    }
}

/// Head of one input run during a k-way merge.
///
/// Ordering is reversed so that `BinaryHeap` (a max-heap) yields the smallest pair.
struct MergeCursor {
    head: Pair,
    source: usize,
}

impl PartialEq for MergeCursor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCursor {}

impl Ord for MergeCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.head, other.source).cmp(&(self.head, self.source))
    }
}

impl PartialOrd for MergeCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges the sorted `inputs` into `output` and deletes the inputs.
fn merge_runs(inputs: &[PathBuf], output: &Path, io_block_size: usize) -> Result<u64> {
    let mut readers = inputs
        .iter()
        .map(|path| RunReader::open(path, io_block_size))
        .collect::<Result<Vec<_>>>()?;

    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (source, reader) in readers.iter_mut().enumerate() {
        if let Some(head) = reader.next().transpose()? {
            heap.push(MergeCursor { head, source });
        }
    }

    let mut writer = RunWriter::create(output, io_block_size)?;
    while let Some(mut top) = heap.peek_mut() {
        writer.push(top.head)?;
        match readers[top.source].next().transpose()? {
            Some(next) => top.head = next,
            None => {
                PeekMut::pop(top);
            }
        }
    }
    let count = writer.finish()?;

    drop(readers);
    for path in inputs {
        fs::remove_file(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_pairs(count: usize, max_id: u32, max_review: u32) -> Vec<Pair> {
        (0..count)
            .map(|_| Pair::new(fastrand::u32(0..max_id), fastrand::u32(1..=max_review)))
            .collect()
    }

    fn read_all(run: &SortedRun) -> Vec<Pair> {
        run.reader(64)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn remaining_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_single_producer_multiple_generations() {
        fastrand::seed(42);
        let dir = tempfile::tempdir().unwrap();
        // 10 pairs per run and fan-in 3 give ~100 runs and several merge generations.
        let sorter = ExternalSorter::new(dir.path(), "pairs", 10, 3, 16).unwrap();

        let mut pairs = random_pairs(1000, 50, 200);
        let mut buffer = sorter.run_buffer();
        for pair in &pairs {
            buffer.push(pair.id, pair.review_id).unwrap();
        }
        buffer.finish().unwrap();
        assert_eq!(sorter.run_count(), 100);

        let run = sorter.finish().unwrap();
        pairs.sort_unstable();
        assert_eq!(run.len(), 1000);
        assert_eq!(read_all(&run), pairs);

        // Only the final run survives the merge.
        let files = remaining_files(dir.path());
        assert_eq!(files.len(), 1);
        run.remove().unwrap();
        assert!(remaining_files(dir.path()).is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        fastrand::seed(3);
        let dir = tempfile::tempdir().unwrap();
        let sorter = ExternalSorter::new(dir.path(), "pairs", 37, 4, 4096).unwrap();

        let chunks = (0..8)
            .map(|_| random_pairs(500, 1000, 10_000))
            .collect::<Vec<_>>();
        chunks
            .par_iter()
            .try_for_each(|chunk| {
                let mut buffer = sorter.run_buffer();
                for pair in chunk {
                    buffer.push(pair.id, pair.review_id)?;
                }
                buffer.finish()
            })
            .unwrap();

        let run = sorter.finish().unwrap();
        let mut expected = chunks.concat();
        expected.sort_unstable();
        assert_eq!(read_all(&run), expected);
    }

    #[test]
    fn test_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let sorter = ExternalSorter::new(dir.path(), "pairs", 10, 2, 4096).unwrap();
        sorter.run_buffer().finish().unwrap();
        let run = sorter.finish().unwrap();
        assert!(run.is_empty());
        assert!(read_all(&run).is_empty());
    }

    #[test]
    fn test_single_run_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let sorter = ExternalSorter::new(dir.path(), "pairs", 100, 2, 4096).unwrap();
        let mut buffer = sorter.run_buffer();
        for (id, review_id) in [(3, 1), (1, 2), (3, 0), (1, 1), (2, 9)] {
            buffer.push(id, review_id).unwrap();
        }
        buffer.finish().unwrap();
        let run = sorter.finish().unwrap();
        assert_eq!(
            read_all(&run),
            vec![
                Pair::new(1, 1),
                Pair::new(1, 2),
                Pair::new(2, 9),
                Pair::new(3, 0),
                Pair::new(3, 1)
            ]
        );
    }

    #[test]
    fn test_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ExternalSorter::new(dir.path(), "pairs", 0, 2, 4096).is_err());
        assert!(ExternalSorter::new(dir.path(), "pairs", 10, 1, 4096).is_err());
    }
}
