//! # Index Builder
//!
//! Turns a review corpus into an on-disk index directory.
//!
//! ## Pipeline
//!
//! 1. **Vocabulary discovery**: the corpus is split into one byte-range shard per
//!    worker. Every worker collects the distinct terms and product ids of its shard
//!    into private sets and counts its reviews. After the join, the sets are merged
//!    into two sorted [`Vocabulary`] instances, which fix the id of every item.
//! 2. **Pair generation**: the shards are scanned again. Worker `i` numbers its
//!    reviews starting right after the reviews of shards `0..i`, resolves every term
//!    and product id, feeds `(id, review_id)` pairs into the two external sorters and
//!    records the review metadata.
//! 3. **Finalization**: both sorters merge their runs, the posting lists and
//!    dictionaries are written, then the review store. Temporary run files are
//!    removed.
//!
//! All phases run on a dedicated thread pool of `workers` threads.

use std::{fs, ops::Range, path::Path, thread::available_parallelism};

use ahash::AHashSet;
use log::{info, trace};
use rayon::prelude::*;
use revidx_common::{Result, error::Error, verify_arg};

use crate::{
    corpus::{RecordReader, split_shards},
    layout::{DEFAULT_IO_BLOCK_SIZE, DictionaryKind, reviews_path},
    tokenizer::{WordTokenizer, normalize_into},
    varint,
    write::{
        postings::{PostingsStats, write_postings},
        reviews::{ReviewEntry, ReviewStoreBuilder},
        sorter::{ExternalSorter, PAIR_SIZE},
        vocabulary::Vocabulary,
    },
};

/// Configuration parameters for building an index.
///
/// Every field is optional; the getters return the effective value.
#[derive(Debug, Clone, Default)]
pub struct IndexWriterParams {
    /// Number of worker threads, which is also the number of corpus shards.
    /// Defaults to the available parallelism of the machine.
    pub workers: Option<usize>,

    /// Memory budget in bytes for the term sort buffers of all workers together.
    pub term_memory_budget: Option<usize>,

    /// Memory budget in bytes for the product sort buffers of all workers together.
    pub product_memory_budget: Option<usize>,

    /// Buffer size of run files and posting lists.
    pub io_block_size: Option<usize>,

    /// Maximum number of runs merged by one merge task, per vocabulary.
    pub term_merge_fan_in: Option<usize>,
    pub product_merge_fan_in: Option<usize>,
}

impl IndexWriterParams {
    pub fn workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    pub fn io_block_size(&self) -> usize {
        self.io_block_size.unwrap_or(DEFAULT_IO_BLOCK_SIZE)
    }

    /// Effective sort memory budget of a vocabulary, `blocks * io_block_size` unless
    /// overridden.
    pub fn memory_budget(&self, kind: DictionaryKind) -> usize {
        let explicit = match kind {
            DictionaryKind::Term => self.term_memory_budget,
            DictionaryKind::Product => self.product_memory_budget,
        };
        explicit.unwrap_or(kind.memory_blocks() * self.io_block_size())
    }

    /// Number of pairs buffered by each worker before a run is spilled.
    pub fn run_capacity(&self, kind: DictionaryKind) -> usize {
        (self.memory_budget(kind) / PAIR_SIZE / self.workers()).max(1)
    }

    pub fn merge_fan_in(&self, kind: DictionaryKind) -> usize {
        let explicit = match kind {
            DictionaryKind::Term => self.term_merge_fan_in,
            DictionaryKind::Product => self.product_merge_fan_in,
        };
        explicit.unwrap_or(kind.merge_fan_in())
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub reviews: u32,
    /// Total number of tokens over all reviews.
    pub tokens: u64,
    pub terms: PostingsStats,
    pub products: PostingsStats,
}

/// Vocabulary collected from one shard during discovery.
#[derive(Default)]
struct ShardVocabulary {
    terms: AHashSet<Vec<u8>>,
    products: AHashSet<Vec<u8>>,
    reviews: u32,
}

/// Shared state of the pair generation pass.
struct IndexingContext<'a> {
    input: &'a Path,
    tokenizer: WordTokenizer,
    terms: &'a Vocabulary,
    products: &'a Vocabulary,
    term_sorter: &'a ExternalSorter,
    product_sorter: &'a ExternalSorter,
    reviews: &'a ReviewStoreBuilder,
}

pub struct IndexWriter {
    params: IndexWriterParams,
}

impl IndexWriter {
    pub fn new(params: IndexWriterParams) -> IndexWriter {
        IndexWriter { params }
    }

    pub fn params(&self) -> &IndexWriterParams {
        &self.params
    }

    /// Builds the index of the corpus at `input` into `dir`.
    ///
    /// The directory and its parents are created when missing. Existing index files
    /// in `dir` are overwritten.
    ///
    /// # Errors
    /// Any I/O failure or malformed corpus record aborts the build. The directory may
    /// then contain a partial index and should be removed with [`remove_index`].
    pub fn write(&self, input: &Path, dir: &Path) -> Result<IndexSummary> {
        verify_arg!(workers, self.params.workers.is_none_or(|n| n > 0));
        fs::create_dir_all(dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
        let input_len = fs::metadata(input)
            .map_err(|e| Error::io(input.display().to_string(), e))?
            .len();

        let workers = self.params.workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("revidx-worker-{i}"))
            .build()?;
        info!(
            "indexing {} ({input_len} bytes) into {} with {workers} workers",
            input.display(),
            dir.display()
        );
        pool.install(|| self.build(input, input_len, dir, workers))
    }

    fn build(
        &self,
        input: &Path,
        input_len: u64,
        dir: &Path,
        workers: usize,
    ) -> Result<IndexSummary> {
        let shards = split_shards(input_len, workers);
        let tokenizer = WordTokenizer::new();

        let discovered = shards
            .par_iter()
            .map(|range| discover_shard(input, range.clone(), tokenizer))
            .collect::<Result<Vec<_>>>()?;

        let mut first_ids = Vec::with_capacity(discovered.len());
        let mut next_id = 1u64;
        for shard in &discovered {
            first_ids.push(next_id as u32);
            next_id += shard.reviews as u64;
        }
        let review_count = next_id - 1;
        if review_count > varint::MAX_VALUE as u64 {
            return Err(Error::value_out_of_range(
                review_count,
                varint::MAX_VALUE as u64,
            ));
        }
        let review_count = review_count as u32;

        let mut term_sets = Vec::with_capacity(discovered.len());
        let mut product_sets = Vec::with_capacity(discovered.len());
        let mut shard_reviews = Vec::with_capacity(discovered.len());
        for shard in discovered {
            term_sets.push(shard.terms);
            product_sets.push(shard.products);
            shard_reviews.push(shard.reviews);
        }
        let (terms, products) = rayon::join(
            || Vocabulary::from_sets(term_sets),
            || Vocabulary::from_sets(product_sets),
        );
        let (terms, products) = (terms?, products?);
        info!(
            "discovered {review_count} reviews, {} terms, {} products",
            terms.len(),
            products.len()
        );

        let sorter = |kind: DictionaryKind| {
            ExternalSorter::new(
                dir,
                kind.run_prefix(),
                self.params.run_capacity(kind),
                self.params.merge_fan_in(kind),
                self.params.io_block_size(),
            )
        };
        let term_sorter = sorter(DictionaryKind::Term)?;
        let product_sorter = sorter(DictionaryKind::Product)?;
        let reviews = ReviewStoreBuilder::new(review_count);

        let context = IndexingContext {
            input,
            tokenizer,
            terms: &terms,
            products: &products,
            term_sorter: &term_sorter,
            product_sorter: &product_sorter,
            reviews: &reviews,
        };
        shards
            .par_iter()
            .zip(first_ids.par_iter())
            .zip(shard_reviews.par_iter())
            .try_for_each(|((range, &first_id), &count)| {
                context.index_shard(range.clone(), first_id, count)
            })?;
        info!(
            "generated pairs: {} term runs, {} product runs",
            term_sorter.run_count(),
            product_sorter.run_count()
        );

        let (term_run, product_run) =
            rayon::join(|| term_sorter.finish(), || product_sorter.finish());
        let (term_run, product_run) = (term_run?, product_run?);
        info!(
            "merged {} term pairs and {} product pairs",
            term_run.len(),
            product_run.len()
        );

        let io_block_size = self.params.io_block_size();
        let (term_stats, product_stats) = rayon::join(
            || write_postings(&term_run, &terms, DictionaryKind::Term, dir, io_block_size),
            || {
                write_postings(
                    &product_run,
                    &products,
                    DictionaryKind::Product,
                    dir,
                    io_block_size,
                )
            },
        );
        let (term_stats, product_stats) = (term_stats?, product_stats?);

        let tokens = reviews.write(&reviews_path(dir))?;
        term_run.remove()?;
        product_run.remove()?;

        let summary = IndexSummary {
            reviews: review_count,
            tokens,
            terms: term_stats,
            products: product_stats,
        };
        info!("index complete: {summary:?}");
        Ok(summary)
    }
}

/// Collects the distinct terms and product ids of one shard.
fn discover_shard(
    input: &Path,
    range: Range<u64>,
    tokenizer: WordTokenizer,
) -> Result<ShardVocabulary> {
    trace!("discovering vocabulary of shard {range:?}");
    let mut vocabulary = ShardVocabulary::default();
    let mut term = Vec::new();
    for record in RecordReader::open_shard(input, range)? {
        let record = record?;
        for token in tokenizer.tokenize(&record.text) {
            normalize_into(token, &mut term);
            if !vocabulary.terms.contains(term.as_slice()) {
                vocabulary.terms.insert(term.clone());
            }
        }
        vocabulary.products.insert(record.product_id);
        vocabulary.reviews += 1;
    }
    Ok(vocabulary)
}

impl IndexingContext<'_> {
    /// Emits the pairs and review entries of one shard.
    fn index_shard(&self, range: Range<u64>, first_id: u32, expected: u32) -> Result<()> {
        trace!("indexing shard {range:?} from review {first_id}");
        let mut term_pairs = self.term_sorter.run_buffer();
        let mut product_pairs = self.product_sorter.run_buffer();
        let mut term = Vec::new();
        let mut indexed = 0u32;

        for record in RecordReader::open_shard(self.input, range.clone())? {
            let record = record?;
            if indexed == expected {
                return Err(corpus_changed(&range));
            }
            let review_id = first_id + indexed;

            let product_index = self
                .products
                .id_of(&record.product_id)
                .ok_or_else(|| corpus_changed(&range))?;
            product_pairs.push(product_index, review_id)?;

            let mut length = 0u32;
            for token in self.tokenizer.tokenize(&record.text) {
                normalize_into(token, &mut term);
                let id = self
                    .terms
                    .id_of(&term)
                    .ok_or_else(|| corpus_changed(&range))?;
                term_pairs.push(id, review_id)?;
                length += 1;
            }

            self.reviews.add_review(review_id, ReviewEntry {
                product_index,
                helpfulness_numerator: record.helpfulness_numerator,
                helpfulness_denominator: record.helpfulness_denominator,
                score: record.score,
                length,
            })?;
            indexed += 1;
        }
        if indexed != expected {
            return Err(corpus_changed(&range));
        }

        term_pairs.finish()?;
        product_pairs.finish()
    }
}

#[cold]
fn corpus_changed(range: &Range<u64>) -> Error {
    Error::invalid_operation(format!(
        "corpus shard {range:?} changed between the discovery and indexing passes"
    ))
}

/// Deletes an index directory and everything inside it.
///
/// Removing a directory that does not exist is not an error.
pub fn remove_index(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            info!("removed index {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(dir.display().to_string(), e)),
    }
}
