//! Build command implementation

use anyhow::{Context, Result};
use std::{path::Path, time::Instant};

use revidx_index::{IndexWriter, IndexWriterParams};

use crate::utils;

/// Run the build command
pub fn run(
    input: String,
    workers: Option<usize>,
    memory_budget_mb: Option<usize>,
    index_dir: String,
) -> Result<()> {
    utils::validate_file_exists(&input)?;
    if workers == Some(0) {
        anyhow::bail!("--workers must be at least 1");
    }

    let params = IndexWriterParams {
        workers,
        term_memory_budget: memory_budget_bytes(memory_budget_mb)?,
        ..Default::default()
    };
    let input_size = std::fs::metadata(&input)?.len();
    println!(
        "Building index {index_dir} from {input} ({})",
        utils::format_size(input_size)
    );

    let start_time = Instant::now();
    let summary = IndexWriter::new(params)
        .write(Path::new(&input), Path::new(&index_dir))
        .with_context(|| format!("Failed to build index {index_dir}"))?;
    let elapsed = start_time.elapsed();

    println!("Build completed:");
    println!("  Total time: {:.3} seconds", elapsed.as_secs_f64());
    println!("  Reviews: {}", summary.reviews);
    println!("  Tokens: {}", summary.tokens);
    println!(
        "  Terms: {} ({} postings, {})",
        summary.terms.entries,
        summary.terms.rows,
        utils::format_size(summary.terms.bytes)
    );
    println!(
        "  Products: {} ({} postings, {})",
        summary.products.entries,
        summary.products.rows,
        utils::format_size(summary.products.bytes)
    );
    Ok(())
}

/// Converts `--memory-budget-mb` to bytes.
fn memory_budget_bytes(memory_budget_mb: Option<usize>) -> Result<Option<usize>> {
    let Some(mb) = memory_budget_mb else {
        return Ok(None);
    };
    if mb == 0 {
        anyhow::bail!("--memory-budget-mb must be at least 1");
    }
    match mb.checked_mul(1024 * 1024) {
        Some(bytes) => Ok(Some(bytes)),
        None => anyhow::bail!("--memory-budget-mb {mb} does not fit in memory"),
    }
}
