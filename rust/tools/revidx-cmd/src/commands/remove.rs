//! Remove command implementation

use anyhow::{Context, Result};
use std::path::Path;

/// Run the remove command
pub fn run(index_dir: String) -> Result<()> {
    revidx_index::remove_index(Path::new(&index_dir))
        .with_context(|| format!("Failed to remove index {index_dir}"))?;
    println!("Removed index {index_dir}");
    Ok(())
}
