use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "revidx")]
#[command(about = "Build and query inverted indexes over product review corpora")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a review corpus
    Build {
        /// Review corpus file
        #[arg(short, long)]
        input: String,

        /// Number of worker threads (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Sort memory budget for review terms, in MiB
        #[arg(long)]
        memory_budget_mb: Option<usize>,

        /// Output index directory
        index_dir: String,
    },

    /// Query an existing index
    Query {
        /// Index directory
        index_dir: String,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Delete an index directory
    Remove {
        /// Index directory
        index_dir: String,
    },
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Number of reviews containing a token
    TokenFrequency { token: String },

    /// Total number of occurrences of a token
    CollectionFrequency { token: String },

    /// Reviews containing a token, with per-review occurrence counts
    ReviewsWithToken { token: String },

    /// Reviews of a product
    ProductReviews { product_id: String },

    /// Metadata of a single review
    Review { review_id: u32 },

    /// Index-wide statistics
    Stats,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            workers,
            memory_budget_mb,
            index_dir,
        } => commands::build::run(input, workers, memory_budget_mb, index_dir),
        Commands::Query { index_dir, query } => commands::query::run(index_dir, query),
        Commands::Remove { index_dir } => commands::remove::run(index_dir),
    }
}
