//! Query command implementation

use anyhow::{Context, Result};
use serde::Serialize;

use revidx_index::IndexReader;

use crate::QueryCommand;

#[derive(Serialize)]
struct PostingInfo {
    review_id: u32,
    frequency: u32,
}

#[derive(Serialize)]
struct ReviewInfo {
    review_id: u32,
    product_id: String,
    score: u8,
    helpfulness_numerator: u16,
    helpfulness_denominator: u16,
    length: u32,
}

#[derive(Serialize)]
struct StatsInfo {
    reviews: u32,
    tokens: u64,
    terms: usize,
    products: usize,
}

/// Run the query command
pub fn run(index_dir: String, query: QueryCommand) -> Result<()> {
    let reader = IndexReader::open(&index_dir)
        .with_context(|| format!("Failed to open index {index_dir}"))?;
    println!("{}", execute(&reader, &query)?);
    Ok(())
}

/// Evaluates a query and renders its result as JSON.
fn execute(reader: &IndexReader, query: &QueryCommand) -> Result<String> {
    let output = match query {
        QueryCommand::TokenFrequency { token } => {
            serde_json::to_string(&reader.token_frequency(token))?
        }
        QueryCommand::CollectionFrequency { token } => {
            serde_json::to_string(&reader.token_collection_frequency(token)?)?
        }
        QueryCommand::ReviewsWithToken { token } => {
            let postings = reader
                .reviews_with_token(token)?
                .into_iter()
                .map(|p| PostingInfo {
                    review_id: p.review_id,
                    frequency: p.frequency,
                })
                .collect::<Vec<_>>();
            serde_json::to_string_pretty(&postings)?
        }
        QueryCommand::ProductReviews { product_id } => {
            serde_json::to_string(&reader.product_reviews(product_id)?)?
        }
        QueryCommand::Review { review_id } => {
            let review_id = *review_id;
            let (Some(review), Some(product_id)) =
                (reader.review(review_id), reader.product_id(review_id))
            else {
                anyhow::bail!(
                    "Review {review_id} not found (index holds {} reviews)",
                    reader.number_of_reviews()
                );
            };
            serde_json::to_string_pretty(&ReviewInfo {
                review_id,
                product_id,
                score: review.score,
                helpfulness_numerator: review.helpfulness_numerator,
                helpfulness_denominator: review.helpfulness_denominator,
                length: review.length,
            })?
        }
        QueryCommand::Stats => serde_json::to_string_pretty(&StatsInfo {
            reviews: reader.number_of_reviews(),
            tokens: reader.token_size_of_reviews(),
            terms: reader.term_dictionary().len(),
            products: reader.product_dictionary().len(),
        })?,
    };
    Ok(output)
}
