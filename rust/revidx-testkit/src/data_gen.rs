//! Synthetic review corpus generation.
//!
//! Generated reviews draw their words from a small fixed vocabulary and their
//! products from a bounded pool, so terms and products repeat across reviews. The
//! rendered text mixes letter case and punctuation; `words` holds the expected
//! lower-case tokens of each review in order.

use std::io::Write;

use tempfile::NamedTempFile;

const WORDS: &[&str] = &[
    "good", "bad", "great", "taste", "tasty", "dog", "food", "coffee", "price", "quality",
    "product", "amazon", "buy", "again", "love", "loved", "box", "bag", "flavor", "sweet",
    "salt", "the", "a", "is", "it", "not", "very", "would", "recommend", "order", "x2",
    "100", "5star", "b12", "chocolate", "tea", "green", "cup", "k", "ok",
];

const SEPARATORS: &[&str] = &[" ", ", ", ". ", "! ", " - ", "_", "; ", "... ", " (", ") "];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticReview {
    /// Product id as written in the corpus (upper case).
    pub product_id: String,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub score: u8,
    /// Expected tokens of the review text.
    pub words: Vec<String>,
    /// Review text lines as rendered in the corpus.
    pub text_lines: Vec<String>,
}

/// Generation knobs.
#[derive(Debug, Clone)]
pub struct CorpusParams {
    pub reviews: usize,
    pub products: usize,
    pub max_words: usize,
    pub seed: u64,
}

impl Default for CorpusParams {
    fn default() -> Self {
        CorpusParams {
            reviews: 500,
            products: 40,
            max_words: 60,
            seed: 1,
        }
    }
}

pub fn generate_reviews(params: &CorpusParams) -> Vec<SyntheticReview> {
    let mut rng = fastrand::Rng::with_seed(params.seed);
    (0..params.reviews)
        .map(|_| {
            let product = rng.usize(0..params.products.max(1));
            let denominator = rng.u16(0..20);
            let word_count = rng.usize(0..=params.max_words);
            let words = (0..word_count)
                .map(|_| WORDS[rng.usize(0..WORDS.len())].to_string())
                .collect::<Vec<_>>();

            let mut text_lines = Vec::new();
            let mut line = String::new();
            for word in &words {
                if !line.is_empty() {
                    line.push_str(SEPARATORS[rng.usize(0..SEPARATORS.len())]);
                }
                match rng.u8(0..4) {
                    0 => line.push_str(&word.to_uppercase()),
                    1 => {
                        let mut chars = word.chars();
                        if let Some(first) = chars.next() {
                            line.extend(first.to_uppercase());
                            line.push_str(chars.as_str());
                        }
                    }
                    _ => line.push_str(word),
                }
                if rng.u8(0..12) == 0 {
                    text_lines.push(std::mem::take(&mut line));
                }
            }
            text_lines.push(line);

            SyntheticReview {
                product_id: format!("B{:09}", product * 7919),
                helpfulness_numerator: rng.u16(0..=denominator),
                helpfulness_denominator: denominator,
                score: rng.u8(1..=5),
                words,
                text_lines,
            }
        })
        .collect()
}

/// Renders reviews in the corpus text format.
pub fn render_corpus(reviews: &[SyntheticReview]) -> String {
    let mut out = String::new();
    for (i, review) in reviews.iter().enumerate() {
        out.push_str(&format!("product/productId: {}\n", review.product_id));
        out.push_str(&format!("review/userId: A{i:08}\n"));
        out.push_str(&format!("review/profileName: user {i}\n"));
        out.push_str(&format!(
            "review/helpfulness: {}/{}\n",
            review.helpfulness_numerator, review.helpfulness_denominator
        ));
        out.push_str(&format!("review/score: {}.0\n", review.score));
        out.push_str(&format!("review/time: {}\n", 1_300_000_000 + i));
        out.push_str("review/summary: Summary words are not indexed\n");
        out.push_str("review/text: ");
        out.push_str(&review.text_lines.join("\n"));
        out.push_str("\n\n");
    }
    out
}

/// Writes the rendered corpus to a temporary file.
pub fn write_corpus(reviews: &[SyntheticReview]) -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(render_corpus(reviews).as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let params = CorpusParams {
            reviews: 20,
            ..Default::default()
        };
        assert_eq!(generate_reviews(&params), generate_reviews(&params));
        let other = generate_reviews(&CorpusParams {
            seed: 2,
            ..params.clone()
        });
        assert_ne!(generate_reviews(&params), other);
    }

    #[test]
    fn test_render_format() {
        let review = SyntheticReview {
            product_id: "B000000001".to_string(),
            helpfulness_numerator: 1,
            helpfulness_denominator: 3,
            score: 4,
            words: vec!["good".to_string(), "dog".to_string()],
            text_lines: vec!["Good".to_string(), "DOG".to_string()],
        };
        let corpus = render_corpus(&[review]);
        assert!(corpus.starts_with("product/productId: B000000001\n"));
        assert!(corpus.contains("review/helpfulness: 1/3\n"));
        assert!(corpus.contains("review/score: 4.0\n"));
        assert!(corpus.ends_with("review/text: Good\nDOG\n\n"));
    }
}
