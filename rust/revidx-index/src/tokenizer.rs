//! Review text tokenization.
//!
//! A token is a maximal run of ASCII alphanumeric bytes. Every other byte, including
//! `_`, punctuation, whitespace and non-ASCII bytes, separates tokens. Tokens are
//! lower-cased and truncated to [`MAX_TERM_LENGTH`] bytes before they are indexed.

use revidx_common::{Result, verify_arg};

use crate::layout::MAX_TERM_LENGTH;

/// Extracts word tokens from raw review text.
#[derive(Debug, Clone, Copy)]
pub struct WordTokenizer {
    max_term_length: usize,
}

impl WordTokenizer {
    pub fn new() -> WordTokenizer {
        WordTokenizer {
            max_term_length: MAX_TERM_LENGTH,
        }
    }

    /// Creates a tokenizer with a shorter truncation limit.
    ///
    /// The limit must lie in `1..=MAX_TERM_LENGTH`, since longer terms cannot be
    /// stored in a dictionary.
    pub fn with_max_term_length(max_term_length: usize) -> Result<WordTokenizer> {
        verify_arg!(
            max_term_length,
            (1..=MAX_TERM_LENGTH).contains(&max_term_length)
        );
        Ok(WordTokenizer { max_term_length })
    }

    /// Returns an iterator over the raw (not yet lower-cased) tokens of `input`.
    pub fn tokenize<'a>(&self, input: &'a [u8]) -> WordTokenIterator<'a> {
        WordTokenIterator {
            input,
            pos: 0,
            max_term_length: self.max_term_length,
        }
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the alphanumeric runs of a byte string.
pub struct WordTokenIterator<'a> {
    input: &'a [u8],
    pos: usize,
    max_term_length: usize,
}

impl<'a> Iterator for WordTokenIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.input[self.pos..];
        let start = rest.iter().position(|b| b.is_ascii_alphanumeric())?;
        let len = rest[start..]
            .iter()
            .position(|b| !b.is_ascii_alphanumeric())
            .unwrap_or(rest.len() - start);
        self.pos += start + len;
        let word = &rest[start..start + len];
        Some(&word[..word.len().min(self.max_term_length)])
    }
}

/// Writes the indexed form of a raw `token` into `out`, replacing its contents.
pub fn normalize_into(token: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend(token.iter().map(u8::to_ascii_lowercase));
}

/// Normalizes a query token to its indexed form.
pub fn normalize_term(token: &str) -> Vec<u8> {
    let mut term = token.as_bytes().to_ascii_lowercase();
    term.truncate(MAX_TERM_LENGTH);
    term
}

/// Normalizes a product identifier to its stored form.
pub fn normalize_product_id(product_id: &[u8]) -> Vec<u8> {
    product_id.trim_ascii().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str) -> Vec<String> {
        let mut term = Vec::new();
        WordTokenizer::new()
            .tokenize(input.as_bytes())
            .map(|token| {
                normalize_into(token, &mut term);
                String::from_utf8(term.clone()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_word_boundaries() {
        assert_eq!(
            collect("Great product, would BUY again!"),
            vec!["great", "product", "would", "buy", "again"]
        );
        assert_eq!(collect("snake_case and-dash 4x4"), vec![
            "snake", "case", "and", "dash", "4x4"
        ]);
        assert_eq!(collect("<br />It's"), vec!["br", "it", "s"]);
        assert!(collect("").is_empty());
        assert!(collect(" ,.;_ ").is_empty());
    }

    #[test]
    fn test_non_ascii_separates_tokens() {
        assert_eq!(collect("café crème"), vec!["caf", "cr", "me"]);
    }

    #[test]
    fn test_truncation() {
        let long = "a".repeat(300);
        let terms = collect(&format!("x {long} y"));
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[1].len(), MAX_TERM_LENGTH);

        let tokenizer = WordTokenizer::with_max_term_length(3).unwrap();
        let tokens = tokenizer.tokenize(b"abcdef gh").collect::<Vec<_>>();
        assert_eq!(tokens, vec![&b"abc"[..], &b"gh"[..]]);
    }

    #[test]
    fn test_max_term_length_bounds() {
        assert!(WordTokenizer::with_max_term_length(0).is_err());
        assert!(WordTokenizer::with_max_term_length(MAX_TERM_LENGTH + 1).is_err());
        let tokenizer = WordTokenizer::with_max_term_length(MAX_TERM_LENGTH).unwrap();
        let long = vec![b'q'; 400];
        assert_eq!(
            tokenizer.tokenize(&long).next().map(<[u8]>::len),
            Some(MAX_TERM_LENGTH)
        );
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_term("GooD"), b"good".to_vec());
        assert_eq!(normalize_product_id(b" B000ABC123\r"), b"b000abc123".to_vec());
    }
}
