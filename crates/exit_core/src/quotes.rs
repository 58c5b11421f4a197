//! crates/exit_core/src/quotes.rs
//!
//! Validation and ranking rules for community quotes.

use crate::domain::Quote;

pub const MIN_QUOTE_CHARS: usize = 10;
pub const MAX_QUOTE_CHARS: usize = 200;

/// How many quotes the board shows when the caller doesn't say.
pub const DEFAULT_TOP_LIMIT: usize = 10;
pub const MAX_TOP_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteValidationError {
    #[error("Quote must be at least 10 characters (got {0})")]
    TooShort(usize),
    #[error("Quote must be at most 200 characters (got {0})")]
    TooLong(usize),
}

/// Trims the submitted text and checks its length in characters.
pub fn validate_quote_text(text: &str) -> Result<String, QuoteValidationError> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len < MIN_QUOTE_CHARS {
        return Err(QuoteValidationError::TooShort(len));
    }
    if len > MAX_QUOTE_CHARS {
        return Err(QuoteValidationError::TooLong(len));
    }
    Ok(trimmed.to_string())
}

/// Orders quotes by descending votes and keeps the first `limit`.
///
/// The sort is stable, so equal counts keep their storage order.
pub fn rank_top(mut quotes: Vec<Quote>, limit: usize) -> Vec<Quote> {
    quotes.sort_by(|a, b| b.votes.cmp(&a.votes));
    quotes.truncate(limit);
    quotes
}
