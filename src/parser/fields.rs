use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use tracing::debug;

static NON_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("no element matched")]
    Missing,
    #[error("no digits in {0:?}")]
    NoDigits(String),
    #[error("{raw:?} does not parse as a number")]
    Unparsable { raw: String },
}

/// Unwrap one field's result, logging and substituting `default` on failure.
pub fn best_effort<T>(field: &'static str, default: T, result: Result<T, FieldError>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            debug!(field, error = %e, "Field extraction failed, using default");
            default
        }
    }
}

/// Strip every non-digit and parse what remains.
pub fn parse_digits<T: FromStr>(raw: &str) -> Result<T, FieldError> {
    let digits = NON_DIGIT_RE.replace_all(raw, "");
    if digits.is_empty() {
        return Err(FieldError::NoDigits(raw.to_string()));
    }
    digits.parse::<T>().map_err(|_| FieldError::Unparsable {
        raw: raw.to_string(),
    })
}

pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// All text nodes under `el`, joined by a single space and whitespace-normalized.
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Normalized text of the first descendant matching `selector`.
pub fn first_text(el: ElementRef<'_>, selector: &Selector) -> Result<String, FieldError> {
    el.select(selector)
        .next()
        .map(element_text)
        .ok_or(FieldError::Missing)
}
