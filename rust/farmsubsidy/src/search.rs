//! Name and scheme search.

use crate::{
    error::{Result, ServiceError},
    views::ViewKind,
};

/// Normalised form of a name used for matching: lowercase alphanumeric
/// words separated by single spaces.
pub fn fingerprint(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprints the text of a LIKE pattern and keeps its `%` wildcards.
pub fn fingerprint_pattern(value: &str) -> String {
    let core = value.trim_matches('%');
    if core.is_empty() {
        return value.to_string();
    }
    let leading = value.len() - value.trim_start_matches('%').len();
    let trailing = value.len() - value.trim_end_matches('%').len();
    format!(
        "{}{}{}",
        "%".repeat(leading),
        fingerprint(core),
        "%".repeat(trailing)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Recipients,
    Schemes,
}

impl SearchKind {
    pub fn view(&self) -> ViewKind {
        match self {
            SearchKind::Recipients => ViewKind::Recipients,
            SearchKind::Schemes => ViewKind::Schemes,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            SearchKind::Recipients => "recipient_fingerprint",
            SearchKind::Schemes => "scheme",
        }
    }

    /// The lookup `(field, value)` for a search string. Empty input fails
    /// before any query is built.
    pub fn lookup(&self, q: &str) -> Result<(&'static str, String)> {
        let value = match self {
            SearchKind::Recipients => fingerprint(q),
            SearchKind::Schemes => q.trim().to_string(),
        };
        if value.is_empty() {
            return Err(ServiceError::InvalidSearch("Search string is empty".into()));
        }
        Ok((self.field(), value))
    }
}
