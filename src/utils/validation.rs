//! Input validation and HIPAA-safe text handling.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::MedMatchError;

static NCT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^NCT\d{8}$").expect("static pattern"));

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static pattern"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9}\b").expect("static pattern"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}-\d{3}-\d{4}\b|\(\d{3}\)\s*\d{3}-\d{4}").expect("static pattern")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("static pattern")
});

/// An NCT id is valid iff it matches `NCT` followed by exactly eight digits.
/// Matching is case-sensitive: lowercase prefixes are rejected.
pub(crate) fn is_valid_nct_id(id: &str) -> bool {
    NCT_ID.is_match(id)
}

pub(crate) fn validate_nct_id(id: &str) -> Result<(), MedMatchError> {
    if is_valid_nct_id(id) {
        return Ok(());
    }
    Err(MedMatchError::InvalidArgument(format!(
        "Invalid NCT id '{id}': expected NCT followed by 8 digits"
    )))
}

/// Strips identifier patterns (SSN, bare 9-digit ids, phone numbers, email
/// addresses) from free text before it reaches a log line.
pub(crate) fn redact_identifiers(text: &str) -> String {
    let redacted = SSN.replace_all(text, "[SSN-REDACTED]");
    let redacted = BARE_ID.replace_all(&redacted, "[ID-REDACTED]");
    let redacted = PHONE.replace_all(&redacted, "[PHONE-REDACTED]");
    let redacted = EMAIL.replace_all(&redacted, "[EMAIL-REDACTED]");
    redacted.split_whitespace().collect::<Vec<_>>().join(" ")
}
