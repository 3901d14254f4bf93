//! Log-safe rendering of compiled SQL.
//!
//! Filter values are embedded in compiled SQL when inline binding is used, so
//! query logs mask string and numeric literals unless literal logging is
//! enabled. PII patterns are scrubbed in both modes. Regex-based, best effort.

use once_cell::sync::Lazy;
use regex::Regex;

static STRING_LITERAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());

// Numbers that follow a comparison operator, IN list separator or LIKE.
static NUMERIC_LITERAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<op>(?:[=<>(,]|\bLIKE)\s*)-?\d+(?:\.\d+)?\b").unwrap());

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());

static SSN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CREDIT_CARD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap());

/// Replaces PII-looking substrings.
pub fn scrub(input: &str) -> String {
    let scrubbed = EMAIL_REGEX.replace_all(input, "[EMAIL]");
    let scrubbed = SSN_REGEX.replace_all(&scrubbed, "[SSN]");
    CREDIT_CARD_REGEX
        .replace_all(&scrubbed, "[CREDIT_CARD]")
        .into_owned()
}

/// Renders SQL for a log line. Literals become `?` unless `log_literals` is set.
pub fn scrub_sql(sql: &str, log_literals: bool) -> String {
    if log_literals {
        return scrub(sql);
    }
    let masked = STRING_LITERAL_REGEX.replace_all(sql, "'?'");
    NUMERIC_LITERAL_REGEX
        .replace_all(&masked, "${op}?")
        .into_owned()
}
