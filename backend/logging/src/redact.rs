//! Log Redaction Layer
//!
//! Scrubs secrets from dev scripts, URLs, and error strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

/// `API_TOKEN=abc` style assignments in shell scripts.
static SECRET_ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z0-9_]*(?:TOKEN|SECRET|PASSWORD|API_?KEY)[A-Z0-9_]*)=(\S+)").unwrap()
});
/// `?token=abc` / `&key=abc` query parameters.
static SECRET_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:token|key|secret|password|auth)=)[^&\s]+").unwrap()
});
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = SECRET_ASSIGNMENT_RE.replace_all(input, "$1=[REDACTED]");
    let redacted = SECRET_QUERY_RE.replace_all(&redacted, "${1}[REDACTED]");
    BEARER_RE.replace_all(&redacted, "Bearer [REDACTED]").into_owned()
}
