use once_cell::sync::Lazy;
use regex::Regex;

/// PII scrubber for SQL text headed to the query audit log.
///
/// ### WARNING
/// Regex-based and best-effort. It is defense-in-depth for log output, not a
/// guarantee; high-compliance deployments should disable literal logging
/// entirely.
static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());

static SSN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CREDIT_CARD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap());

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}").unwrap());

/// Replace recognizable PII literals with placeholder tags.
pub fn scrub(input: &str) -> String {
    let mut scrubbed = input.to_string();

    scrubbed = EMAIL_REGEX.replace_all(&scrubbed, "[EMAIL]").to_string();
    scrubbed = SSN_REGEX.replace_all(&scrubbed, "[SSN]").to_string();
    scrubbed = CREDIT_CARD_REGEX
        .replace_all(&scrubbed, "[CREDIT_CARD]")
        .to_string();
    scrubbed = PHONE_REGEX.replace_all(&scrubbed, "[PHONE]").to_string();

    scrubbed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_email_literal() {
        let input = "SELECT * FROM users WHERE email = 'ana@example.com'";
        let out = scrub(input);
        assert!(out.contains("[EMAIL]"));
        assert!(!out.contains("ana@example.com"));
    }

    #[test]
    fn test_scrub_ssn() {
        let out = scrub("WHERE ssn = '123-45-6789'");
        assert!(out.contains("[SSN]"));
    }

    #[test]
    fn test_plain_sql_untouched() {
        let input = "SELECT region, SUM(revenue) FROM orders GROUP BY region";
        assert_eq!(scrub(input), input);
    }
}
