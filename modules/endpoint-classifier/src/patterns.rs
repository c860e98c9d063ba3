//! Detection tables. Adding a pattern here is the whole change; the
//! classifier only iterates these.

use discovery_core::AuthType;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matched against the request headers rendered as `name: value` lines,
/// first hit wins.
pub(crate) struct AuthPattern {
    pub auth_type: AuthType,
    pub regex: Regex,
}

pub(crate) static AUTH_PATTERNS: Lazy<Vec<AuthPattern>> = Lazy::new(|| {
    [
        (AuthType::Bearer, r"(?i)bearer\s+[a-z0-9\-._~+/]+=*"),
        (AuthType::ApiKey, r"(?i)x-api-key\s*:\s*\S+"),
        (AuthType::Basic, r"(?i)basic\s+[a-z0-9+/]+=*"),
        (AuthType::Cookie, r"(?i)cookie\s*:\s*[^;\n]+"),
    ]
    .into_iter()
    .map(|(auth_type, pattern)| AuthPattern { auth_type, regex: Regex::new(pattern).unwrap() })
    .collect()
});

/// Matched against the dumped request/response bodies and the dumped
/// request header map.
pub(crate) struct SensitivePattern {
    pub name: &'static str,
    pub regex: Regex,
}

pub(crate) static SENSITIVE_PATTERNS: Lazy<Vec<SensitivePattern>> = Lazy::new(|| {
    [
        ("email", r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b"),
        ("phone", r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("credit_card", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
        ("password", r#"(?i)"password"\s*:\s*"[^"]*""#),
        ("token", r#"(?i)"token"\s*:\s*"[^"]*""#),
        ("api_key", r#"(?i)"api_key"\s*:\s*"[^"]*""#),
        ("authorization", r"(?i)bearer\s+[a-z0-9\-._~+/]+=*"),
    ]
    .into_iter()
    .map(|(name, pattern)| SensitivePattern { name, regex: Regex::new(pattern).unwrap() })
    .collect()
});

/// Resource shapes that commonly expose object references by id.
pub(crate) static IDOR_PATH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)/users/\d+",
        r"(?i)/profiles/\d+",
        r"(?i)/accounts/\d+",
        r"(?i)/orders/\d+",
        r"(?i)/data/\d+",
        r"(?i)/api/\w+/\d+",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

pub(crate) static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+").unwrap());

/// Paths that are high risk on their own (exact path match).
pub(crate) const SENSITIVE_PATH_KEYWORDS: &[&str] = &[
    "/admin", "/internal", "/debug", "/config", "/settings",
    "/users", "/profiles", "/accounts", "/payment", "/billing",
];

pub(crate) const ADMIN_PATHS: &[&str] = &["/admin"];
pub(crate) const INTERNAL_PATHS: &[&str] = &["/debug", "/internal"];
pub(crate) const USER_DATA_PATHS: &[&str] = &["/users", "/profiles"];

/// Unauthenticated requests under these prefixes get the missing-auth flag.
pub(crate) const UNAUTH_FLAGGED_PATHS: &[&str] = &["/admin", "/internal", "/debug", "/users", "/profiles"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_compile() {
        assert_eq!(AUTH_PATTERNS.len(), 4);
        assert_eq!(SENSITIVE_PATTERNS.len(), 8);
        assert_eq!(IDOR_PATH_PATTERNS.len(), 6);
        assert!(NUMERIC_SEGMENT.is_match("/users/1"));
    }

    #[test]
    fn sensitive_table_hits() {
        let hits = |s: &str| SENSITIVE_PATTERNS.iter().filter(|p| p.regex.is_match(s)).count();
        assert!(hits("contact: alice@example.com") >= 1);
        assert!(hits("ssn 123-45-6789") >= 1);
        assert!(hits(r#"{"password": "hunter2"}"#) >= 1);
        assert_eq!(hits("nothing to see"), 0);
    }
}
