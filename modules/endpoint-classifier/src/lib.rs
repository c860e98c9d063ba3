//! Turns one correlated exchange into a classified endpoint observation.
//!
//! Classification is pure and never fails: an unparsable URL degrades to the
//! raw input as path, a non-JSON body is kept as an opaque string, and the
//! signal heuristics simply do not fire on input they cannot read.

mod patterns;

use std::collections::HashMap;

use discovery_core::{now_ms, AuthType, CorrelatedFlow, EndpointObservation, SecurityLevel};
use serde_json::Value;
use url::Url;

/// Per-category detection switches. A disabled category forces its signal
/// to the negative value, and downstream rules see the forced value.
#[derive(Debug, Clone, Copy)]
pub struct SignalToggles {
    pub auth_patterns: bool,
    pub sensitive_data: bool,
    pub idor_patterns: bool,
}

impl Default for SignalToggles {
    fn default() -> Self {
        Self { auth_patterns: true, sensitive_data: true, idor_patterns: true }
    }
}

pub fn classify(flow: &CorrelatedFlow, toggles: &SignalToggles) -> EndpointObservation {
    let request = &flow.request;
    let response = &flow.response;

    let parts = UrlParts::parse(&request.url);
    let method = request.method.trim().to_uppercase();

    let request_body = decode_body(request.body.as_deref());
    let response_body = decode_body(response.body.as_deref());
    let request_headers = headers_to_value(&request.headers);
    let header_text = render_headers(&request.headers);

    let (auth_type, has_auth) = if toggles.auth_patterns {
        detect_auth(&header_text)
    } else {
        (AuthType::None, false)
    };
    let contains_sensitive_data = toggles.sensitive_data
        && detect_sensitive(&request_body, &response_body, &request_headers).is_some();
    let security_level = security_level(&parts.path, has_auth, contains_sensitive_data);
    let potential_idor = toggles.idor_patterns && detect_idor(&parts.path, &method);
    let missing_auth = detect_missing_auth(&parts.path, has_auth, security_level);

    EndpointObservation {
        path: parts.path,
        method,
        host: parts.host,
        port: parts.port,
        scheme: parts.scheme,
        query_params: parts.query,
        request_headers,
        request_body,
        status_code: response.status,
        response_headers: headers_to_value(&response.headers),
        response_body,
        auth_type,
        has_auth,
        security_level,
        contains_sensitive_data,
        potential_idor,
        missing_auth,
        observed_at_ms: now_ms(),
    }
}

struct UrlParts {
    host: String,
    port: u16,
    scheme: String,
    path: String,
    query: Value,
}

impl UrlParts {
    fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) => {
                let host = url.host_str().unwrap_or("localhost").to_string();
                let port = url.port_or_known_default().unwrap_or(80);
                Self {
                    host,
                    port,
                    scheme: url.scheme().to_string(),
                    path: url.path().to_string(),
                    query: collapse_query(&url),
                }
            }
            // Not a URL at all: keep the raw input as the path so the
            // observation still lands somewhere visible.
            Err(_) => Self {
                host: "localhost".to_string(),
                port: 80,
                scheme: "http".to_string(),
                path: raw.to_string(),
                query: Value::Object(serde_json::Map::new()),
            },
        }
    }
}

/// Single-occurrence keys collapse to a plain string, repeated keys keep a
/// list, in first-seen order.
fn collapse_query(url: &Url) -> Value {
    let mut params = serde_json::Map::new();
    for (key, value) in url.query_pairs() {
        match params.get_mut(key.as_ref()) {
            None => {
                params.insert(key.into_owned(), Value::String(value.into_owned()));
            }
            Some(Value::String(prev)) => {
                let first = std::mem::take(prev);
                params.insert(
                    key.into_owned(),
                    Value::Array(vec![Value::String(first), Value::String(value.into_owned())]),
                );
            }
            Some(Value::Array(list)) => list.push(Value::String(value.into_owned())),
            Some(_) => {}
        }
    }
    Value::Object(params)
}

fn decode_body(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) if text.is_empty() => Value::Null,
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

/// Headers rendered one `name: value` per line, names lowercased, sorted
/// for determinism. The auth regexes run over this form.
fn render_headers(headers: &HashMap<String, String>) -> String {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name.to_lowercase(), value))
        .collect();
    lines.sort();
    lines.join("\n")
}

fn headers_to_value(headers: &HashMap<String, String>) -> Value {
    let mut keys: Vec<&String> = headers.keys().collect();
    keys.sort();
    let mut map = serde_json::Map::new();
    for key in keys {
        map.insert(key.clone(), Value::String(headers[key].clone()));
    }
    Value::Object(map)
}

fn detect_auth(header_text: &str) -> (AuthType, bool) {
    for pattern in patterns::AUTH_PATTERNS.iter() {
        if pattern.regex.is_match(header_text) {
            return (pattern.auth_type, true);
        }
    }
    (AuthType::None, false)
}

/// Returns the name of the first sensitive pattern that fires, if any.
/// Headers are scanned in their dumped JSON form, the shape the quoted
/// field patterns expect, so a header literally named `token` still hits.
fn detect_sensitive(
    request_body: &Value,
    response_body: &Value,
    request_headers: &Value,
) -> Option<&'static str> {
    let mut haystack = String::new();
    append_value_text(&mut haystack, request_body);
    append_value_text(&mut haystack, response_body);
    append_value_text(&mut haystack, request_headers);
    patterns::SENSITIVE_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(&haystack))
        .map(|p| p.name)
}

fn append_value_text(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        other => {
            if let Ok(s) = serde_json::to_string(other) {
                out.push_str(&s);
                out.push('\n');
            }
        }
    }
}

/// Ordered cascade, first rule wins.
fn security_level(path: &str, has_auth: bool, sensitive: bool) -> SecurityLevel {
    let path = path.to_lowercase();
    if patterns::ADMIN_PATHS.iter().any(|p| path.contains(p)) {
        return SecurityLevel::Critical;
    }
    if patterns::INTERNAL_PATHS.iter().any(|p| path.contains(p)) {
        return SecurityLevel::Critical;
    }
    // Exact match only: /users/1 is user data (medium), a bare /users is
    // a collection root and rates high.
    if patterns::SENSITIVE_PATH_KEYWORDS.iter().any(|p| path == *p) {
        return SecurityLevel::High;
    }
    if patterns::USER_DATA_PATHS.iter().any(|p| path.contains(p)) {
        return SecurityLevel::Medium;
    }
    if has_auth {
        return SecurityLevel::Medium;
    }
    if sensitive {
        return SecurityLevel::High;
    }
    SecurityLevel::Low
}

/// Deliberately over-triggering read-side heuristic; GET only.
fn detect_idor(path: &str, method: &str) -> bool {
    if method != "GET" {
        return false;
    }
    if patterns::IDOR_PATH_PATTERNS.iter().any(|p| p.is_match(path)) {
        return true;
    }
    patterns::NUMERIC_SEGMENT.is_match(path)
}

fn detect_missing_auth(path: &str, has_auth: bool, level: SecurityLevel) -> bool {
    if has_auth {
        return false;
    }
    if matches!(level, SecurityLevel::High | SecurityLevel::Critical) {
        return true;
    }
    let path = path.to_lowercase();
    patterns::UNAUTH_FLAGGED_PATHS.iter().any(|p| path.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::{RequestSnapshot, ResponseSnapshot};

    fn flow(url: &str, method: &str) -> CorrelatedFlow {
        CorrelatedFlow {
            request: RequestSnapshot {
                url: url.to_string(),
                method: method.to_string(),
                headers: HashMap::new(),
                body: None,
            },
            response: ResponseSnapshot { status: 200, headers: HashMap::new(), body: None },
        }
    }

    fn with_header(mut f: CorrelatedFlow, name: &str, value: &str) -> CorrelatedFlow {
        f.request.headers.insert(name.to_string(), value.to_string());
        f
    }

    fn all_on() -> SignalToggles {
        SignalToggles::default()
    }

    #[test]
    fn admin_path_is_critical_even_with_auth() {
        let f = with_header(flow("http://localhost:8000/admin/users", "GET"), "Authorization", "Bearer abc123");
        let obs = classify(&f, &all_on());
        assert_eq!(obs.security_level, SecurityLevel::Critical);
        assert_eq!(obs.auth_type, AuthType::Bearer);
        assert!(!obs.missing_auth);
    }

    #[test]
    fn user_resource_is_medium_not_high() {
        let obs = classify(&flow("http://localhost:8000/users/1", "GET"), &all_on());
        assert_eq!(obs.security_level, SecurityLevel::Medium);
        assert_eq!(obs.path, "/users/1");
    }

    #[test]
    fn exact_keyword_path_is_high() {
        let obs = classify(&flow("http://localhost:8000/config", "GET"), &all_on());
        assert_eq!(obs.security_level, SecurityLevel::High);
        assert!(obs.missing_auth);
    }

    #[test]
    fn auth_alone_is_medium() {
        let f = with_header(flow("http://localhost:8000/items", "GET"), "Authorization", "Bearer tok9.x");
        let obs = classify(&f, &all_on());
        assert_eq!(obs.security_level, SecurityLevel::Medium);
        assert!(obs.has_auth);
    }

    #[test]
    fn sensitive_body_alone_is_high() {
        let mut f = flow("http://localhost:8000/search", "POST");
        f.response.body = Some(r#"{"owner": "alice@example.com"}"#.to_string());
        let obs = classify(&f, &all_on());
        assert!(obs.contains_sensitive_data);
        assert_eq!(obs.security_level, SecurityLevel::High);
    }

    #[test]
    fn plain_path_is_low() {
        let obs = classify(&flow("http://localhost:8000/health", "GET"), &all_on());
        assert_eq!(obs.security_level, SecurityLevel::Low);
        assert!(!obs.missing_auth);
        assert!(!obs.potential_idor);
    }

    #[test]
    fn idor_fires_only_for_get() {
        let get = classify(&flow("http://localhost:8000/orders/42", "GET"), &all_on());
        assert!(get.potential_idor);
        let post = classify(&flow("http://localhost:8000/orders/42", "POST"), &all_on());
        assert!(!post.potential_idor);
    }

    #[test]
    fn idor_fires_on_bare_numeric_segment() {
        let obs = classify(&flow("http://localhost:8000/items/99", "GET"), &all_on());
        assert!(obs.potential_idor);
        let obs = classify(&flow("http://localhost:8000/items/latest", "GET"), &all_on());
        assert!(!obs.potential_idor);
    }

    #[test]
    fn auth_detection_order_prefers_bearer() {
        let f = with_header(
            with_header(flow("http://localhost:8000/x", "GET"), "Cookie", "sid=1"),
            "Authorization",
            "Bearer abc.def",
        );
        assert_eq!(classify(&f, &all_on()).auth_type, AuthType::Bearer);
    }

    #[test]
    fn api_key_basic_and_cookie_detected() {
        let f = with_header(flow("http://localhost:8000/x", "GET"), "X-Api-Key", "k-123");
        assert_eq!(classify(&f, &all_on()).auth_type, AuthType::ApiKey);
        let f = with_header(flow("http://localhost:8000/x", "GET"), "Authorization", "Basic dXNlcjpwYXNz");
        assert_eq!(classify(&f, &all_on()).auth_type, AuthType::Basic);
        let f = with_header(flow("http://localhost:8000/x", "GET"), "Cookie", "session=deadbeef");
        assert_eq!(classify(&f, &all_on()).auth_type, AuthType::Cookie);
        assert_eq!(classify(&flow("http://localhost:8000/x", "GET"), &all_on()).auth_type, AuthType::None);
    }

    #[test]
    fn missing_auth_on_flagged_prefix_without_credentials() {
        let obs = classify(&flow("http://localhost:8000/users/1", "GET"), &all_on());
        assert!(obs.missing_auth);
        let f = with_header(flow("http://localhost:8000/users/1", "GET"), "Authorization", "Bearer t1");
        assert!(!classify(&f, &all_on()).missing_auth);
    }

    #[test]
    fn unparsable_url_degrades_to_raw_path() {
        let obs = classify(&flow("not a url at all", "GET"), &all_on());
        assert_eq!(obs.path, "not a url at all");
        assert_eq!(obs.host, "localhost");
        assert_eq!(obs.port, 80);
        assert_eq!(obs.scheme, "http");
    }

    #[test]
    fn scheme_default_port_resolved() {
        let obs = classify(&flow("https://api.example.com/items", "GET"), &all_on());
        assert_eq!(obs.port, 443);
        assert_eq!(obs.scheme, "https");
        assert_eq!(obs.host, "api.example.com");
    }

    #[test]
    fn query_params_collapse_singletons() {
        let obs = classify(&flow("http://localhost:8000/search?q=rust&tag=a&tag=b", "GET"), &all_on());
        assert_eq!(obs.query_params["q"], Value::String("rust".into()));
        assert_eq!(
            obs.query_params["tag"],
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn blank_valued_query_params_are_kept() {
        let obs = classify(&flow("http://localhost:8000/search?q=&flag", "GET"), &all_on());
        assert_eq!(obs.query_params["q"], Value::String(String::new()));
        assert_eq!(obs.query_params["flag"], Value::String(String::new()));
    }

    #[test]
    fn non_json_body_kept_as_opaque_string() {
        let mut f = flow("http://localhost:8000/upload", "POST");
        f.request.body = Some("plain text payload".to_string());
        let obs = classify(&f, &all_on());
        assert_eq!(obs.request_body, Value::String("plain text payload".into()));
        let mut f = flow("http://localhost:8000/upload", "POST");
        f.request.body = Some(r#"{"k": 1}"#.to_string());
        assert_eq!(classify(&f, &all_on()).request_body["k"], Value::from(1));
    }

    #[test]
    fn empty_body_is_null() {
        let mut f = flow("http://localhost:8000/ping", "GET");
        f.request.body = Some(String::new());
        let obs = classify(&f, &all_on());
        assert_eq!(obs.request_body, Value::Null);
        assert_eq!(obs.response_body, Value::Null);
    }

    #[test]
    fn disabled_toggles_force_negative_signals() {
        let off = SignalToggles { auth_patterns: false, sensitive_data: false, idor_patterns: false };
        let mut f = with_header(flow("http://localhost:8000/orders/42", "GET"), "Authorization", "Bearer abc");
        f.response.body = Some(r#"{"email": "bob@example.com"}"#.to_string());
        let obs = classify(&f, &off);
        assert_eq!(obs.auth_type, AuthType::None);
        assert!(!obs.has_auth);
        assert!(!obs.contains_sensitive_data);
        assert!(!obs.potential_idor);
        // with auth forced off the path still reads as unauthenticated
        assert!(!obs.missing_auth);
        assert_eq!(obs.security_level, SecurityLevel::Low);
    }

    #[test]
    fn method_is_normalized_uppercase() {
        let obs = classify(&flow("http://localhost:8000/items", "get"), &all_on());
        assert_eq!(obs.method, "GET");
    }

    #[test]
    fn bearer_header_counts_as_sensitive_token() {
        let f = with_header(flow("http://localhost:8000/items", "GET"), "Authorization", "Bearer secret.token");
        let obs = classify(&f, &all_on());
        assert!(obs.contains_sensitive_data);
    }

    #[test]
    fn first_matching_sensitive_pattern_is_named() {
        let hit = detect_sensitive(
            &Value::String("reach me at alice@example.com".into()),
            &Value::Null,
            &Value::Null,
        );
        assert_eq!(hit, Some("email"));
        assert_eq!(detect_sensitive(&Value::Null, &Value::Null, &Value::Null), None);
    }

    #[test]
    fn credential_named_headers_are_sensitive() {
        // the quoted field patterns only see headers in their JSON form
        let f = with_header(flow("http://localhost:8000/items", "GET"), "Token", "abc123");
        let obs = classify(&f, &all_on());
        assert!(obs.contains_sensitive_data);
        assert_eq!(obs.auth_type, AuthType::None);
        assert_eq!(obs.security_level, SecurityLevel::High);
    }
}
