use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Request half of an intercepted exchange, captured when the proxy sees
/// the request go out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Response half, attached when the matching response arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// A completed request/response pair, ready for classification.
#[derive(Debug, Clone)]
pub struct CorrelatedFlow {
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    Bearer,
    ApiKey,
    Basic,
    Cookie,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::ApiKey => "api_key",
            AuthType::Basic => "basic",
            AuthType::Cookie => "cookie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(AuthType::None),
            "bearer" => Some(AuthType::Bearer),
            "api_key" => Some(AuthType::ApiKey),
            "basic" => Some(AuthType::Basic),
            "cookie" => Some(AuthType::Cookie),
            _ => None,
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(SecurityLevel::Low),
            "medium" => Some(SecurityLevel::Medium),
            "high" => Some(SecurityLevel::High),
            "critical" => Some(SecurityLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the classifier derived from one correlated flow. This is the
/// unit the store deduplicates on (path, method, host, port).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointObservation {
    pub path: String,
    pub method: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub query_params: Value,
    pub request_headers: Value,
    pub request_body: Value,
    pub status_code: u16,
    pub response_headers: Value,
    pub response_body: Value,
    pub auth_type: AuthType,
    pub has_auth: bool,
    pub security_level: SecurityLevel,
    pub contains_sensitive_data: bool,
    pub potential_idor: bool,
    pub missing_auth: bool,
    pub observed_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_type_round_trips() {
        for t in [AuthType::None, AuthType::Bearer, AuthType::ApiKey, AuthType::Basic, AuthType::Cookie] {
            assert_eq!(AuthType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AuthType::parse("oauth"), None);
    }

    #[test]
    fn security_level_round_trips() {
        for l in [SecurityLevel::Low, SecurityLevel::Medium, SecurityLevel::High, SecurityLevel::Critical] {
            assert_eq!(SecurityLevel::parse(l.as_str()), Some(l));
        }
        assert_eq!(SecurityLevel::parse("severe"), None);
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&AuthType::ApiKey).unwrap(), "\"api_key\"");
        assert_eq!(serde_json::to_string(&SecurityLevel::Critical).unwrap(), "\"critical\"");
    }
}
