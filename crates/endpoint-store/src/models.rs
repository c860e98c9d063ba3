use discovery_core::{AuthType, SecurityLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One deduplicated endpoint as persisted. Identity is
/// (path, method, host, port); everything else is observation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub endpoint_id: i64,
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
    pub discovered_at_ms: i64,
    pub last_seen_ms: i64,
    pub request_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub session_name: String,
    pub target_host: String,
    pub target_port: u16,
    pub started_at_ms: i64,
    pub finished_at_ms: Option<i64>,
    pub total_requests: i64,
    pub unique_endpoints: i64,
    pub auth_endpoints: i64,
    pub sensitive_endpoints: i64,
    pub vulnerable_endpoints: i64,
}

/// Conjunction of optional predicates for `list_endpoints`. `vulnerable`
/// means potential_idor OR missing_auth; false selects rows with neither.
#[derive(Debug, Default, Clone)]
pub struct EndpointFilter {
    pub method: Option<String>,
    pub security_level: Option<SecurityLevel>,
    pub has_auth: Option<bool>,
    pub sensitive_data: Option<bool>,
    pub vulnerable: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodCount {
    pub method: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelCount {
    pub level: SecurityLevel,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub total_endpoints: i64,
    pub unique_paths: i64,
    pub unique_methods: i64,
    pub auth_endpoints: i64,
    pub sensitive_endpoints: i64,
    pub idor_endpoints: i64,
    pub missing_auth_endpoints: i64,
    pub total_requests: i64,
    pub methods: Vec<MethodCount>,
    pub security_levels: Vec<LevelCount>,
    pub sessions: Vec<SessionRow>,
}

/// Self-describing export: when it was taken, the aggregate picture, and
/// every record in the canonical listing order.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub exported_at: String,
    pub summary: DiscoverySummary,
    pub endpoints: Vec<EndpointRecord>,
}
