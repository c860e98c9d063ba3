use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Discovery settings. The pipeline behaves the same whether this comes
/// from a YAML file, CLI flags, or embedding code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Host the discovery run is scoped to; traffic for other hosts is ignored.
    pub target_host: String,
    pub target_port: u16,
    /// Listen port of the intercepting proxy feeding the capture adapter.
    pub proxy_port: u16,
    pub session_name: String,
    pub db_path: PathBuf,
    pub capture_headers: bool,
    pub capture_body: bool,
    /// Captured bodies are truncated to this many bytes.
    pub max_body_size: usize,
    pub detect_sensitive_data: bool,
    pub detect_auth_patterns: bool,
    pub detect_idor_patterns: bool,
    pub max_pending_flows: usize,
    pub pending_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_host: "localhost".to_string(),
            target_port: 8000,
            proxy_port: 8080,
            session_name: "default".to_string(),
            db_path: PathBuf::from("discovery.db"),
            capture_headers: true,
            capture_body: true,
            max_body_size: 1024 * 1024,
            detect_sensitive_data: true,
            detect_auth_patterns: true,
            detect_idor_patterns: true,
            max_pending_flows: 4096,
            pending_ttl_secs: 120,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Option<DiscoveryConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("apimap.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&s).ok()
}
