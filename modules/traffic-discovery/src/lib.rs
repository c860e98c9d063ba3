//! Runs a discovery session: correlate captured traffic, classify each
//! completed exchange, and persist what was learned.

mod ingest;

pub use ingest::{run_ingest, FlowEvent};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use discovery_core::{DiscoveryConfig, RequestSnapshot, ResponseSnapshot};
use endpoint_classifier::{classify, SignalToggles};
use endpoint_store::{Db, EndpointRecord, SessionRow};
use flow_correlator::{CorrelatorLimits, FlowCorrelator, TargetFilter};

/// One discovery run against one target. The session owns the correlator;
/// the store is shared, so several sessions may write to the same database.
pub struct DiscoverySession {
    db: Arc<Db>,
    correlator: FlowCorrelator,
    toggles: SignalToggles,
    config: DiscoveryConfig,
    session: SessionRow,
}

impl DiscoverySession {
    pub fn begin(config: DiscoveryConfig, db: Arc<Db>) -> Result<Self> {
        let session =
            db.create_session(&config.session_name, &config.target_host, config.target_port)?;
        let correlator = FlowCorrelator::new(
            TargetFilter::new(config.target_host.clone(), config.target_port),
            CorrelatorLimits {
                max_pending: config.max_pending_flows,
                pending_ttl: Duration::from_secs(config.pending_ttl_secs),
            },
        );
        let toggles = SignalToggles {
            auth_patterns: config.detect_auth_patterns,
            sensitive_data: config.detect_sensitive_data,
            idor_patterns: config.detect_idor_patterns,
        };
        tracing::info!(
            session = %session.session_id,
            host = %config.target_host,
            port = config.target_port,
            "discovery session started"
        );
        Ok(Self { db, correlator, toggles, config, session })
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Feeds one intercepted request into the correlator. Capture limits
    /// are applied here, so nothing past this point ever sees headers or
    /// bodies the session was told not to keep.
    pub fn request_observed(
        &self,
        flow_id: &str,
        url: &str,
        method: &str,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) {
        let snapshot = RequestSnapshot {
            url: url.to_string(),
            method: method.to_string(),
            headers: self.capped_headers(headers),
            body: self.capped_body(body),
        };
        self.correlator.on_request(flow_id, snapshot);
    }

    /// Completes a flow and, when it pairs up, classifies and stores it.
    /// Returns the stored record, or None on a correlation miss.
    pub fn response_observed(
        &self,
        flow_id: &str,
        status: u16,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Result<Option<EndpointRecord>> {
        let snapshot = ResponseSnapshot {
            status,
            headers: self.capped_headers(headers),
            body: self.capped_body(body),
        };
        let Some(flow) = self.correlator.on_response(flow_id, snapshot) else {
            return Ok(None);
        };
        let observation = classify(&flow, &self.toggles);
        let record = self.db.upsert_endpoint(&observation)?;
        self.db.recompute_session_stats(&self.session.session_id)?;
        tracing::info!(
            method = %record.method,
            path = %record.path,
            level = %record.security_level,
            auth = %record.auth_type,
            sensitive = record.contains_sensitive_data,
            idor = record.potential_idor,
            missing_auth = record.missing_auth,
            count = record.request_count,
            "endpoint observed"
        );
        Ok(Some(record))
    }

    /// Closes the session row. Requests still pending in the correlator
    /// never completed and are simply dropped.
    pub fn finish(&self) -> Result<SessionRow> {
        self.db.recompute_session_stats(&self.session.session_id)?;
        self.db.finish_session(&self.session.session_id)?;
        tracing::info!(
            session = %self.session.session_id,
            unpaired = self.correlator.pending_len(),
            evicted = self.correlator.evicted_total(),
            "discovery session finished"
        );
        let row = self
            .db
            .get_session(&self.session.session_id)?
            .ok_or_else(|| anyhow::anyhow!("session row vanished: {}", self.session.session_id))?;
        Ok(row)
    }

    fn capped_headers(&self, headers: HashMap<String, String>) -> HashMap<String, String> {
        if self.config.capture_headers {
            headers
        } else {
            HashMap::new()
        }
    }

    fn capped_body(&self, body: Option<String>) -> Option<String> {
        if !self.config.capture_body {
            return None;
        }
        body.map(|b| truncate_body(b, self.config.max_body_size))
    }
}

/// Cuts a body at `max` bytes without splitting a UTF-8 character.
fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() <= max {
        return body;
    }
    let mut cut = max;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}
