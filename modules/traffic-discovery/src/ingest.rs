use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::DiscoverySession;

/// One capture event from the proxy adapter, as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    Request {
        flow_id: String,
        url: String,
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
    Response {
        flow_id: String,
        status: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
}

/// Drains capture events into the session until the sender side closes.
/// A store failure on one flow is logged and skipped; the stream keeps
/// going. Returns how many responses ended up stored.
pub async fn run_ingest(session: Arc<DiscoverySession>, mut events: mpsc::Receiver<FlowEvent>) -> u64 {
    let mut discovered = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            FlowEvent::Request { flow_id, url, method, headers, body } => {
                session.request_observed(&flow_id, &url, &method, headers, body);
            }
            FlowEvent::Response { flow_id, status, headers, body } => {
                match session.response_observed(&flow_id, status, headers, body) {
                    Ok(Some(_)) => discovered += 1,
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(flow_id = %flow_id, error = %err, "failed to record endpoint");
                    }
                }
            }
        }
    }
    discovered
}
