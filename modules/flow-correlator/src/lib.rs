//! Pairs intercepted requests with their responses by flow id.
//!
//! The proxy adapter calls `on_request` when a request passes through and
//! `on_response` when its response arrives. Pending requests live in a
//! bounded map: entries past the TTL are swept on every insert, and when
//! the map is full the oldest pending entry is dropped to admit the new
//! one. A response that finds no pending request is a correlation miss and
//! produces nothing.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use discovery_core::{CorrelatedFlow, RequestSnapshot, ResponseSnapshot};
use parking_lot::Mutex;
use url::Url;

/// Host/port pair a discovery run is scoped to.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    pub host: String,
    pub port: u16,
}

impl TargetFilter {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// True when the URL addresses the configured target. Unparsable URLs
    /// never match.
    pub fn matches(&self, raw_url: &str) -> bool {
        let Ok(url) = Url::parse(raw_url) else {
            return false;
        };
        let host_ok = url
            .host_str()
            .map(|h| h.eq_ignore_ascii_case(&self.host))
            .unwrap_or(false);
        host_ok && url.port_or_known_default().unwrap_or(80) == self.port
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CorrelatorLimits {
    pub max_pending: usize,
    pub pending_ttl: Duration,
}

impl Default for CorrelatorLimits {
    fn default() -> Self {
        Self { max_pending: 4096, pending_ttl: Duration::from_secs(120) }
    }
}

struct PendingFlow {
    request: RequestSnapshot,
    inserted_at: Instant,
}

/// The insertion-order queue carries (id, inserted_at) so entries replaced
/// or already completed can be recognized as stale and skipped.
#[derive(Default)]
struct PendingMap {
    flows: HashMap<String, PendingFlow>,
    order: VecDeque<(String, Instant)>,
    evicted: u64,
}

pub struct FlowCorrelator {
    target: TargetFilter,
    limits: CorrelatorLimits,
    pending: Mutex<PendingMap>,
}

impl FlowCorrelator {
    pub fn new(target: TargetFilter, limits: CorrelatorLimits) -> Self {
        Self { target, limits, pending: Mutex::new(PendingMap::default()) }
    }

    /// Records a request for later pairing. Requests addressed to other
    /// hosts are dropped here, before anything downstream sees them.
    pub fn on_request(&self, flow_id: &str, request: RequestSnapshot) {
        if !self.target.matches(&request.url) {
            tracing::trace!(flow_id, url = %request.url, "request outside target, ignored");
            return;
        }
        let now = Instant::now();
        let mut pending = self.pending.lock();
        self.sweep_expired(&mut pending, now);
        if pending.flows.len() >= self.limits.max_pending && !pending.flows.contains_key(flow_id) {
            Self::evict_oldest(&mut pending);
        }
        pending.flows.insert(flow_id.to_string(), PendingFlow { request, inserted_at: now });
        pending.order.push_back((flow_id.to_string(), now));
    }

    /// Completes a pending flow. A response with no pending request returns
    /// None; nothing is buffered for it.
    pub fn on_response(&self, flow_id: &str, response: ResponseSnapshot) -> Option<CorrelatedFlow> {
        let mut pending = self.pending.lock();
        match pending.flows.remove(flow_id) {
            Some(entry) => Some(CorrelatedFlow { request: entry.request, response }),
            None => {
                tracing::debug!(flow_id, "response without pending request, dropped");
                None
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().flows.len()
    }

    /// Entries dropped by TTL or capacity since construction.
    pub fn evicted_total(&self) -> u64 {
        self.pending.lock().evicted
    }

    /// Drops every pending entry older than the TTL; returns how many went.
    pub fn evict_expired(&self) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.flows.len();
        self.sweep_expired(&mut pending, Instant::now());
        before - pending.flows.len()
    }

    fn sweep_expired(&self, pending: &mut PendingMap, now: Instant) {
        loop {
            let (expired, stale) = match pending.order.front() {
                None => break,
                Some((id, inserted_at)) => match pending.flows.get(id) {
                    Some(flow) if flow.inserted_at == *inserted_at => {
                        (now.duration_since(*inserted_at) >= self.limits.pending_ttl, false)
                    }
                    _ => (false, true),
                },
            };
            if stale {
                pending.order.pop_front();
                continue;
            }
            if !expired {
                break;
            }
            if let Some((id, _)) = pending.order.pop_front() {
                if pending.flows.remove(&id).is_some() {
                    pending.evicted += 1;
                    tracing::debug!(flow_id = %id, "pending request expired, evicted");
                }
            }
        }
    }

    fn evict_oldest(pending: &mut PendingMap) {
        while let Some((id, inserted_at)) = pending.order.pop_front() {
            let live = pending
                .flows
                .get(&id)
                .map(|flow| flow.inserted_at == inserted_at)
                .unwrap_or(false);
            if live {
                pending.flows.remove(&id);
                pending.evicted += 1;
                tracing::debug!(flow_id = %id, "pending map full, dropped oldest");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn target() -> TargetFilter {
        TargetFilter::new("localhost", 8000)
    }

    fn request(url: &str) -> RequestSnapshot {
        RequestSnapshot {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: Map::new(),
            body: None,
        }
    }

    fn response(status: u16) -> ResponseSnapshot {
        ResponseSnapshot { status, headers: Map::new(), body: None }
    }

    #[test]
    fn pairs_request_with_response() {
        let c = FlowCorrelator::new(target(), CorrelatorLimits::default());
        c.on_request("f1", request("http://localhost:8000/users/1"));
        let flow = c.on_response("f1", response(200)).unwrap();
        assert_eq!(flow.request.url, "http://localhost:8000/users/1");
        assert_eq!(flow.response.status, 200);
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn response_without_request_is_none() {
        let c = FlowCorrelator::new(target(), CorrelatorLimits::default());
        assert!(c.on_response("ghost", response(200)).is_none());
        // and the flow cannot be completed later either
        assert!(c.on_response("ghost", response(200)).is_none());
    }

    #[test]
    fn off_target_requests_are_dropped() {
        let c = FlowCorrelator::new(target(), CorrelatorLimits::default());
        c.on_request("f1", request("http://other.example.com/users/1"));
        c.on_request("f2", request("http://localhost:9999/users/1"));
        c.on_request("f3", request("not a url"));
        assert_eq!(c.pending_len(), 0);
        assert!(c.on_response("f1", response(200)).is_none());
    }

    #[test]
    fn target_matching_resolves_scheme_default_ports() {
        let t = TargetFilter::new("api.example.com", 443);
        assert!(t.matches("https://api.example.com/a"));
        assert!(t.matches("https://API.EXAMPLE.COM:443/a"));
        assert!(!t.matches("http://api.example.com/a"));
    }

    #[test]
    fn ttl_eviction_drops_old_entries() {
        let limits = CorrelatorLimits { max_pending: 16, pending_ttl: Duration::from_millis(5) };
        let c = FlowCorrelator::new(target(), limits);
        c.on_request("f1", request("http://localhost:8000/a"));
        std::thread::sleep(Duration::from_millis(10));
        c.on_request("f2", request("http://localhost:8000/b"));
        assert_eq!(c.pending_len(), 1);
        assert_eq!(c.evicted_total(), 1);
        assert!(c.on_response("f1", response(200)).is_none());
        assert!(c.on_response("f2", response(200)).is_some());
    }

    #[test]
    fn explicit_expiry_sweep() {
        let limits = CorrelatorLimits { max_pending: 16, pending_ttl: Duration::from_millis(5) };
        let c = FlowCorrelator::new(target(), limits);
        c.on_request("f1", request("http://localhost:8000/a"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(c.evict_expired(), 1);
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn capacity_eviction_drops_oldest() {
        let limits = CorrelatorLimits { max_pending: 2, pending_ttl: Duration::from_secs(60) };
        let c = FlowCorrelator::new(target(), limits);
        c.on_request("f1", request("http://localhost:8000/a"));
        c.on_request("f2", request("http://localhost:8000/b"));
        c.on_request("f3", request("http://localhost:8000/c"));
        assert_eq!(c.pending_len(), 2);
        assert_eq!(c.evicted_total(), 1);
        assert!(c.on_response("f1", response(200)).is_none());
        assert!(c.on_response("f2", response(200)).is_some());
        assert!(c.on_response("f3", response(200)).is_some());
    }

    #[test]
    fn repeated_flow_id_keeps_latest_request() {
        let c = FlowCorrelator::new(target(), CorrelatorLimits::default());
        c.on_request("f1", request("http://localhost:8000/old"));
        c.on_request("f1", request("http://localhost:8000/new"));
        assert_eq!(c.pending_len(), 1);
        let flow = c.on_response("f1", response(200)).unwrap();
        assert_eq!(flow.request.url, "http://localhost:8000/new");
        // the stale queue node for /old must not confuse later eviction
        c.on_request("f2", request("http://localhost:8000/b"));
        assert_eq!(c.pending_len(), 1);
    }
}
