use crate::query::select_endpoint;
use crate::{Db, EndpointRecord, SessionRow, StoreError};
use discovery_core::{now_ms, EndpointObservation};
use rusqlite::{params, ErrorCode};
use std::time::Duration;
use uuid::Uuid;

const BUSY_ATTEMPTS: u32 = 5;
const BUSY_BACKOFF_MS: u64 = 25;

impl Db {
    /// Inserts a new endpoint row or folds the observation into the
    /// existing one. First-observation fields (scheme, query params,
    /// request snapshot, auth fields, security level, discovered_at_ms)
    /// are never touched on conflict; the response snapshot, the three
    /// volatile flags, last_seen_ms and the counter are overwritten. The
    /// counter increments inside the single statement, so concurrent
    /// observers cannot lose counts.
    pub fn upsert_endpoint(&self, obs: &EndpointObservation) -> Result<EndpointRecord, StoreError> {
        validate(obs)?;
        let conn = self.conn.lock();
        with_busy_retry(|| {
            conn.execute(
                "INSERT INTO endpoints(path,method,host,port,scheme,query_params_json,request_headers_json,request_body_json,status_code,response_headers_json,response_body_json,auth_type,has_auth,security_level,contains_sensitive_data,potential_idor,missing_auth,discovered_at_ms,last_seen_ms,request_count)
                 VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,1)
                 ON CONFLICT(path,method,host,port) DO UPDATE SET
                   last_seen_ms=excluded.last_seen_ms,
                   request_count=request_count+1,
                   status_code=excluded.status_code,
                   response_headers_json=excluded.response_headers_json,
                   response_body_json=excluded.response_body_json,
                   contains_sensitive_data=excluded.contains_sensitive_data,
                   potential_idor=excluded.potential_idor,
                   missing_auth=excluded.missing_auth",
                params![
                    obs.path,
                    obs.method,
                    obs.host,
                    obs.port as i64,
                    obs.scheme,
                    obs.query_params.to_string(),
                    obs.request_headers.to_string(),
                    obs.request_body.to_string(),
                    obs.status_code as i64,
                    obs.response_headers.to_string(),
                    obs.response_body.to_string(),
                    obs.auth_type.as_str(),
                    obs.has_auth,
                    obs.security_level.as_str(),
                    obs.contains_sensitive_data,
                    obs.potential_idor,
                    obs.missing_auth,
                    obs.observed_at_ms,
                    obs.observed_at_ms,
                ],
            )
        })?;
        let record = select_endpoint(&conn, &obs.path, &obs.method, &obs.host, obs.port)?;
        Ok(record)
    }

    pub fn create_session(&self, name: &str, target_host: &str, target_port: u16) -> Result<SessionRow, StoreError> {
        let session_id = Uuid::now_v7().to_string();
        let started_at_ms = now_ms();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions(session_id,session_name,target_host,target_port,started_at_ms) VALUES (?,?,?,?,?)",
            params![session_id, name, target_host, target_port as i64, started_at_ms],
        )?;
        Ok(SessionRow {
            session_id,
            session_name: name.to_string(),
            target_host: target_host.to_string(),
            target_port,
            started_at_ms,
            finished_at_ms: None,
            total_requests: 0,
            unique_endpoints: 0,
            auth_endpoints: 0,
            sensitive_endpoints: 0,
            vulnerable_endpoints: 0,
        })
    }

    pub fn finish_session(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET finished_at_ms=? WHERE session_id=?",
            params![now_ms(), session_id],
        )?;
        Ok(())
    }

    /// Rewrites the session counters from the endpoint table. Counters are
    /// store-global, not scoped to the session.
    pub fn recompute_session_stats(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        with_busy_retry(|| {
            conn.execute(
                "UPDATE sessions SET
                   total_requests=(SELECT COALESCE(SUM(request_count),0) FROM endpoints),
                   unique_endpoints=(SELECT COUNT(*) FROM endpoints),
                   auth_endpoints=(SELECT COUNT(*) FROM endpoints WHERE has_auth=1),
                   sensitive_endpoints=(SELECT COUNT(*) FROM endpoints WHERE contains_sensitive_data=1),
                   vulnerable_endpoints=(SELECT COUNT(*) FROM endpoints WHERE potential_idor=1 OR missing_auth=1)
                 WHERE session_id=?",
                params![session_id],
            )
        })?;
        Ok(())
    }
}

fn validate(obs: &EndpointObservation) -> Result<(), StoreError> {
    if obs.path.trim().is_empty() {
        return Err(StoreError::Validation("empty path".into()));
    }
    if obs.method.trim().is_empty() {
        return Err(StoreError::Validation("empty method".into()));
    }
    if obs.host.trim().is_empty() {
        return Err(StoreError::Validation("empty host".into()));
    }
    if obs.port == 0 {
        return Err(StoreError::Validation("port 0".into()));
    }
    Ok(())
}

/// Retries SQLITE_BUSY/SQLITE_LOCKED with a linear backoff. Only relevant
/// when another process holds the database; within one process the
/// connection mutex already serializes statements.
fn with_busy_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T, StoreError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                if attempt >= BUSY_ATTEMPTS {
                    return Err(StoreError::Contention { attempts: attempt });
                }
                std::thread::sleep(Duration::from_millis(BUSY_BACKOFF_MS * u64::from(attempt)));
            }
            Err(e) => return Err(StoreError::Sqlite(e)),
        }
    }
}
