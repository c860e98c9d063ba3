use crate::models::{
    DiscoverySummary, EndpointFilter, EndpointRecord, ExportDocument, LevelCount, MethodCount,
    SessionRow,
};
use crate::{Db, StoreError};
use discovery_core::{now_rfc3339, AuthType, SecurityLevel};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use serde_json::Value;

const ENDPOINT_COLUMNS: &str = "endpoint_id,path,method,host,port,scheme,query_params_json,request_headers_json,request_body_json,status_code,response_headers_json,response_body_json,auth_type,has_auth,security_level,contains_sensitive_data,potential_idor,missing_auth,discovered_at_ms,last_seen_ms,request_count";

/// Stable listing order: busiest endpoints first, newest discoveries
/// breaking ties, then lexical path/method so output never shuffles
/// between runs.
const ENDPOINT_ORDER: &str =
    "ORDER BY request_count DESC, discovered_at_ms DESC, path ASC, method ASC";

impl Db {
    pub fn list_endpoints(&self, filter: &EndpointFilter) -> Result<Vec<EndpointRecord>, StoreError> {
        let mut clauses: Vec<&'static str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(method) = &filter.method {
            clauses.push("method = ?");
            args.push(Box::new(method.to_uppercase()));
        }
        if let Some(level) = filter.security_level {
            clauses.push("security_level = ?");
            args.push(Box::new(level.as_str().to_string()));
        }
        if let Some(has_auth) = filter.has_auth {
            clauses.push("has_auth = ?");
            args.push(Box::new(has_auth));
        }
        if let Some(sensitive) = filter.sensitive_data {
            clauses.push("contains_sensitive_data = ?");
            args.push(Box::new(sensitive));
        }
        match filter.vulnerable {
            Some(true) => clauses.push("(potential_idor = 1 OR missing_auth = 1)"),
            Some(false) => clauses.push("potential_idor = 0 AND missing_auth = 0"),
            None => {}
        }
        let mut sql = format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push(' ');
        sql.push_str(ENDPOINT_ORDER);
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), map_endpoint_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Looks up one endpoint by path and method. When the same path/method
    /// was seen on several hosts or ports, the lowest host/port pair wins.
    pub fn endpoint_details(&self, path: &str, method: &str) -> Result<Option<EndpointRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE path = ? AND method = ? ORDER BY host ASC, port ASC LIMIT 1"
                ),
                params![path, method.to_uppercase()],
                map_endpoint_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn summary(&self) -> Result<DiscoverySummary, StoreError> {
        let conn = self.conn.lock();
        let (
            total_endpoints,
            unique_paths,
            unique_methods,
            auth_endpoints,
            sensitive_endpoints,
            idor_endpoints,
            missing_auth_endpoints,
            total_requests,
        ) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT path),
                    COUNT(DISTINCT method),
                    COALESCE(SUM(has_auth),0),
                    COALESCE(SUM(contains_sensitive_data),0),
                    COALESCE(SUM(potential_idor),0),
                    COALESCE(SUM(missing_auth),0),
                    COALESCE(SUM(request_count),0)
             FROM endpoints",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT method, COUNT(*) FROM endpoints GROUP BY method ORDER BY COUNT(*) DESC, method ASC",
        )?;
        let methods = stmt
            .query_map([], |row| {
                Ok(MethodCount { method: row.get(0)?, count: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT security_level, COUNT(*) FROM endpoints GROUP BY security_level ORDER BY COUNT(*) DESC, security_level ASC",
        )?;
        let security_levels = stmt
            .query_map([], |row| {
                let level: String = row.get(0)?;
                Ok(LevelCount {
                    level: SecurityLevel::parse(&level).unwrap_or(SecurityLevel::Low),
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let sessions = list_sessions_on(&conn)?;

        Ok(DiscoverySummary {
            total_endpoints,
            unique_paths,
            unique_methods,
            auth_endpoints,
            sensitive_endpoints,
            idor_endpoints,
            missing_auth_endpoints,
            total_requests,
            methods,
            security_levels,
            sessions,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?"),
                params![session_id],
                map_session_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRow>, StoreError> {
        let conn = self.conn.lock();
        list_sessions_on(&conn)
    }

    /// Everything the store knows, as one serializable document.
    pub fn export_all(&self) -> Result<ExportDocument, StoreError> {
        Ok(ExportDocument {
            exported_at: now_rfc3339(),
            summary: self.summary()?,
            endpoints: self.list_endpoints(&EndpointFilter::default())?,
        })
    }
}

const SESSION_COLUMNS: &str = "session_id,session_name,target_host,target_port,started_at_ms,finished_at_ms,total_requests,unique_endpoints,auth_endpoints,sensitive_endpoints,vulnerable_endpoints";

pub(crate) fn select_endpoint(
    conn: &Connection,
    path: &str,
    method: &str,
    host: &str,
    port: u16,
) -> rusqlite::Result<EndpointRecord> {
    conn.query_row(
        &format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE path = ? AND method = ? AND host = ? AND port = ?"
        ),
        params![path, method, host, port as i64],
        map_endpoint_row,
    )
}

fn list_sessions_on(conn: &Connection) -> Result<Vec<SessionRow>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at_ms DESC"
    ))?;
    let rows = stmt
        .query_map([], map_session_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn map_endpoint_row(row: &Row<'_>) -> rusqlite::Result<EndpointRecord> {
    let auth_type: String = row.get(12)?;
    let security_level: String = row.get(14)?;
    Ok(EndpointRecord {
        endpoint_id: row.get(0)?,
        path: row.get(1)?,
        method: row.get(2)?,
        host: row.get(3)?,
        port: row.get::<_, i64>(4)? as u16,
        scheme: row.get(5)?,
        query_params: json_column(row.get(6)?),
        request_headers: json_column(row.get(7)?),
        request_body: json_column(row.get(8)?),
        status_code: row.get::<_, i64>(9)? as u16,
        response_headers: json_column(row.get(10)?),
        response_body: json_column(row.get(11)?),
        auth_type: AuthType::parse(&auth_type).unwrap_or(AuthType::None),
        has_auth: row.get(13)?,
        security_level: SecurityLevel::parse(&security_level).unwrap_or(SecurityLevel::Low),
        contains_sensitive_data: row.get(15)?,
        potential_idor: row.get(16)?,
        missing_auth: row.get(17)?,
        discovered_at_ms: row.get(18)?,
        last_seen_ms: row.get(19)?,
        request_count: row.get(20)?,
    })
}

fn map_session_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        session_name: row.get(1)?,
        target_host: row.get(2)?,
        target_port: row.get::<_, i64>(3)? as u16,
        started_at_ms: row.get(4)?,
        finished_at_ms: row.get(5)?,
        total_requests: row.get(6)?,
        unique_endpoints: row.get(7)?,
        auth_endpoints: row.get(8)?,
        sensitive_endpoints: row.get(9)?,
        vulnerable_endpoints: row.get(10)?,
    })
}

fn json_column(raw: Option<String>) -> Value {
    match raw {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::Null),
        None => Value::Null,
    }
}
