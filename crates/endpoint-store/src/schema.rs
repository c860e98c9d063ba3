pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE endpoints (
  endpoint_id              INTEGER PRIMARY KEY AUTOINCREMENT,
  path                     TEXT NOT NULL,
  method                   TEXT NOT NULL,
  host                     TEXT NOT NULL,
  port                     INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
  scheme                   TEXT NOT NULL DEFAULT 'http',
  query_params_json        TEXT,
  request_headers_json     TEXT,
  request_body_json        TEXT,
  status_code              INTEGER NOT NULL,
  response_headers_json    TEXT,
  response_body_json       TEXT,
  auth_type                TEXT NOT NULL CHECK (auth_type IN ('none','bearer','api_key','basic','cookie')),
  has_auth                 INTEGER NOT NULL CHECK (has_auth IN (0,1)) DEFAULT 0,
  security_level           TEXT NOT NULL CHECK (security_level IN ('low','medium','high','critical')),
  contains_sensitive_data  INTEGER NOT NULL CHECK (contains_sensitive_data IN (0,1)) DEFAULT 0,
  potential_idor           INTEGER NOT NULL CHECK (potential_idor IN (0,1)) DEFAULT 0,
  missing_auth             INTEGER NOT NULL CHECK (missing_auth IN (0,1)) DEFAULT 0,
  discovered_at_ms         INTEGER NOT NULL,
  last_seen_ms             INTEGER NOT NULL,
  request_count            INTEGER NOT NULL DEFAULT 1,
  UNIQUE (path, method, host, port)
);

CREATE TABLE sessions (
  session_id            TEXT PRIMARY KEY,
  session_name          TEXT NOT NULL,
  target_host           TEXT NOT NULL,
  target_port           INTEGER NOT NULL,
  started_at_ms         INTEGER NOT NULL,
  finished_at_ms        INTEGER,
  total_requests        INTEGER NOT NULL DEFAULT 0,
  unique_endpoints      INTEGER NOT NULL DEFAULT 0,
  auth_endpoints        INTEGER NOT NULL DEFAULT 0,
  sensitive_endpoints   INTEGER NOT NULL DEFAULT 0,
  vulnerable_endpoints  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_endpoints_lookup ON endpoints(path, method);
CREATE INDEX idx_endpoints_level ON endpoints(security_level);
CREATE INDEX idx_sessions_started ON sessions(started_at_ms);

COMMIT;
"#
;
