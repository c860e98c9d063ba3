use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use discovery_core::{load_config, SecurityLevel};
use endpoint_store::{Db, EndpointFilter};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use traffic_discovery::{run_ingest, DiscoverySession, FlowEvent};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "apimap", version, about = "API endpoint discovery from intercepted traffic")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./apimap.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Endpoint database (overrides config; default: discovery.db)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// List discovered endpoints
    List {
        /// Filter by HTTP method (case-insensitive)
        #[arg(long)]
        method: Option<String>,
        /// Filter by security level
        #[arg(long, value_parser = ["low", "medium", "high", "critical"])]
        security_level: Option<String>,
        /// Only endpoints observed with credentials
        #[arg(long, default_value_t = false, conflicts_with = "no_auth")]
        auth: bool,
        /// Only endpoints observed without credentials
        #[arg(long, default_value_t = false)]
        no_auth: bool,
        /// Only endpoints with sensitive data in request or response
        #[arg(long, default_value_t = false)]
        sensitive: bool,
        /// Only endpoints flagged potential-IDOR or missing-auth
        #[arg(long, default_value_t = false)]
        vulnerable: bool,
        /// Print full records instead of one-line summaries
        #[arg(long, default_value_t = false)]
        details: bool,
        /// Maximum rows to print
        #[arg(long)]
        limit: Option<usize>,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Discovery totals, method and security-level breakdowns, sessions
    Summary {
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Full record for one endpoint
    Details {
        /// Endpoint path, e.g. /users/1
        path: String,
        /// HTTP method, e.g. GET
        method: String,
    },
    /// Dump everything the store knows
    Export {
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Write flattened CSV of endpoint rows instead of JSON (requires --output)
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Replay a captured event stream through a discovery session
    Replay {
        /// JSONL file of capture events (blanks and # comments skipped)
        #[arg(long, value_name = "FILE")]
        events: PathBuf,
        /// Target host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Target port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Session name (overrides config)
        #[arg(long)]
        session: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).unwrap_or_default();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    match cli.command {
        Commands::Version => {
            println!("apimap {} (core {})", env!("CARGO_PKG_VERSION"), discovery_core::version());
        }
        Commands::List {
            method,
            security_level,
            auth,
            no_auth,
            sensitive,
            vulnerable,
            details,
            limit,
            format,
        } => {
            let db = Db::open_or_create(&config.db_path)?;
            let filter = EndpointFilter {
                method,
                security_level: security_level.as_deref().and_then(SecurityLevel::parse),
                has_auth: if auth { Some(true) } else if no_auth { Some(false) } else { None },
                sensitive_data: sensitive.then_some(true),
                vulnerable: vulnerable.then_some(true),
                limit,
            };
            let rows = db.list_endpoints(&filter)?;
            match format {
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("no endpoints recorded");
                    }
                    for r in &rows {
                        if details {
                            println!("{}", serde_json::to_string_pretty(r)?);
                        } else {
                            let mut flags = String::new();
                            if r.contains_sensitive_data { flags.push_str(" sensitive"); }
                            if r.potential_idor { flags.push_str(" idor"); }
                            if r.missing_auth { flags.push_str(" missing-auth"); }
                            println!(
                                "{} {} {} auth={} level={} seen={}{}",
                                r.method, r.path, r.status_code, r.auth_type, r.security_level,
                                r.request_count, flags
                            );
                        }
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Jsonl => {
                    for r in &rows {
                        println!("{}", serde_json::to_string(r)?);
                    }
                }
            }
        }
        Commands::Summary { format } => {
            let db = Db::open_or_create(&config.db_path)?;
            let s = db.summary()?;
            match format {
                OutputFormat::Text => {
                    println!(
                        "endpoints: {} ({} paths, {} methods, {} requests)",
                        s.total_endpoints, s.unique_paths, s.unique_methods, s.total_requests
                    );
                    println!(
                        "signals: auth={} sensitive={} idor={} missing-auth={}",
                        s.auth_endpoints, s.sensitive_endpoints, s.idor_endpoints,
                        s.missing_auth_endpoints
                    );
                    if !s.methods.is_empty() {
                        println!("methods:");
                        for m in &s.methods { println!("  {:<8} {}", m.method, m.count); }
                    }
                    if !s.security_levels.is_empty() {
                        println!("levels:");
                        for l in &s.security_levels { println!("  {:<8} {}", l.level, l.count); }
                    }
                    if !s.sessions.is_empty() {
                        println!("sessions:");
                        for sess in &s.sessions {
                            let state = if sess.finished_at_ms.is_some() { "finished" } else { "running" };
                            println!(
                                "  {} {} {}:{} endpoints={} requests={} ({})",
                                sess.session_id, sess.session_name, sess.target_host,
                                sess.target_port, sess.unique_endpoints, sess.total_requests, state
                            );
                        }
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&s)?),
                OutputFormat::Jsonl => println!("{}", serde_json::to_string(&s)?),
            }
        }
        Commands::Details { path, method } => {
            let db = Db::open_or_create(&config.db_path)?;
            match db.endpoint_details(&path, &method)? {
                Some(rec) => println!("{}", serde_json::to_string_pretty(&rec)?),
                None => return Err(anyhow!("no endpoint recorded for {} {}", method.to_uppercase(), path)),
            }
        }
        Commands::Export { output, csv } => {
            let db = Db::open_or_create(&config.db_path)?;
            let doc = db.export_all()?;
            if csv {
                let Some(path) = output else {
                    return Err(anyhow!("--csv requires --output <file>"));
                };
                let mut wtr = csv::Writer::from_writer(std::fs::File::create(&path)?);
                wtr.write_record([
                    "path", "method", "host", "port", "scheme", "status_code", "auth_type",
                    "has_auth", "security_level", "contains_sensitive_data", "potential_idor",
                    "missing_auth", "discovered_at_ms", "last_seen_ms", "request_count",
                ])?;
                for r in &doc.endpoints {
                    wtr.write_record([
                        r.path.clone(),
                        r.method.clone(),
                        r.host.clone(),
                        r.port.to_string(),
                        r.scheme.clone(),
                        r.status_code.to_string(),
                        r.auth_type.to_string(),
                        r.has_auth.to_string(),
                        r.security_level.to_string(),
                        r.contains_sensitive_data.to_string(),
                        r.potential_idor.to_string(),
                        r.missing_auth.to_string(),
                        r.discovered_at_ms.to_string(),
                        r.last_seen_ms.to_string(),
                        r.request_count.to_string(),
                    ])?;
                }
                wtr.flush()?;
            } else if let Some(path) = output {
                let file = OpenOptions::new().create(true).truncate(true).write(true).open(&path)?;
                let mut w = BufWriter::new(file);
                writeln!(w, "{}", serde_json::to_string_pretty(&doc)?)?;
            } else {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
        }
        Commands::Replay { events, host, port, session } => {
            if let Some(h) = host {
                config.target_host = h;
            }
            if let Some(p) = port {
                config.target_port = p;
            }
            if let Some(name) = session {
                config.session_name = name;
            }

            let fh = File::open(&events)?;
            let br = BufReader::new(fh);
            let mut parsed: Vec<FlowEvent> = Vec::new();
            for (idx, line) in br.lines().enumerate() {
                let line = line?;
                let t = line.trim();
                if t.is_empty() || t.starts_with('#') {
                    continue;
                }
                let event = serde_json::from_str(t)
                    .map_err(|e| anyhow!("bad capture event on line {}: {}", idx + 1, e))?;
                parsed.push(event);
            }
            let total = parsed.len();

            let db = Arc::new(Db::open_or_create(&config.db_path)?);
            let session = Arc::new(DiscoverySession::begin(config, db)?);
            let started = Instant::now();
            let worker_session = Arc::clone(&session);
            let rt = tokio::runtime::Runtime::new()?;
            let discovered = rt.block_on(async move {
                let (tx, rx) = mpsc::channel(1024);
                let worker = tokio::spawn(run_ingest(worker_session, rx));
                for event in parsed {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                drop(tx);
                worker.await
            })?;
            let duration_ms = started.elapsed().as_millis();
            let row = session.finish()?;
            println!("replayed {} events, {} endpoints stored ({} ms)", total, discovered, duration_ms);
            println!(
                "session {} ({}) {}:{} endpoints={} requests={} vulnerable={}",
                row.session_id, row.session_name, row.target_host, row.target_port,
                row.unique_endpoints, row.total_requests, row.vulnerable_endpoints
            );
        }
    }
    Ok(())
}
