use anyhow::{anyhow, Result};
use backcheck_core::Method;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;
use verifier::{EndpointResult, EndpointSpec, LevelSpec};

mod config;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "backcheck", version, about = "Backend endpoint verification console")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./backcheck.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Verify a single endpoint
    Endpoint {
        /// Base URL of the backend under test (e.g., http://localhost:3001)
        base_url: Option<String>,
        /// Endpoint path, must start with '/'
        #[arg(long)]
        path: String,
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        #[arg(long, default_value = "GET")]
        method: String,
        /// Expected status code (default: 200)
        #[arg(long)]
        expect: Option<u16>,
        /// JSON object sent as the request body
        #[arg(long)]
        body: Option<String>,
        /// Extra header ("Name: value"); repeatable
        #[arg(long = "header", value_name = "HEADER")]
        headers: Vec<String>,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Verify every endpoint of one level, loaded from a YAML/JSON file
    Level {
        /// Base URL of the backend under test
        base_url: Option<String>,
        /// Level file with level_id and endpoints
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Run the fixed smoke suite against a backend (speed-run check)
    All {
        /// Base URL of the backend under test
        base_url: Option<String>,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
}

/// One endpoint result tagged with its level, for JSONL and CSV rows.
#[derive(Serialize)]
struct EndpointRow<'a> {
    level_id: &'a str,
    #[serde(flatten)]
    result: &'a EndpointResult,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Version => {
            println!("backcheck {} (core {})", env!("CARGO_PKG_VERSION"), backcheck_core::version());
        }
        Commands::Endpoint { mut base_url, path, method, expect, body, headers, mut format, out } => {
            if let Some(cfg) = &loaded_cfg { if let Some(c) = &cfg.endpoint {
                if base_url.is_none() { base_url = c.base_url.clone(); }
                if let Some(f) = &c.format { format = format_from_name(f); }
            }}
            let base = require_base_url(base_url)?;
            let spec = build_endpoint_spec(&path, &method, expect, body.as_deref(), &headers)?;
            let rt = tokio::runtime::Runtime::new()?;
            let started_at = now_rfc3339();
            let result = rt.block_on(async { verifier::verify_endpoint(&spec, &base).await });
            let ended_at = now_rfc3339();
            let text = match format {
                OutputFormat::Text => {
                    let mut s = format!("{} ({} ms)", result.message, result.response_time_ms);
                    if let Some(d) = &result.details {
                        s.push_str(&format!("\n  details: {}", d));
                    }
                    s
                }
                OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                    "base_url": base,
                    "started_at": started_at,
                    "ended_at": ended_at,
                    "result": result,
                }))?,
                OutputFormat::Jsonl => serde_json::to_string(&result)?,
            };
            emit(&text, out.as_ref())?;
        }
        Commands::Level { mut base_url, file, mut format, out, csv } => {
            if let Some(cfg) = &loaded_cfg { if let Some(c) = &cfg.level {
                if base_url.is_none() { base_url = c.base_url.clone(); }
                if let Some(f) = &c.format { format = format_from_name(f); }
            }}
            let base = require_base_url(base_url)?;
            let level = load_level(&file)?;
            let rt = tokio::runtime::Runtime::new()?;
            let started_at = now_rfc3339();
            let result = rt.block_on(async { verifier::verify_level(&level, &base).await });
            let ended_at = now_rfc3339();
            if csv {
                if let Some(path) = &out {
                    let rows: Vec<EndpointRow> = result
                        .results
                        .iter()
                        .map(|r| EndpointRow { level_id: &result.level_id, result: r })
                        .collect();
                    return write_csv(path, &rows);
                }
                println!("--csv requires --out <file>");
            }
            let text = match format {
                OutputFormat::Text => render_level_text(&result),
                OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                    "base_url": base,
                    "started_at": started_at,
                    "ended_at": ended_at,
                    "result": result,
                }))?,
                OutputFormat::Jsonl => {
                    let lines: Result<Vec<String>, _> = result
                        .results
                        .iter()
                        .map(|r| serde_json::to_string(&EndpointRow { level_id: &result.level_id, result: r }))
                        .collect();
                    lines?.join("\n")
                }
            };
            emit(&text, out.as_ref())?;
        }
        Commands::All { mut base_url, mut format, out, csv } => {
            if let Some(cfg) = &loaded_cfg { if let Some(c) = &cfg.all {
                if base_url.is_none() { base_url = c.base_url.clone(); }
                if let Some(f) = &c.format { format = format_from_name(f); }
            }}
            let base = require_base_url(base_url)?;
            let rt = tokio::runtime::Runtime::new()?;
            let started_at = now_rfc3339();
            let result = rt.block_on(async { verifier::verify_all(&base).await });
            let ended_at = now_rfc3339();
            if csv {
                if let Some(path) = &out {
                    let rows: Vec<EndpointRow> = result
                        .level_results
                        .iter()
                        .flat_map(|l| l.results.iter().map(move |r| EndpointRow { level_id: &l.level_id, result: r }))
                        .collect();
                    return write_csv(path, &rows);
                }
                println!("--csv requires --out <file>");
            }
            let text = match format {
                OutputFormat::Text => {
                    let mut s = String::new();
                    for l in &result.level_results {
                        s.push_str(&render_level_text(l));
                        s.push('\n');
                    }
                    s.push_str(&format!(
                        "total: {} passed, {} failed ({} ms)",
                        result.passed_count, result.failed_count, result.total_time_ms
                    ));
                    s
                }
                OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                    "base_url": base,
                    "started_at": started_at,
                    "ended_at": ended_at,
                    "result": result,
                }))?,
                OutputFormat::Jsonl => {
                    let lines: Result<Vec<String>, _> = result
                        .level_results
                        .iter()
                        .flat_map(|l| l.results.iter().map(move |r| serde_json::to_string(&EndpointRow { level_id: &l.level_id, result: r })))
                        .collect();
                    lines?.join("\n")
                }
            };
            emit(&text, out.as_ref())?;
        }
    }
    Ok(())
}

fn format_from_name(name: &str) -> OutputFormat {
    match name {
        "json" => OutputFormat::Json,
        "jsonl" => OutputFormat::Jsonl,
        _ => OutputFormat::Text,
    }
}

/// Validate the base URL the way the engine expects it: http(s), and no
/// trailing slash so that concatenation with a '/'-prefixed path stays clean.
fn require_base_url(base_url: Option<String>) -> Result<String> {
    let raw = base_url.ok_or_else(|| anyhow!("provide a base URL or set it in backcheck.yaml"))?;
    let parsed = Url::parse(&raw).map_err(|e| anyhow!("invalid base URL {}: {}", raw, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(anyhow!("base URL must use http or https: {}", raw));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn build_endpoint_spec(
    path: &str,
    method: &str,
    expect: Option<u16>,
    body: Option<&str>,
    headers: &[String],
) -> Result<EndpointSpec> {
    if !path.starts_with('/') {
        return Err(anyhow!("path must start with '/': {}", path));
    }
    let method: Method = method.parse()?;
    let body = match body {
        None => None,
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw)? {
            serde_json::Value::Object(map) => Some(map),
            _ => return Err(anyhow!("--body must be a JSON object")),
        },
    };
    let mut header_map = HashMap::new();
    for h in headers {
        let (name, value) = h
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid header (expected \"Name: value\"): {}", h))?;
        let (name, value) = (name.trim(), value.trim());
        if !verifier::valid_header(name, value) {
            return Err(anyhow!("invalid header name or value: {}", h));
        }
        header_map.insert(name.to_string(), value.to_string());
    }

    let mut spec = EndpointSpec::new(method, path);
    spec.expected_status = expect;
    spec.body = body;
    if !header_map.is_empty() {
        spec.headers = Some(header_map);
    }
    Ok(spec)
}

fn load_level(path: &Path) -> Result<LevelSpec> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
    let level: LevelSpec = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&raw)?
    } else {
        serde_yaml::from_str(&raw)?
    };
    if level.endpoints.is_empty() {
        return Err(anyhow!("level file has no endpoints"));
    }
    for ep in &level.endpoints {
        if !ep.path.starts_with('/') {
            return Err(anyhow!("endpoint path must start with '/': {}", ep.path));
        }
    }
    Ok(level)
}

fn render_level_text(result: &verifier::LevelResult) -> String {
    let mut s = format!(
        "{}: {}/{} passed ({} ms)",
        result.level_id,
        result.passed_count,
        result.results.len(),
        result.total_time_ms
    );
    for r in &result.results {
        s.push_str(&format!("\n  {} ({} ms)", r.message, r.response_time_ms));
    }
    s
}

fn write_csv(path: &Path, rows: &[EndpointRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
    wtr.write_record([
        "level_id","method","path","expected_status","actual_status","success","response_time_ms","message",
    ])?;
    for row in rows {
        let r = row.result;
        wtr.write_record([
            row.level_id.to_string(),
            r.method.to_string(),
            r.path.clone(),
            r.expected_status.to_string(),
            r.actual_status.to_string(),
            r.success.to_string(),
            r.response_time_ms.to_string(),
            r.message.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn emit(text: &str, out: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = out {
        let file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "{}", text)?;
    } else {
        println!("{}", text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_http_scheme_and_drops_trailing_slash() {
        assert_eq!(
            require_base_url(Some("http://localhost:3001/".to_string())).unwrap(),
            "http://localhost:3001"
        );
        assert!(require_base_url(Some("ftp://example.com".to_string())).is_err());
        assert!(require_base_url(Some("not a url".to_string())).is_err());
        assert!(require_base_url(None).is_err());
    }

    #[test]
    fn endpoint_spec_validates_path_and_body() {
        let spec = build_endpoint_spec("/resources", "post", Some(201), Some("{\"name\":\"test\"}"), &[]).unwrap();
        assert_eq!(spec.method, Method::Post);
        assert_eq!(spec.expected_status, Some(201));
        assert!(spec.body.is_some());

        assert!(build_endpoint_spec("resources", "GET", None, None, &[]).is_err());
        assert!(build_endpoint_spec("/x", "HEAD", None, None, &[]).is_err());
        assert!(build_endpoint_spec("/x", "GET", None, Some("[1,2]"), &[]).is_err());
    }

    #[test]
    fn headers_parse_as_name_value_pairs() {
        let spec = build_endpoint_spec(
            "/x",
            "GET",
            None,
            None,
            &["Authorization: Bearer abc".to_string()],
        )
        .unwrap();
        let headers = spec.headers.unwrap();
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer abc"));

        assert!(build_endpoint_spec("/x", "GET", None, None, &["bad-header".to_string()]).is_err());
    }

    #[test]
    fn unrepresentable_headers_are_rejected_up_front() {
        assert!(build_endpoint_spec("/x", "GET", None, None, &["Bäd-Name: v".to_string()]).is_err());
        assert!(build_endpoint_spec("/x", "GET", None, None, &["X-Test: a\u{7f}b".to_string()]).is_err());
    }
}
