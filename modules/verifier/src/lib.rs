//! HTTP endpoint verification engine.
//!
//! Drives a declarative set of probes against a learner-supplied backend and
//! reports structured pass/fail results. Probes run strictly sequentially and
//! never abort a run: every network-level failure is folded into the returned
//! result data.

mod suite;
mod validators;

pub use suite::smoke_suite;

use backcheck_core::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Hard cap on any single probe, in milliseconds. The in-flight request is
/// cancelled when it expires.
pub const VERIFY_TIMEOUT_MS: u64 = 10_000;

/// Failure diagnostics keep at most this many characters of the body.
const DETAILS_MAX_CHARS: usize = 200;

/// One HTTP call to verify. `path` must start with `/` and is appended to the
/// base URL verbatim; callers validate their input before handing it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub method: Method,
    pub path: String,
    /// Defaults to 200 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    /// JSON object sent as the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
    /// Merged over the default `Content-Type`/`Accept: application/json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl EndpointSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        EndpointSpec {
            method,
            path: path.into(),
            expected_status: None,
            body: None,
            headers: None,
        }
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Outcome of one endpoint probe. `actual_status` is 0 when the request never
/// completed (timeout or connection failure).
#[derive(Debug, Clone, Serialize)]
pub struct EndpointResult {
    pub success: bool,
    pub method: Method,
    pub path: String,
    pub expected_status: u16,
    pub actual_status: u16,
    pub message: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A named, ordered group of endpoint probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSpec {
    pub level_id: String,
    pub endpoints: Vec<EndpointSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelResult {
    pub level_id: String,
    pub passed: bool,
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_time_ms: u64,
    pub results: Vec<EndpointResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullVerificationResult {
    pub completed: bool,
    pub total_time_ms: u64,
    pub passed_count: usize,
    pub failed_count: usize,
    pub level_results: Vec<LevelResult>,
}

/// Verify a single endpoint against `base_url`.
pub async fn verify_endpoint(spec: &EndpointSpec, base_url: &str) -> EndpointResult {
    let client = build_client();
    verify_with_client(&client, spec, base_url).await
}

/// Run every endpoint of a level sequentially, in list order, without
/// short-circuiting on failures.
pub async fn verify_level(level: &LevelSpec, base_url: &str) -> LevelResult {
    let client = build_client();
    verify_level_with_client(&client, level, base_url).await
}

/// Run the fixed smoke suite (server bootstrap, basic CRUD, database health)
/// and aggregate totals across levels. Never short-circuits on a failing
/// level; `completed` is true on any normal return.
pub async fn verify_all(base_url: &str) -> FullVerificationResult {
    let client = build_client();
    let started = Instant::now();
    let mut level_results = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;
    for level in suite::smoke_suite() {
        let result = verify_level_with_client(&client, &level, base_url).await;
        passed_count += result.passed_count;
        failed_count += result.failed_count;
        level_results.push(result);
    }
    FullVerificationResult {
        completed: true,
        total_time_ms: started.elapsed().as_millis() as u64,
        passed_count,
        failed_count,
        level_results,
    }
}

fn build_client() -> Client {
    Client::builder()
        .user_agent(concat!("backcheck/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("client")
}

async fn verify_level_with_client(client: &Client, level: &LevelSpec, base_url: &str) -> LevelResult {
    let started = Instant::now();
    let mut results = Vec::with_capacity(level.endpoints.len());
    // Strictly sequential: later probes may rely on side effects earlier ones
    // left on the target backend.
    for endpoint in &level.endpoints {
        results.push(verify_with_client(client, endpoint, base_url).await);
    }
    let passed_count = results.iter().filter(|r| r.success).count();
    let failed_count = results.len() - passed_count;
    LevelResult {
        level_id: level.level_id.clone(),
        passed: failed_count == 0,
        passed_count,
        failed_count,
        total_time_ms: started.elapsed().as_millis() as u64,
        results,
    }
}

async fn verify_with_client(client: &Client, spec: &EndpointSpec, base_url: &str) -> EndpointResult {
    let expected = spec.expected_status.unwrap_or(200);
    let url = format!("{}{}", base_url, spec.path);
    let started = Instant::now();

    let mut request = client
        .request(as_reqwest_method(spec.method), &url)
        .headers(merged_headers(spec.headers.as_ref()))
        .timeout(Duration::from_millis(VERIFY_TIMEOUT_MS));
    if let Some(body) = &spec.body {
        request = request.json(body);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return transport_failure(spec, expected, started.elapsed(), e),
    };

    let actual = response.status().as_u16();
    let response_time_ms = started.elapsed().as_millis() as u64;
    let data = read_json_body(response).await;

    let status_match = actual == expected;
    let validation = if status_match {
        validators::validate(spec.method, &spec.path, data.as_ref())
    } else {
        validators::Validation::ok()
    };
    let success = status_match && validation.valid;

    let message = if success {
        format!("✓ {} {} returned {}", spec.method, spec.path, actual)
    } else {
        validation
            .reason
            .unwrap_or_else(|| format!("✗ Expected {}, got {}", expected, actual))
    };
    let details = if success {
        None
    } else {
        data.as_ref().map(|v| truncate(&v.to_string(), DETAILS_MAX_CHARS))
    };

    EndpointResult {
        success,
        method: spec.method,
        path: spec.path.clone(),
        expected_status: expected,
        actual_status: actual,
        message,
        response_time_ms,
        details,
    }
}

fn transport_failure(
    spec: &EndpointSpec,
    expected: u16,
    elapsed: Duration,
    err: reqwest::Error,
) -> EndpointResult {
    let (message, details) = if err.is_timeout() {
        (
            format!("✗ {} {} timed out after {}ms", spec.method, spec.path, VERIFY_TIMEOUT_MS),
            None,
        )
    } else {
        (
            format!("✗ {} {} failed to connect", spec.method, spec.path),
            Some(err.to_string()),
        )
    };
    EndpointResult {
        success: false,
        method: spec.method,
        path: spec.path.clone(),
        expected_status: expected,
        actual_status: 0,
        message,
        response_time_ms: elapsed.as_millis() as u64,
        details,
    }
}

/// Parse the body as JSON only when the response says it is JSON. An
/// unparsable body is tolerated and treated as no data; only a registered
/// validator may then fail over the missing fields.
async fn read_json_body(response: reqwest::Response) -> Option<Value> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return None;
    }
    response.json::<Value>().await.ok()
}

fn as_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Check that a header can be represented on the wire. Input boundaries call
/// this before accepting a spec; the engine itself does not re-validate.
pub fn valid_header(name: &str, value: &str) -> bool {
    HeaderName::from_bytes(name.as_bytes()).is_ok() && HeaderValue::from_str(value).is_ok()
}

fn merged_headers(extra: Option<&HashMap<String, String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(extra) = extra {
        for (name, value) in extra {
            // Headers the caller let through that are not representable on
            // the wire are skipped rather than failing the probe.
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(n, v);
            }
        }
    }
    headers
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
