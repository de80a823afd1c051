//! Structural validators for well-known endpoints.
//!
//! Dispatch is on the (method, path) pair; endpoints without an entry here
//! are judged by status code alone.

use backcheck_core::Method;
use serde_json::Value;

#[derive(Debug)]
pub(crate) struct Validation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Validation { valid: true, reason: None }
    }

    fn fail(reason: &str) -> Self {
        Validation { valid: false, reason: Some(reason.to_string()) }
    }
}

pub(crate) fn validate(method: Method, path: &str, data: Option<&Value>) -> Validation {
    match (method, path) {
        (Method::Get, "/health") => require_field(data, "status", "Response should have \"status\" field"),
        (Method::Get, "/ready") => require_field(data, "ready", "Response should have \"ready\" field"),
        (Method::Get, "/resources") => resource_list(data),
        (Method::Post, "/resources") => require_field(data, "id", "Created resource should have \"id\" field"),
        (Method::Post, "/auth/login") => login_token(data),
        _ => Validation::ok(),
    }
}

fn require_field(data: Option<&Value>, field: &str, missing: &str) -> Validation {
    match data.and_then(Value::as_object) {
        Some(obj) if obj.contains_key(field) => Validation::ok(),
        Some(_) => Validation::fail(missing),
        None => Validation::fail("Response should be an object"),
    }
}

fn resource_list(data: Option<&Value>) -> Validation {
    match data {
        Some(Value::Array(_)) => Validation::ok(),
        Some(Value::Object(obj)) if obj.contains_key("data") => Validation::ok(),
        _ => Validation::fail("Response should be an array or object with data array"),
    }
}

fn login_token(data: Option<&Value>) -> Validation {
    match data.and_then(Value::as_object) {
        Some(obj) if obj.contains_key("accessToken") || obj.contains_key("token") => Validation::ok(),
        Some(_) => Validation::fail("Response should have \"accessToken\" or \"token\" field"),
        None => Validation::fail("Response should be an object"),
    }
}
