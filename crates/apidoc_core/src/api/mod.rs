//! Request surface: explicit request/response values and JSON shapes.
//!
//! # Responsibility
//! - Model one HTTP-style call as an [`ApiRequest`] and its reply as an
//!   [`ApiResponse`] holding JSON text.
//! - Own the canonical error bodies shared by every route.
//!
//! # Invariants
//! - Every response body is a JSON document.
//! - Failures are reported in the body as `{ isOk: false, errMsg }`; storage
//!   details never reach the client.

pub mod entity_routes;

use crate::repo::entity_repo::RepoError;
use crate::service::{ServiceError, Session};
use serde_json::{json, Value};
use std::collections::HashMap;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

pub const ACCESS_DENIED_MESSAGE: &str = "You do not have permission to perform this operation.";
pub const NOT_LOGGED_IN_MESSAGE: &str =
    "You are not logged in or your session has expired. Please log in and try again.";
const INTERNAL_ERROR_MESSAGE: &str = "Internal error. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

/// One incoming call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub session: Session,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, session: Session) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            session,
            query: HashMap::new(),
            body: Value::Null,
        }
    }

    pub fn post(path: impl Into<String>, session: Session, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            session,
            query: HashMap::new(),
            body,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Returns a query value, treating empty strings as absent.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Reply to one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    pub fn json(value: &Value) -> Self {
        Self::text(value.to_string())
    }

    /// Wraps already-serialized JSON text.
    pub fn text(body: String) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON,
            body,
        }
    }

    /// Parses the body with a standard JSON parser.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

pub fn access_denied_body() -> Value {
    json!({ "isOk": false, "errMsg": ACCESS_DENIED_MESSAGE })
}

pub fn not_logged_in_body() -> Value {
    json!({ "isOk": false, "errMsg": NOT_LOGGED_IN_MESSAGE })
}

pub fn failure_body(message: impl Into<String>) -> Value {
    json!({ "isOk": false, "errMsg": message.into() })
}

/// Maps a service error onto its response body.
pub fn error_response(err: &ServiceError) -> ApiResponse {
    let body = match err {
        ServiceError::NotAuthenticated => not_logged_in_body(),
        ServiceError::AccessDenied => access_denied_body(),
        ServiceError::Repo(err @ (RepoError::Validation(_) | RepoError::NotFound { .. })) => {
            failure_body(err.to_string())
        }
        ServiceError::Repo(_) | ServiceError::Serialization(_) => {
            failure_body(INTERNAL_ERROR_MESSAGE)
        }
        other => failure_body(other.to_string()),
    };
    ApiResponse::json(&body)
}

/// Reads a required integer id from a query value.
pub(crate) fn required_id_param(
    value: Option<&str>,
    name: &'static str,
) -> Result<i64, ServiceError> {
    let value = value.ok_or(ServiceError::MissingParameter(name))?;
    parse_id(value, name)
}

/// Reads an optional integer id from a query value.
pub(crate) fn optional_id_param(
    value: Option<&str>,
    name: &'static str,
) -> Result<Option<i64>, ServiceError> {
    value.map(|value| parse_id(value, name)).transpose()
}

/// Reads an integer id from a JSON body field. Numeric strings are accepted.
pub(crate) fn id_field(body: &Value, name: &'static str) -> Result<Option<i64>, ServiceError> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => parse_id(text, name).map(Some),
        Some(Value::Number(number)) => {
            number
                .as_i64()
                .map(Some)
                .ok_or_else(|| ServiceError::InvalidParameter {
                    name,
                    value: number.to_string(),
                })
        }
        Some(other) => Err(ServiceError::InvalidParameter {
            name,
            value: other.to_string(),
        }),
    }
}

pub(crate) fn required_id_field(body: &Value, name: &'static str) -> Result<i64, ServiceError> {
    id_field(body, name)?.ok_or(ServiceError::MissingParameter(name))
}

fn parse_id(value: &str, name: &'static str) -> Result<i64, ServiceError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ServiceError::InvalidParameter {
            name,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{error_response, id_field, required_id_param, ApiRequest, Method};
    use crate::repo::entity_repo::RepoError;
    use crate::service::{ServiceError, Session};
    use serde_json::json;

    #[test]
    fn empty_query_values_count_as_missing() {
        let request = ApiRequest::get("/entity/get", Session::anonymous()).with_query("id", "  ");
        let err = required_id_param(request.query_param("id"), "id").unwrap_err();
        assert!(matches!(err, ServiceError::MissingParameter("id")));
    }

    #[test]
    fn body_ids_accept_numbers_and_numeric_strings() {
        let body = json!({ "a": 4, "b": "5", "c": "", "d": true });
        assert_eq!(id_field(&body, "a").unwrap(), Some(4));
        assert_eq!(id_field(&body, "b").unwrap(), Some(5));
        assert_eq!(id_field(&body, "c").unwrap(), None);
        assert_eq!(id_field(&body, "missing").unwrap(), None);
        assert!(matches!(
            id_field(&body, "d"),
            Err(ServiceError::InvalidParameter { name: "d", .. })
        ));
    }

    #[test]
    fn storage_errors_do_not_leak_details() {
        let err = ServiceError::Repo(RepoError::InvalidData("secret".to_string()));
        let body = error_response(&err).body_json().unwrap();
        assert_eq!(body["isOk"], json!(false));
        assert!(!body["errMsg"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("post"), Some(Method::Post));
        assert_eq!(Method::parse("DELETE"), None);
    }
}
