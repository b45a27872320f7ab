use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

use crate::envelope::ResponseEnvelope;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Error code the remote returns once an access token has expired or been revoked.
pub const SESSION_EXPIRED_CODE: &str = "INVALID_SESSION_ID";

/// One field-level failure reported by the remote when a record is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub message: String,
    #[serde(default, alias = "errorCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl FieldError {
    pub fn new(message: impl Into<String>, fields: Vec<String>) -> Self {
        Self { message: message.into(), status_code: None, fields }
    }

    fn describe(&self) -> String {
        if self.fields.is_empty() {
            self.message.clone()
        } else {
            format!("{} (fields: {})", self.message, self.fields.join(", "))
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Failed to authenticate with Salesforce: {0}")]
    Connection(String),
    #[error("Not connected to Salesforce. Call connect() first.")]
    NotConnected,
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Missing required arguments for {tool}: {}", .missing.join(", "))]
    MissingArguments { tool: String, missing: Vec<String> },
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Potentially dangerous SQL pattern detected: {pattern}")]
    InvalidQuery { pattern: &'static str },
    #[error("Missing required fields: {}", .0.join(", "))]
    RequiredFieldMissing(Vec<String>),
    #[error("Read-only mode is enabled; {tool} is not permitted")]
    ReadOnly { tool: String },
    #[error("{message}")]
    NotFound { message: String, supported_key: &'static str, supported: Vec<String> },
    #[error("No {object_type} record found with ID: {record_id}")]
    RecordNotFound { object_type: String, record_id: String },
    #[error("{message}")]
    RemoteApi { message: String, code: String },
    #[error("remote rejected the record")]
    RemoteValidation(Vec<FieldError>),
    #[error("{0}")]
    Transport(String),
    #[error("An unknown error occurred")]
    Unknown,
}

impl ToolError {
    /// Code suffix for locally raised validation failures.
    pub fn domain_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidQuery { .. } => Some("INVALID_QUERY"),
            Self::RequiredFieldMissing(_) => Some("REQUIRED_FIELD_MISSING"),
            Self::ReadOnly { .. } => Some("READ_ONLY_MODE"),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::RemoteApi { code, .. } if code == SESSION_EXPIRED_CODE)
    }
}

/// Renders the `error` string of a failure envelope.
///
/// Order matters: local validation codes first, then the remote API shape, then remote
/// field errors, and only then the bare message.
pub fn describe(error: &ToolError) -> String {
    if let Some(code) = error.domain_code() {
        return format!("{error} ({code})");
    }

    match error {
        ToolError::RemoteApi { message, code } => {
            format!("Salesforce API error: {message} ({code})")
        }
        ToolError::RemoteValidation(errors) if !errors.is_empty() => {
            let joined = errors.iter().map(FieldError::describe).collect::<Vec<_>>().join("; ");
            format!("Validation errors: {joined}")
        }
        ToolError::RemoteValidation(_) | ToolError::Unknown => UNKNOWN_ERROR_MESSAGE.to_string(),
        other => other.to_string(),
    }
}

/// Converts any tool error into a `success: false` envelope and logs it.
pub fn normalize(error: &ToolError, context: &str) -> ResponseEnvelope {
    let message = describe(error);
    error!(event_name = "tool.error", context = %context, error = %message, "salesforce error");

    let envelope = ResponseEnvelope::failure(message);
    match error {
        ToolError::NotFound { supported_key, supported, .. } => {
            let mut details = Map::new();
            details.insert((*supported_key).to_string(), json!(supported));
            envelope.with_details(Value::Object(details))
        }
        ToolError::RequiredFieldMissing(fields) => {
            envelope.with_details(json!({ "missingFields": fields }))
        }
        ToolError::RemoteValidation(errors) if !errors.is_empty() => {
            envelope.with_details(json!({ "errors": errors }))
        }
        _ => envelope,
    }
}
