use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use forcelink_core::{FieldError, ToolError};

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{0}")]
    Auth(String),
    #[error("{message}")]
    Api { message: String, code: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<CrmError> for ToolError {
    fn from(error: CrmError) -> Self {
        match error {
            CrmError::Auth(message) => ToolError::Connection(message),
            CrmError::Api { message, code } => ToolError::RemoteApi { message, code },
            CrmError::Transport(error) => ToolError::Transport(error.to_string()),
            CrmError::Decode(message) => ToolError::Transport(message),
        }
    }
}

/// Identity returned by a successful login. `id` is the user id.
#[derive(Clone, Debug)]
pub struct LoginInfo {
    pub id: String,
    pub organization_id: String,
    pub url: String,
    pub access_token: SecretString,
    pub instance_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub total_size: u64,
    pub done: bool,
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    #[serde(default)]
    pub id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl SaveResult {
    pub fn saved(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), success: true, errors: Vec::new() }
    }

    pub fn rejected(errors: Vec<FieldError>) -> Self {
        Self { id: None, success: false, errors }
    }

    /// Raises a rejected save as a field-level validation error.
    pub fn into_result(self) -> Result<Option<String>, ToolError> {
        if self.success {
            Ok(self.id)
        } else {
            Err(ToolError::RemoteValidation(self.errors))
        }
    }
}

/// Performs the username/password handshake and hands back a live session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Arc<dyn CrmSession>, CrmError>;
}

#[async_trait]
pub trait CrmSession: Send + Sync {
    fn login_info(&self) -> &LoginInfo;

    async fn logout(&self) -> Result<(), CrmError>;

    async fn query(&self, soql: &str) -> Result<QueryResult, CrmError>;

    /// SOSL search. The payload shape is passed through untouched.
    async fn search(&self, sosl: &str) -> Result<Value, CrmError>;

    async fn create(
        &self,
        object_type: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError>;

    async fn update(
        &self,
        object_type: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError>;

    async fn delete(&self, object_type: &str, id: &str) -> Result<SaveResult, CrmError>;
}
