//! Salesforce REST implementation of the session traits.
//!
//! Login uses the OAuth2 username/password grant; every later call is a bearer-token request
//! under `{instance_url}/services/data/v{api_version}/`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use forcelink_core::{FieldError, SalesforceConfig};

use crate::session::{Connector, CrmError, CrmSession, LoginInfo, QueryResult, SaveResult};

pub struct RestConnector {
    client: Client,
    login_url: String,
    client_id: String,
    client_secret: SecretString,
    api_version: String,
}

impl RestConnector {
    pub fn new(config: &SalesforceConfig) -> Result<Self, CrmError> {
        let client =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs)).build()?;

        Ok(Self {
            client,
            login_url: config.login_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    message: String,
    error_code: String,
}

#[derive(Debug, Deserialize)]
struct CreatedBody {
    id: String,
    success: bool,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[async_trait]
impl Connector for RestConnector {
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Arc<dyn CrmSession>, CrmError> {
        let token_url = format!("{}/services/oauth2/token", self.login_url);
        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("username", username),
                ("password", password.expose_secret()),
            ])
            .send()
            .await
            .map_err(|error| {
                error!(error = %error, "salesforce token request failed");
                CrmError::Transport(error)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Auth(oauth_error_message(status, &body)));
        }

        let token: TokenResponse = response.json().await.map_err(|error| {
            CrmError::Decode(format!("failed to decode oauth token response: {error}"))
        })?;
        if token.access_token.is_empty() {
            return Err(CrmError::Auth("token endpoint returned an empty access token".to_string()));
        }

        let (organization_id, user_id) = parse_identity_url(&token.id)?;
        let instance_url = Url::parse(&token.instance_url)
            .map_err(|error| CrmError::Decode(format!("invalid instance url: {error}")))?;

        let info = LoginInfo {
            id: user_id,
            organization_id,
            url: token.id,
            access_token: token.access_token.into(),
            instance_url: token.instance_url,
        };

        Ok(Arc::new(RestSession {
            client: self.client.clone(),
            instance_url,
            api_version: self.api_version.clone(),
            info,
        }))
    }
}

pub struct RestSession {
    client: Client,
    instance_url: Url,
    api_version: String,
    info: LoginInfo,
}

impl RestSession {
    fn data_url(&self, segments: &[&str]) -> Result<Url, CrmError> {
        let version = format!("v{}", self.api_version);
        let mut prefix = vec!["services", "data", version.as_str()];
        prefix.extend_from_slice(segments);
        endpoint(&self.instance_url, &prefix)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(event_name = "crm.request", method = %method, path = url.path(), "salesforce request");
        self.client.request(method, url).bearer_auth(self.info.access_token.expose_secret())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CrmError> {
        request.send().await.map_err(|error| {
            error!(error = %error, "salesforce request failed");
            CrmError::Transport(error)
        })
    }

    async fn save(&self, request: RequestBuilder, id: Option<&str>) -> Result<SaveResult, CrmError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(SaveResult { id: id.map(str::to_string), success: true, errors: Vec::new() });
        }
        if status.is_success() {
            let created: CreatedBody = decode(response).await?;
            return Ok(SaveResult {
                id: Some(created.id),
                success: created.success,
                errors: created.errors,
            });
        }

        let body = response.text().await.unwrap_or_default();
        save_failure(status, &body)
    }
}

/// A 400 naming specific fields is a record rejection; anything else keeps its error code.
fn save_failure(status: StatusCode, body: &str) -> Result<SaveResult, CrmError> {
    if status == StatusCode::BAD_REQUEST {
        if let Ok(errors) = serde_json::from_str::<Vec<FieldError>>(body) {
            if errors.iter().any(|error| !error.fields.is_empty()) {
                return Ok(SaveResult::rejected(errors));
            }
        }
    }
    Err(api_error(status, body))
}

#[async_trait]
impl CrmSession for RestSession {
    fn login_info(&self) -> &LoginInfo {
        &self.info
    }

    async fn logout(&self) -> Result<(), CrmError> {
        let url = endpoint(&self.instance_url, &["services", "oauth2", "revoke"])?;
        let request = self
            .client
            .post(url)
            .form(&[("token", self.info.access_token.expose_secret())]);
        let response = self.send(request).await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(api_error(status, &body))
        }
    }

    async fn query(&self, soql: &str) -> Result<QueryResult, CrmError> {
        let url = self.data_url(&["query"])?;
        let response = self.send(self.request(Method::GET, url).query(&[("q", soql)])).await?;
        read_json(response).await
    }

    async fn search(&self, sosl: &str) -> Result<Value, CrmError> {
        let url = self.data_url(&["search"])?;
        let response = self.send(self.request(Method::GET, url).query(&[("q", sosl)])).await?;
        read_json(response).await
    }

    async fn create(
        &self,
        object_type: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError> {
        let url = self.data_url(&["sobjects", object_type])?;
        self.save(self.request(Method::POST, url).json(data), None).await
    }

    async fn update(
        &self,
        object_type: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError> {
        let url = self.data_url(&["sobjects", object_type, id])?;
        self.save(self.request(Method::PATCH, url).json(data), Some(id)).await
    }

    async fn delete(&self, object_type: &str, id: &str) -> Result<SaveResult, CrmError> {
        let url = self.data_url(&["sobjects", object_type, id])?;
        self.save(self.request(Method::DELETE, url), Some(id)).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CrmError> {
    response.json::<T>().await.map_err(|error| CrmError::Decode(error.to_string()))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CrmError> {
    let status = response.status();
    if status.is_success() {
        return decode(response).await;
    }

    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Appends path segments, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, CrmError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| CrmError::Decode(format!("instance url `{base}` cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// The identity url ends in `/id/{organizationId}/{userId}`.
fn parse_identity_url(identity: &str) -> Result<(String, String), CrmError> {
    let mut segments = identity.trim_end_matches('/').rsplit('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(user), Some(org), Some("id")) if !user.is_empty() && !org.is_empty() => {
            Ok((org.to_string(), user.to_string()))
        }
        _ => Err(CrmError::Decode(format!("unexpected identity url `{identity}`"))),
    }
}

fn oauth_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(OAuthErrorBody { error, error_description: Some(description) }) => {
            format!("{error}: {description}")
        }
        Ok(OAuthErrorBody { error, error_description: None }) => error,
        Err(_) => format!("oauth token endpoint returned {status}"),
    }
}

fn api_error(status: StatusCode, body: &str) -> CrmError {
    match serde_json::from_str::<Vec<ApiErrorBody>>(body) {
        Ok(mut errors) if !errors.is_empty() => {
            let first = errors.swap_remove(0);
            CrmError::Api { message: first.message, code: first.error_code }
        }
        _ => CrmError::Api {
            message: if body.trim().is_empty() { status.to_string() } else { body.to_string() },
            code: format!("HTTP_{}", status.as_u16()),
        },
    }
}
