//! The single lazily-established Salesforce session shared by every tool call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use forcelink_client::{Connector, CrmSession};
use forcelink_core::{SalesforceConfig, ToolError};

#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    /// Password with the security token already appended.
    pub password: SecretString,
}

impl Credentials {
    pub fn from_config(config: &SalesforceConfig) -> Self {
        Self { username: config.username.clone(), password: config.login_secret() }
    }
}

/// What `connect` hands back. The token is kept behind `SecretString`.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub access_token: SecretString,
    pub instance_url: String,
    pub user_id: String,
    pub organization_id: String,
    pub connected_at: DateTime<Utc>,
}

struct ActiveSession {
    remote: Arc<dyn CrmSession>,
}

pub struct SessionManager {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    session: RwLock<Option<ActiveSession>>,
    connect_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials) -> Self {
        Self { connector, credentials, session: RwLock::new(None), connect_gate: Mutex::new(()) }
    }

    /// Logs in unconditionally. An existing session is logged out first.
    pub async fn connect(&self) -> Result<ConnectionInfo, ToolError> {
        let _gate = self.connect_gate.lock().await;
        self.disconnect().await;
        self.login().await
    }

    /// Connects only if needed. Concurrent callers wait on the same handshake.
    pub async fn ensure_connected(&self) -> Result<(), ToolError> {
        if self.is_connected().await {
            return Ok(());
        }

        let _gate = self.connect_gate.lock().await;
        if self.is_connected().await {
            return Ok(());
        }
        self.login().await.map(|_| ())
    }

    pub async fn active_session(&self) -> Result<Arc<dyn CrmSession>, ToolError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.remote))
            .ok_or(ToolError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .map(|active| !active.remote.login_info().access_token.expose_secret().is_empty())
            .unwrap_or(false)
    }

    /// Idempotent. Logout failures are logged and the session is cleared regardless.
    pub async fn disconnect(&self) {
        let Some(active) = self.session.write().await.take() else {
            return;
        };

        match active.remote.logout().await {
            Ok(()) => info!(event_name = "salesforce.disconnected", "disconnected from salesforce"),
            Err(error) => warn!(
                event_name = "salesforce.logout_failed",
                error = %error,
                "error during salesforce logout"
            ),
        }
    }

    /// Drops the session without logging out so the next call reconnects.
    pub async fn invalidate(&self) {
        if self.session.write().await.take().is_some() {
            warn!(event_name = "salesforce.session_invalidated", "salesforce session expired");
        }
    }

    async fn login(&self) -> Result<ConnectionInfo, ToolError> {
        let remote = self
            .connector
            .login(&self.credentials.username, &self.credentials.password)
            .await
            .map_err(|error| {
                error!(
                    event_name = "salesforce.connect_failed",
                    error = %error,
                    "salesforce authentication failed"
                );
                ToolError::Connection(error.to_string())
            })?;

        let login = remote.login_info();
        info!(
            event_name = "salesforce.connected",
            user_id = %login.id,
            organization_id = %login.organization_id,
            identity_url = %login.url,
            "connected to salesforce"
        );

        let connection = ConnectionInfo {
            access_token: login.access_token.clone(),
            instance_url: login.instance_url.clone(),
            user_id: login.id.clone(),
            organization_id: login.organization_id.clone(),
            connected_at: Utc::now(),
        };
        *self.session.write().await = Some(ActiveSession { remote });

        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::{ExposeSecret, SecretString};

    use forcelink_client::InMemoryOrg;
    use forcelink_core::ToolError;

    use super::{Credentials, SessionManager};

    fn manager(org: &Arc<InMemoryOrg>) -> SessionManager {
        SessionManager::new(
            Arc::new(org.connector()),
            Credentials {
                username: "ops@example.com".to_string(),
                password: SecretString::from("pwtoken".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn connect_then_disconnect_twice() {
        let org = InMemoryOrg::new();
        let sessions = manager(&org);
        assert!(!sessions.is_connected().await);

        let connection = sessions.connect().await.expect("connect");
        assert!(sessions.is_connected().await);
        assert_eq!(connection.organization_id, "00Dxx0000001gPLEAY");
        assert!(!connection.access_token.expose_secret().is_empty());

        sessions.disconnect().await;
        assert!(!sessions.is_connected().await);
        sessions.disconnect().await;
        assert!(!sessions.is_connected().await);
        assert_eq!(org.logout_count(), 1);
    }

    #[tokio::test]
    async fn reconnect_logs_out_the_previous_session() {
        let org = InMemoryOrg::new();
        let sessions = manager(&org);

        let first = sessions.connect().await.expect("first connect");
        let second = sessions.connect().await.expect("second connect");

        assert_eq!(org.login_count(), 2);
        assert_eq!(org.logout_count(), 1);
        assert_ne!(first.access_token.expose_secret(), second.access_token.expose_secret());
        assert!(sessions.is_connected().await);
    }

    #[tokio::test]
    async fn active_session_requires_connect() {
        let sessions = manager(&InMemoryOrg::new());

        assert_eq!(sessions.active_session().await.err(), Some(ToolError::NotConnected));
    }

    #[tokio::test]
    async fn handshake_failure_is_a_connection_error() {
        let org = InMemoryOrg::new();
        org.fail_login("INVALID_LOGIN: Invalid username, password, security token").await;
        let sessions = manager(&org);

        let error = sessions.connect().await.expect_err("login should fail");

        assert_eq!(
            error.to_string(),
            "Failed to authenticate with Salesforce: \
             INVALID_LOGIN: Invalid username, password, security token"
        );
        assert!(!sessions.is_connected().await);
    }

    #[tokio::test]
    async fn logout_failure_still_clears_session() {
        let org = InMemoryOrg::new();
        org.fail_logout("network unreachable").await;
        let sessions = manager(&org);

        sessions.connect().await.expect("connect");
        sessions.disconnect().await;

        assert!(!sessions.is_connected().await);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_login() {
        let org = InMemoryOrg::new();
        let sessions = manager(&org);

        sessions.ensure_connected().await.expect("first connect");
        sessions.ensure_connected().await.expect("already connected");
        assert_eq!(org.login_count(), 1);

        sessions.invalidate().await;
        assert!(!sessions.is_connected().await);
        sessions.ensure_connected().await.expect("reconnect");
        assert_eq!(org.login_count(), 2);
        assert_eq!(org.logout_count(), 0);
    }
}
