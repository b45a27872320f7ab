//! Routes one tool invocation to its handler and folds every outcome into an envelope.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use forcelink_core::{normalize, ResponseEnvelope, ToolError};

use crate::registry::ToolRegistry;
use crate::session::SessionManager;

pub struct Dispatcher {
    registry: ToolRegistry,
    session: Arc<SessionManager>,
    read_only: bool,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, session: Arc<SessionManager>, read_only: bool) -> Self {
        Self { registry, session, read_only }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Never fails: errors come back as `success: false` envelopes.
    pub async fn dispatch(&self, name: &str, arguments: Option<Map<String, Value>>) -> ResponseEnvelope {
        let correlation_id = Uuid::new_v4();
        let span = info_span!("tool_call", tool = %name, correlation_id = %correlation_id);

        async move {
            let started = Instant::now();
            let outcome = self.route(name, arguments.unwrap_or_default()).await;

            let envelope = match outcome {
                Ok(envelope) => envelope,
                Err(error) => {
                    if error.is_session_expired() {
                        self.session.invalidate().await;
                    }
                    normalize(&error, name)
                }
            };

            info!(
                event_name = "tool.completed",
                success = envelope.is_success(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tool call finished"
            );
            envelope
        }
        .instrument(span)
        .await
    }

    async fn route(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ResponseEnvelope, ToolError> {
        let handler =
            self.registry.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let descriptor = handler.descriptor();

        if self.read_only && descriptor.mutating {
            return Err(ToolError::ReadOnly { tool: name.to_string() });
        }

        self.session.ensure_connected().await?;

        let missing = descriptor.missing_arguments(&arguments);
        if !missing.is_empty() {
            return Err(ToolError::MissingArguments { tool: name.to_string(), missing });
        }

        handler.invoke(arguments).await
    }
}
