//! Forcelink MCP (Model Context Protocol) server.
//!
//! Exposes nine Salesforce CRM tools to MCP clients over stdio. Every tool call
//! resolves to a JSON [`ResponseEnvelope`](forcelink_core::ResponseEnvelope);
//! failures never surface as protocol errors.
//!
//! ## Architecture
//!
//! - `session`: the single lazily-connected Salesforce session
//! - `registry`: tool descriptors and the untyped handler seam
//! - `operations/`: the tool bodies (search, crud, relationship)
//! - `dispatcher`: routing, read-only gate, argument checks, error folding
//! - `server`: the rmcp `ServerHandler`
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use forcelink_client::RestConnector;
//! use forcelink_core::{AppConfig, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(LoadOptions::default())?;
//!     let connector = Arc::new(RestConnector::new(&config.salesforce)?);
//!     let server = forcelink_mcp::build_server(&config, connector)?;
//!     server.run_stdio().await
//! }
//! ```

pub mod dispatcher;
pub mod operations;
pub mod registry;
pub mod server;
pub mod session;

use std::sync::Arc;

use forcelink_client::Connector;
use forcelink_core::AppConfig;

pub use dispatcher::Dispatcher;
pub use registry::{ParamKind, ParamSpec, RegistryError, ToolDescriptor, ToolHandler, ToolRegistry};
pub use server::ForcelinkMcpServer;
pub use session::{ConnectionInfo, Credentials, SessionManager};

/// Wires session, registry and dispatcher for the given connector.
///
/// Nothing contacts Salesforce here; the first tool call logs in.
pub fn build_server(
    config: &AppConfig,
    connector: Arc<dyn Connector>,
) -> Result<ForcelinkMcpServer, RegistryError> {
    let session =
        Arc::new(SessionManager::new(connector, Credentials::from_config(&config.salesforce)));
    let registry = ToolRegistry::salesforce(&session)?;
    let dispatcher = Dispatcher::new(registry, session, config.salesforce.read_only_mode);
    Ok(ForcelinkMcpServer::new(Arc::new(dispatcher)))
}
