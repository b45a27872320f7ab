//! MCP server implementation.
//!
//! Tool discovery renders the registry descriptors; every call is handed to the
//! [`Dispatcher`] and its envelope returned as a single text block.

use std::future::Future;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::transport::IntoTransport;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::registry::ToolDescriptor;

#[derive(Clone)]
pub struct ForcelinkMcpServer {
    dispatcher: Arc<Dispatcher>,
}

impl ForcelinkMcpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serves over stdin/stdout until the client disconnects or Ctrl-C, then logs out.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "mcp.starting", transport = "stdio", "starting MCP server");
        self.serve_until(rmcp::transport::stdio(), tokio::signal::ctrl_c()).await
    }

    /// Serves `transport` until the peer goes away or `shutdown` resolves.
    /// The Salesforce session is disconnected either way.
    pub async fn serve_until<T, E, A, S>(self, transport: T, shutdown: S) -> anyhow::Result<()>
    where
        T: IntoTransport<RoleServer, E, A>,
        E: std::error::Error + Send + Sync + 'static,
        S: Future<Output = std::io::Result<()>>,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        let service = self.serve(transport).await?;

        let outcome = tokio::select! {
            reason = service.waiting() => reason
                .map(|reason| format!("{reason:?}"))
                .map_err(anyhow::Error::from),
            signal = shutdown => signal
                .map(|()| "shutdown signal".to_string())
                .map_err(anyhow::Error::from),
        };

        dispatcher.session().disconnect().await;
        info!(event_name = "mcp.stopped", reason = ?outcome, "MCP server shutdown complete");
        outcome.map(|_| ())
    }
}

fn to_tool(descriptor: &ToolDescriptor) -> Tool {
    Tool::new(descriptor.name, descriptor.description, Arc::new(descriptor.input_schema()))
}

impl ServerHandler for ForcelinkMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Salesforce CRM tools. Search with search_records or global_search, read with \
                 get_record, soql_query, get_related_records and get_record_history. \
                 create_record, update_record and delete_record are refused while the server \
                 runs in read-only mode. Every result is a JSON envelope with a `success` flag."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self.dispatcher.registry().descriptors().into_iter().map(to_tool).collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self.dispatcher.dispatch(&request.name, request.arguments).await;
        Ok(CallToolResult::success(vec![Content::text(envelope.to_pretty_json())]))
    }
}
