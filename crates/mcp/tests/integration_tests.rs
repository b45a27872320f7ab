//! End-to-end tests for the Forcelink MCP server.
//!
//! The dispatcher runs against an in-memory org; the last group drives the
//! real rmcp client/server pair over an in-process duplex transport.

use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{CallToolRequestParams, ClientInfo};
use rmcp::{ClientHandler, ServiceExt};
use serde_json::{json, Map, Value};

use forcelink_client::{InMemoryOrg, RemoteCall};
use forcelink_core::{AppConfig, FieldError, ResponseEnvelope};
use forcelink_mcp::{build_server, Dispatcher, ForcelinkMcpServer};

fn server(org: &Arc<InMemoryOrg>, read_only: bool) -> ForcelinkMcpServer {
    let mut config = AppConfig::default();
    config.salesforce.username = "ops@example.com".to_string();
    config.salesforce.read_only_mode = read_only;
    build_server(&config, Arc::new(org.connector())).expect("server")
}

fn dispatcher(org: &Arc<InMemoryOrg>, read_only: bool) -> Arc<Dispatcher> {
    Arc::clone(server(org, read_only).dispatcher())
}

fn args(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

async fn call(dispatcher: &Dispatcher, tool: &str, arguments: Value) -> ResponseEnvelope {
    dispatcher.dispatch(tool, args(arguments)).await
}

// ── Dispatch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_never_contacts_salesforce() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);

    let envelope = call(&dispatcher, "drop_everything", json!({})).await;

    assert_eq!(envelope.error(), Some("Unknown tool: drop_everything"));
    assert_eq!(org.login_count(), 0);
    assert!(org.calls().await.is_empty());
}

#[tokio::test]
async fn first_call_connects_lazily() {
    let org = InMemoryOrg::new();
    org.insert("Account", json!({"Id": "001xx1", "Name": "Acme"})).await;
    let dispatcher = dispatcher(&org, true);
    assert!(!dispatcher.session().is_connected().await);

    let envelope =
        call(&dispatcher, "get_record", json!({"objectType": "Account", "recordId": "001xx1"}))
            .await;

    assert!(envelope.is_success());
    assert_eq!(envelope.data().map(|record| &record["Name"]), Some(&json!("Acme")));
    assert!(dispatcher.session().is_connected().await);
    assert_eq!(org.login_count(), 1);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_login() {
    let org = InMemoryOrg::with_login_delay(Duration::from_millis(50));
    let dispatcher = dispatcher(&org, true);

    let query = json!({"query": "SELECT Id FROM Account"});
    let (first, second, third) = tokio::join!(
        call(&dispatcher, "soql_query", query.clone()),
        call(&dispatcher, "soql_query", query.clone()),
        call(&dispatcher, "soql_query", query),
    );

    assert!(first.is_success() && second.is_success() && third.is_success());
    assert_eq!(org.login_count(), 1);
    assert_eq!(org.calls().await.len(), 3);
}

#[tokio::test]
async fn connection_failure_is_reported_as_envelope() {
    let org = InMemoryOrg::new();
    org.fail_login("INVALID_LOGIN: Invalid username, password, security token").await;
    let dispatcher = dispatcher(&org, true);

    let envelope = call(&dispatcher, "soql_query", json!({"query": "SELECT Id FROM Lead"})).await;

    assert_eq!(
        envelope.error(),
        Some(
            "Failed to authenticate with Salesforce: INVALID_LOGIN: Invalid username, password, \
             security token"
        )
    );
    assert!(!dispatcher.session().is_connected().await);
}

#[tokio::test]
async fn expired_session_reconnects_on_next_call() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);
    let query = json!({"query": "SELECT Id FROM Contact"});

    assert!(call(&dispatcher, "soql_query", query.clone()).await.is_success());
    org.expire_session().await;

    let expired = call(&dispatcher, "soql_query", query.clone()).await;
    assert_eq!(
        expired.error(),
        Some("Salesforce API error: Session expired or invalid (INVALID_SESSION_ID)")
    );
    assert!(!dispatcher.session().is_connected().await);

    assert!(call(&dispatcher, "soql_query", query).await.is_success());
    assert_eq!(org.login_count(), 2);
}

#[tokio::test]
async fn expired_session_during_search_reconnects_on_next_call() {
    let org = InMemoryOrg::new();
    org.insert("Account", json!({"Id": "001xx1", "Name": "Acme"})).await;
    let dispatcher = dispatcher(&org, true);
    let search = json!({"query": "Acme", "objects": ["Account", "Lead"]});

    assert!(call(&dispatcher, "search_records", search.clone()).await.is_success());
    org.expire_session().await;

    let expired = call(&dispatcher, "search_records", search.clone()).await;
    assert_eq!(
        expired.error(),
        Some("Salesforce API error: Session expired or invalid (INVALID_SESSION_ID)")
    );
    assert!(!dispatcher.session().is_connected().await);

    let recovered = call(&dispatcher, "search_records", search).await;
    assert_eq!(recovered.message(), Some("Found 1 records matching \"Acme\""));
    assert_eq!(org.login_count(), 2);
}

// ── Read-only mode ───────────────────────────────────────────────────

#[tokio::test]
async fn read_only_mode_blocks_writes_before_login() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);

    let envelope =
        call(&dispatcher, "delete_record", json!({"objectType": "Account", "recordId": "001xx1"}))
            .await;

    assert_eq!(
        envelope.error(),
        Some("Read-only mode is enabled; delete_record is not permitted (READ_ONLY_MODE)")
    );
    assert_eq!(org.login_count(), 0);
    assert!(org.calls().await.is_empty());
}

#[tokio::test]
async fn writes_are_allowed_when_read_only_is_off() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, false);

    let created = call(
        &dispatcher,
        "create_record",
        json!({"objectType": "Account", "data": {"Name": "Acme", "Industry": "Energy"}}),
    )
    .await;
    assert_eq!(created.message(), Some("Created Account record successfully"));
    let id = created.data().and_then(|data| data["id"].as_str()).unwrap_or_default().to_string();

    let updated = call(
        &dispatcher,
        "update_record",
        json!({"objectType": "Account", "recordId": id, "data": {"Industry": "Mining"}}),
    )
    .await;
    assert_eq!(updated.data(), Some(&json!({"id": id, "updatedFields": {"Industry": "Mining"}})));
    assert_eq!(org.records("Account").await[0]["Industry"], "Mining");

    let deleted =
        call(&dispatcher, "delete_record", json!({"objectType": "Account", "recordId": id})).await;
    assert_eq!(deleted.message(), Some("Deleted Account record successfully"));
    assert!(org.records("Account").await.is_empty());
}

// ── Tool semantics ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_record_has_a_specific_message() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);

    let envelope =
        call(&dispatcher, "get_record", json!({"objectType": "Contact", "recordId": "003xx9"}))
            .await;

    assert_eq!(envelope.error(), Some("No Contact record found with ID: 003xx9"));
}

#[tokio::test]
async fn create_without_required_fields_lists_them() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, false);

    let envelope = call(
        &dispatcher,
        "create_record",
        json!({"objectType": "Contact", "data": {"FirstName": "Ann"}}),
    )
    .await;

    assert_eq!(
        envelope.error(),
        Some("Missing required fields: LastName (REQUIRED_FIELD_MISSING)")
    );
    assert_eq!(envelope.details(), Some(&json!({"missingFields": ["LastName"]})));
    assert!(org.calls().await.is_empty());
}

#[tokio::test]
async fn remote_rejection_surfaces_field_errors() {
    let org = InMemoryOrg::new();
    org.reject_saves(vec![FieldError::new(
        "Value too long for field",
        vec!["Name".to_string()],
    )])
    .await;
    let dispatcher = dispatcher(&org, false);

    let envelope =
        call(&dispatcher, "create_record", json!({"objectType": "Account", "data": {"Name": "x"}}))
            .await;

    assert_eq!(
        envelope.error(),
        Some("Validation errors: Value too long for field (fields: Name)")
    );
    assert_eq!(
        envelope.details(),
        Some(&json!({"errors": [{"message": "Value too long for field", "fields": ["Name"]}]}))
    );
}

#[tokio::test]
async fn search_records_tolerates_a_failing_object_type() {
    let org = InMemoryOrg::new();
    for name in ["Acme East", "Acme West", "Acme North"] {
        org.insert("Account", json!({"Id": "001xx", "Name": name})).await;
    }
    org.fail_object("Lead").await;
    let dispatcher = dispatcher(&org, true);

    let envelope = call(
        &dispatcher,
        "search_records",
        json!({"query": "Acme", "objects": ["Account", "Lead"], "limit": 10}),
    )
    .await;

    assert_eq!(envelope.message(), Some("Found 3 records matching \"Acme\""));
    let data = envelope.data().cloned().unwrap_or_default();
    assert_eq!(data["totalSize"], 3);
    assert_eq!(data["results"]["Lead"], json!([]));
    assert_eq!(data["results"]["Account"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn dangerous_search_term_is_rejected() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);

    let envelope =
        call(&dispatcher, "global_search", json!({"searchTerm": "Acme' OR 1=1 --"})).await;

    assert_eq!(
        envelope.error(),
        Some("Potentially dangerous SQL pattern detected: -- (INVALID_QUERY)")
    );
    assert!(org.calls().await.is_empty());
}

#[tokio::test]
async fn unsupported_relationship_lists_alternatives() {
    let org = InMemoryOrg::new();
    let dispatcher = dispatcher(&org, true);

    let envelope = call(
        &dispatcher,
        "get_related_records",
        json!({"objectType": "Account", "recordId": "001xx1", "relationship": "Invoices"}),
    )
    .await;

    assert_eq!(envelope.error(), Some("Relationship 'Invoices' not supported for Account"));
    assert_eq!(
        envelope.details(),
        Some(&json!({"supportedRelationships": ["Contacts", "Opportunities", "Cases"]}))
    );
}

#[tokio::test]
async fn record_history_is_read_from_history_object() {
    let org = InMemoryOrg::new();
    org.insert(
        "OpportunityHistory",
        json!({"Id": "008xx1", "OpportunityId": "006xx1", "StageName": "Closed Won"}),
    )
    .await;
    let dispatcher = dispatcher(&org, true);

    let envelope = call(
        &dispatcher,
        "get_record_history",
        json!({"objectType": "Opportunity", "recordId": "006xx1", "limit": 5}),
    )
    .await;

    assert_eq!(envelope.message(), Some("Found 1 history records for Opportunity"));
    assert!(matches!(
        &org.calls().await[0],
        RemoteCall::Query(soql) if soql.contains("FROM OpportunityHistory") && soql.contains("OpportunityId = '006xx1'")
    ));
}

// ── MCP transport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct TestClientHandler;

impl ClientHandler for TestClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo::default()
    }
}

async fn connect_client(
    server: ForcelinkMcpServer,
) -> rmcp::service::RunningService<rmcp::RoleClient, TestClientHandler> {
    let (server_transport, client_transport) = tokio::io::duplex(65536);

    tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        anyhow::Ok(())
    });

    TestClientHandler.serve(client_transport).await.expect("client setup failed")
}

#[tokio::test]
async fn list_tools_over_mcp_exposes_schemas() {
    let org = InMemoryOrg::new();
    let client = connect_client(server(&org, true)).await;

    let tools = client.list_tools(None).await.expect("list_tools failed");

    assert_eq!(tools.tools.len(), 9);
    let get_record = tools
        .tools
        .iter()
        .find(|tool| tool.name == "get_record")
        .expect("get_record listed");
    assert_eq!(get_record.input_schema["required"], json!(["objectType", "recordId"]));
    assert_eq!(org.login_count(), 0);

    client.cancel().await.expect("cancel");
}

#[tokio::test]
async fn call_tool_over_mcp_returns_envelope_text() {
    let org = InMemoryOrg::new();
    org.set_search_result(json!({"searchRecords": [{"Id": "001xx1"}]})).await;
    let client = connect_client(server(&org, true)).await;

    let result = client
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "global_search".into(),
            arguments: args(json!({"searchTerm": "Acme"})),
            task: None,
        })
        .await
        .expect("call_tool failed");

    let text = result
        .content
        .first()
        .and_then(|content| content.raw.as_text())
        .map(|text| text.text.clone())
        .unwrap_or_default();
    let envelope: Value = serde_json::from_str(&text).expect("envelope json");
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["searchRecords"][0]["Id"], "001xx1");

    client.cancel().await.expect("cancel");
}

#[tokio::test]
async fn blocked_write_over_mcp_is_not_a_protocol_error() {
    let org = InMemoryOrg::new();
    let client = connect_client(server(&org, true)).await;

    let result = client
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "create_record".into(),
            arguments: args(json!({"objectType": "Lead", "data": {}})),
            task: None,
        })
        .await
        .expect("call_tool failed");

    let text = result
        .content
        .first()
        .and_then(|content| content.raw.as_text())
        .map(|text| text.text.clone())
        .unwrap_or_default();
    assert!(text.contains("\"success\": false"));
    assert!(text.contains("READ_ONLY_MODE"));

    client.cancel().await.expect("cancel");
}

#[tokio::test]
async fn shutdown_signal_logs_out_of_salesforce() {
    let org = InMemoryOrg::new();
    let server = server(&org, true);
    let dispatcher = Arc::clone(server.dispatcher());
    let (server_transport, client_transport) = tokio::io::duplex(65536);
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let serving = tokio::spawn(server.serve_until(server_transport, async move {
        let _ = stopped.await;
        Ok(())
    }));
    let client = TestClientHandler.serve(client_transport).await.expect("client setup failed");

    client
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "soql_query".into(),
            arguments: args(json!({"query": "SELECT Id FROM Account"})),
            task: None,
        })
        .await
        .expect("call_tool failed");
    assert!(dispatcher.session().is_connected().await);

    let _ = stop.send(());
    serving.await.expect("server task").expect("clean shutdown");

    assert_eq!(org.logout_count(), 1);
    assert!(!dispatcher.session().is_connected().await);
}

#[tokio::test]
async fn client_disconnect_logs_out_of_salesforce() {
    let org = InMemoryOrg::new();
    let server = server(&org, true);
    let dispatcher = Arc::clone(server.dispatcher());
    let (server_transport, client_transport) = tokio::io::duplex(65536);

    let serving =
        tokio::spawn(server.serve_until(server_transport, std::future::pending::<std::io::Result<()>>()));
    let client = TestClientHandler.serve(client_transport).await.expect("client setup failed");

    client
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "global_search".into(),
            arguments: args(json!({"searchTerm": "Acme"})),
            task: None,
        })
        .await
        .expect("call_tool failed");
    client.cancel().await.expect("cancel");
    serving.await.expect("server task").expect("clean shutdown");

    assert_eq!(org.logout_count(), 1);
    assert!(!dispatcher.session().is_connected().await);
}
