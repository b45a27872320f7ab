use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use forcelink_client::CrmSession;
use forcelink_core::catalog::{global_search_query, name_search_query, DEFAULT_SEARCH_OBJECTS};
use forcelink_core::soql::sanitize;
use forcelink_core::{describe, ResponseEnvelope, ToolError};

use super::{default_limit, Operation, Typed};
use crate::registry::{ParamKind, ParamSpec, RegistryError, ToolDescriptor, ToolRegistry};
use crate::session::SessionManager;

pub fn register(
    registry: &mut ToolRegistry,
    session: &Arc<SessionManager>,
) -> Result<(), RegistryError> {
    registry.register(Typed::new(SearchRecords { session: Arc::clone(session) }))?;
    registry.register(Typed::new(SoqlQuery { session: Arc::clone(session) }))?;
    registry.register(Typed::new(GlobalSearch { session: Arc::clone(session) }))?;
    Ok(())
}

fn default_objects() -> Vec<String> {
    DEFAULT_SEARCH_OBJECTS.iter().map(|object| object.to_string()).collect()
}

#[derive(Debug, Deserialize)]
pub struct SearchRecordsParams {
    pub query: String,
    #[serde(default = "default_objects")]
    pub objects: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub struct SearchRecords {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for SearchRecords {
    type Params = SearchRecordsParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "search_records",
            description: "Search records by name across several Salesforce object types",
            params: vec![
                ParamSpec::required("query", ParamKind::String, "Text to match against Name"),
                ParamSpec::optional("objects", ParamKind::StringArray, "Object types to search")
                    .with_default(json!(DEFAULT_SEARCH_OBJECTS)),
                ParamSpec::optional("limit", ParamKind::Integer, "Total rows across all types")
                    .with_default(json!(default_limit())),
            ],
            mutating: false,
        }
    }

    async fn run(&self, params: SearchRecordsParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let term = sanitize(&params.query)?;
        let objects = if params.objects.is_empty() { default_objects() } else { params.objects };
        let per_type = params.limit.div_ceil(objects.len() as u32);

        info!(
            event_name = "tool.search_records",
            query = %term,
            objects = ?objects,
            per_type,
            "searching records"
        );

        let mut results = Map::new();
        for object in &objects {
            let records = match search_one(remote.as_ref(), object, &term, per_type).await {
                Ok(records) => records,
                Err(error) if error.is_session_expired() => return Err(error),
                Err(error) => {
                    warn!(
                        event_name = "tool.search_records.object_failed",
                        object_type = %object,
                        error = %describe(&error),
                        "error searching object type"
                    );
                    Vec::new()
                }
            };
            results.insert(object.clone(), Value::Array(records));
        }

        let total: usize =
            results.values().map(|records| records.as_array().map_or(0, Vec::len)).sum();
        Ok(ResponseEnvelope::success(
            format!("Found {total} records matching \"{}\"", params.query),
            json!({ "totalSize": total, "results": results }),
        ))
    }
}

async fn search_one(
    remote: &dyn CrmSession,
    object: &str,
    term: &str,
    limit: u32,
) -> Result<Vec<Value>, ToolError> {
    let object = sanitize(object)?;
    let result = remote.query(&name_search_query(&object, term, limit)).await?;
    Ok(result.records)
}

#[derive(Debug, Deserialize)]
pub struct SoqlQueryParams {
    pub query: String,
}

/// Runs the caller's statement verbatim.
pub struct SoqlQuery {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for SoqlQuery {
    type Params = SoqlQueryParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "soql_query",
            description: "Execute a SOQL query and return the matching records",
            params: vec![ParamSpec::required("query", ParamKind::String, "SOQL statement")],
            mutating: false,
        }
    }

    async fn run(&self, params: SoqlQueryParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let result = remote.query(&params.query).await?;

        Ok(ResponseEnvelope::success(
            format!("Query executed successfully. Found {} records.", result.total_size),
            json!({
                "totalSize": result.total_size,
                "done": result.done,
                "records": result.records,
            }),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSearchParams {
    pub search_term: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub struct GlobalSearch {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for GlobalSearch {
    type Params = GlobalSearchParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "global_search",
            description: "Full-text SOSL search across accounts, contacts, leads and opportunities",
            params: vec![
                ParamSpec::required("searchTerm", ParamKind::String, "Text to search for"),
                ParamSpec::optional("limit", ParamKind::Integer, "Maximum rows returned")
                    .with_default(json!(default_limit())),
            ],
            mutating: false,
        }
    }

    async fn run(&self, params: GlobalSearchParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let term = sanitize(&params.search_term)?;
        let result = remote.search(&global_search_query(&term, params.limit)).await?;

        Ok(ResponseEnvelope::success(
            format!("Global search completed for \"{}\"", params.search_term),
            result,
        ))
    }
}
