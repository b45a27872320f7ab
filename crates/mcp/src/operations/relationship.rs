use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use forcelink_core::catalog::{history_query, relationship_query};
use forcelink_core::soql::sanitize;
use forcelink_core::{ResponseEnvelope, ToolError};

use super::{default_limit, Operation, Typed};
use crate::registry::{ParamKind, ParamSpec, RegistryError, ToolDescriptor, ToolRegistry};
use crate::session::SessionManager;

pub fn register(
    registry: &mut ToolRegistry,
    session: &Arc<SessionManager>,
) -> Result<(), RegistryError> {
    registry.register(Typed::new(GetRelatedRecords { session: Arc::clone(session) }))?;
    registry.register(Typed::new(GetRecordHistory { session: Arc::clone(session) }))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRecordsParams {
    pub object_type: String,
    pub record_id: String,
    pub relationship: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub struct GetRelatedRecords {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for GetRelatedRecords {
    type Params = RelatedRecordsParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_related_records",
            description: "List records linked to a parent record through a known relationship",
            params: vec![
                ParamSpec::required("objectType", ParamKind::String, "Parent object type"),
                ParamSpec::required("recordId", ParamKind::String, "Parent record id"),
                ParamSpec::required(
                    "relationship",
                    ParamKind::String,
                    "Relationship name, e.g. Contacts or Opportunities",
                ),
                ParamSpec::optional("limit", ParamKind::Integer, "Maximum rows returned")
                    .with_default(json!(default_limit())),
            ],
            mutating: false,
        }
    }

    async fn run(&self, params: RelatedRecordsParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let record_id = sanitize(&params.record_id)?;
        let query =
            relationship_query(&params.object_type, &params.relationship, &record_id, params.limit)?;

        let result = remote.query(&query).await?;
        Ok(ResponseEnvelope::success(
            format!("Found {} related {} records", result.total_size, params.relationship),
            json!({
                "parentRecord": { "objectType": params.object_type, "recordId": record_id },
                "relationship": params.relationship,
                "totalSize": result.total_size,
                "records": result.records,
            }),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHistoryParams {
    pub object_type: String,
    pub record_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub struct GetRecordHistory {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for GetRecordHistory {
    type Params = RecordHistoryParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_record_history",
            description: "Field history entries for a record, newest first",
            params: vec![
                ParamSpec::required("objectType", ParamKind::String, "Tracked object type"),
                ParamSpec::required("recordId", ParamKind::String, "Record id"),
                ParamSpec::optional("limit", ParamKind::Integer, "Maximum rows returned")
                    .with_default(json!(default_limit())),
            ],
            mutating: false,
        }
    }

    async fn run(&self, params: RecordHistoryParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let record_id = sanitize(&params.record_id)?;
        let query = history_query(&params.object_type, &record_id, params.limit)?;

        let result = remote.query(&query).await?;
        Ok(ResponseEnvelope::success(
            format!("Found {} history records for {}", result.total_size, params.object_type),
            json!({
                "recordId": record_id,
                "objectType": params.object_type,
                "totalSize": result.total_size,
                "historyRecords": result.records,
            }),
        ))
    }
}
