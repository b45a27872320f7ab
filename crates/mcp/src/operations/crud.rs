use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use forcelink_core::catalog::{default_fields, record_query, required_create_fields};
use forcelink_core::soql::{sanitize, validate_required_fields};
use forcelink_core::{ResponseEnvelope, ToolError};

use super::{Operation, Typed};
use crate::registry::{ParamKind, ParamSpec, RegistryError, ToolDescriptor, ToolRegistry};
use crate::session::SessionManager;

pub fn register(
    registry: &mut ToolRegistry,
    session: &Arc<SessionManager>,
) -> Result<(), RegistryError> {
    registry.register(Typed::new(GetRecord { session: Arc::clone(session) }))?;
    registry.register(Typed::new(CreateRecord { session: Arc::clone(session) }))?;
    registry.register(Typed::new(UpdateRecord { session: Arc::clone(session) }))?;
    registry.register(Typed::new(DeleteRecord { session: Arc::clone(session) }))?;
    Ok(())
}

fn object_type_param() -> ParamSpec {
    ParamSpec::required("objectType", ParamKind::String, "Salesforce object type, e.g. Account")
}

fn record_id_param() -> ParamSpec {
    ParamSpec::required("recordId", ParamKind::String, "Salesforce record id")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordParams {
    pub object_type: String,
    pub record_id: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

pub struct GetRecord {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for GetRecord {
    type Params = GetRecordParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "get_record",
            description: "Fetch one record by id",
            params: vec![
                object_type_param(),
                record_id_param(),
                ParamSpec::optional(
                    "fields",
                    ParamKind::StringArray,
                    "Fields to return; defaults to a per-object set",
                ),
            ],
            mutating: false,
        }
    }

    async fn run(&self, params: GetRecordParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let object_type = sanitize(&params.object_type)?;
        let record_id = sanitize(&params.record_id)?;
        let fields = match params.fields {
            Some(fields) if !fields.is_empty() => {
                fields.iter().map(|field| sanitize(field)).collect::<Result<Vec<_>, _>>()?
            }
            _ => default_fields(&object_type).iter().map(|field| field.to_string()).collect(),
        };

        let result = remote.query(&record_query(&object_type, &record_id, &fields)).await?;
        let Some(record) = result.records.into_iter().next() else {
            return Err(ToolError::RecordNotFound { object_type, record_id });
        };

        Ok(ResponseEnvelope::success(format!("Retrieved {object_type} record"), record))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordParams {
    pub object_type: String,
    pub data: Map<String, Value>,
}

pub struct CreateRecord {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for CreateRecord {
    type Params = CreateRecordParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "create_record",
            description: "Create a record of the given object type",
            params: vec![
                object_type_param(),
                ParamSpec::required("data", ParamKind::Object, "Field values for the new record"),
            ],
            mutating: true,
        }
    }

    async fn run(&self, params: CreateRecordParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let object_type = sanitize(&params.object_type)?;
        validate_required_fields(&params.data, required_create_fields(&object_type))?;

        let id = remote.create(&object_type, &params.data).await?.into_result()?;
        info!(event_name = "tool.record_created", object_type = %object_type, id = ?id, "record created");

        let mut data = Map::new();
        data.insert("id".to_string(), json!(id));
        data.extend(params.data);
        Ok(ResponseEnvelope::success(
            format!("Created {object_type} record successfully"),
            Value::Object(data),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordParams {
    pub object_type: String,
    pub record_id: String,
    pub data: Map<String, Value>,
}

pub struct UpdateRecord {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for UpdateRecord {
    type Params = UpdateRecordParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "update_record",
            description: "Update fields on an existing record",
            params: vec![
                object_type_param(),
                record_id_param(),
                ParamSpec::required("data", ParamKind::Object, "Field values to change"),
            ],
            mutating: true,
        }
    }

    async fn run(&self, params: UpdateRecordParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let object_type = sanitize(&params.object_type)?;
        let record_id = sanitize(&params.record_id)?;

        remote.update(&object_type, &record_id, &params.data).await?.into_result()?;
        info!(event_name = "tool.record_updated", object_type = %object_type, id = %record_id, "record updated");

        Ok(ResponseEnvelope::success(
            format!("Updated {object_type} record successfully"),
            json!({ "id": record_id, "updatedFields": params.data }),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordParams {
    pub object_type: String,
    pub record_id: String,
}

pub struct DeleteRecord {
    session: Arc<SessionManager>,
}

#[async_trait]
impl Operation for DeleteRecord {
    type Params = DeleteRecordParams;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "delete_record",
            description: "Delete a record by id",
            params: vec![object_type_param(), record_id_param()],
            mutating: true,
        }
    }

    async fn run(&self, params: DeleteRecordParams) -> Result<ResponseEnvelope, ToolError> {
        let remote = self.session.active_session().await?;
        let object_type = sanitize(&params.object_type)?;
        let record_id = sanitize(&params.record_id)?;

        remote.delete(&object_type, &record_id).await?.into_result()?;
        info!(event_name = "tool.record_deleted", object_type = %object_type, id = %record_id, "record deleted");

        Ok(ResponseEnvelope::success(
            format!("Deleted {object_type} record successfully"),
            json!({ "id": record_id }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;
    use serde_json::{json, Map, Value};

    use forcelink_client::{InMemoryOrg, RemoteCall};
    use forcelink_core::ToolError;

    use super::{CreateRecord, CreateRecordParams, GetRecord, GetRecordParams};
    use crate::operations::Operation;
    use crate::session::{Credentials, SessionManager};

    async fn connected(org: &Arc<InMemoryOrg>) -> Arc<SessionManager> {
        let session = Arc::new(SessionManager::new(
            Arc::new(org.connector()),
            Credentials {
                username: "ops@example.com".to_string(),
                password: SecretString::from("pw".to_string()),
            },
        ));
        session.ensure_connected().await.expect("connect");
        session
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn get_record_uses_default_fields() {
        let org = InMemoryOrg::new();
        org.insert("Lead", json!({"Id": "00Qxx1", "Name": "Jane Roe", "Company": "Initech"})).await;
        let get = GetRecord { session: connected(&org).await };

        let envelope = get
            .run(GetRecordParams {
                object_type: "Lead".to_string(),
                record_id: "00Qxx1".to_string(),
                fields: Some(Vec::new()),
            })
            .await
            .expect("record");

        assert_eq!(envelope.message(), Some("Retrieved Lead record"));
        assert_eq!(envelope.data().map(|record| &record["Company"]), Some(&json!("Initech")));
        assert_eq!(
            org.calls().await[0],
            RemoteCall::Query(
                "SELECT Id, Name, Email, Phone, Company, Title, Status, Source FROM Lead \
                 WHERE Id = '00Qxx1'"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn create_checks_required_fields_before_remote_call() {
        let org = InMemoryOrg::new();
        let create = CreateRecord { session: connected(&org).await };

        let error = create
            .run(CreateRecordParams {
                object_type: "Opportunity".to_string(),
                data: object(json!({"Name": "Big deal", "CloseDate": ""})),
            })
            .await
            .expect_err("missing fields");

        assert_eq!(
            error,
            ToolError::RequiredFieldMissing(vec!["StageName".to_string(), "CloseDate".to_string()])
        );
        assert!(org.calls().await.is_empty());
    }

    #[tokio::test]
    async fn create_echoes_id_and_data() {
        let org = InMemoryOrg::new();
        let create = CreateRecord { session: connected(&org).await };

        let envelope = create
            .run(CreateRecordParams {
                object_type: "Account".to_string(),
                data: object(json!({"Name": "Acme", "Industry": "Energy"})),
            })
            .await
            .expect("created");

        let data = envelope.data().cloned().unwrap_or_default();
        assert_eq!(data["Name"], "Acme");
        assert!(data["id"].as_str().is_some_and(|id| id.starts_with("001")));
        assert_eq!(org.records("Account").await.len(), 1);
    }
}
