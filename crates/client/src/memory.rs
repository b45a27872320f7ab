//! In-process org standing in for Salesforce in tests.
//!
//! Queries understand a small SOQL subset: the first `FROM` object, one simple `WHERE`
//! (`Field = 'v'` or `Field LIKE '%v%'`) and a trailing `LIMIT`. Anything richer returns
//! every record of the object.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use forcelink_core::errors::SESSION_EXPIRED_CODE;
use forcelink_core::FieldError;

use crate::session::{Connector, CrmError, CrmSession, LoginInfo, QueryResult, SaveResult};

const INSTANCE_URL: &str = "https://forcelink-test.my.salesforce.com";
const ORGANIZATION_ID: &str = "00Dxx0000001gPLEAY";
const USER_ID: &str = "005xx000001X8UzAAK";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    Query(String),
    Search(String),
    Create(String),
    Update(String, String),
    Delete(String, String),
}

#[derive(Default)]
struct OrgState {
    records: HashMap<String, Vec<Map<String, Value>>>,
    failing_objects: HashSet<String>,
    login_failure: Option<String>,
    logout_failure: Option<String>,
    save_errors: Option<Vec<FieldError>>,
    search_result: Option<Value>,
    session_expired: bool,
    calls: Vec<RemoteCall>,
}

#[derive(Default)]
pub struct InMemoryOrg {
    state: RwLock<OrgState>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    next_id: AtomicU64,
    login_delay: Option<Duration>,
}

impl InMemoryOrg {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Slows every login down so concurrent callers overlap.
    pub fn with_login_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { login_delay: Some(delay), ..Self::default() })
    }

    pub fn connector(self: &Arc<Self>) -> InMemoryConnector {
        InMemoryConnector { org: Arc::clone(self) }
    }

    pub async fn insert(&self, object_type: &str, record: Value) {
        let Value::Object(record) = record else {
            return;
        };
        let mut state = self.state.write().await;
        state.records.entry(object_type.to_string()).or_default().push(record);
    }

    pub async fn records(&self, object_type: &str) -> Vec<Value> {
        let state = self.state.read().await;
        state
            .records
            .get(object_type)
            .map(|records| records.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Every query against this object fails with `INVALID_TYPE`.
    pub async fn fail_object(&self, object_type: &str) {
        self.state.write().await.failing_objects.insert(object_type.to_string());
    }

    pub async fn fail_login(&self, message: &str) {
        self.state.write().await.login_failure = Some(message.to_string());
    }

    pub async fn fail_logout(&self, message: &str) {
        self.state.write().await.logout_failure = Some(message.to_string());
    }

    /// Subsequent creates and updates are rejected with these field errors.
    pub async fn reject_saves(&self, errors: Vec<FieldError>) {
        self.state.write().await.save_errors = Some(errors);
    }

    pub async fn set_search_result(&self, result: Value) {
        self.state.write().await.search_result = Some(result);
    }

    /// Invalidates the current token until the next login.
    pub async fn expire_session(&self) {
        self.state.write().await.session_expired = true;
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.read().await.calls.clone()
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    fn allocate_id(&self, object_type: &str) -> String {
        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let prefix = match object_type {
            "Account" => "001",
            "Contact" => "003",
            "Opportunity" => "006",
            "Lead" => "00Q",
            "Case" => "500",
            _ => "a00",
        };
        format!("{prefix}xx{sequence:010}")
    }
}

pub struct InMemoryConnector {
    org: Arc<InMemoryOrg>,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn login(
        &self,
        username: &str,
        _password: &SecretString,
    ) -> Result<Arc<dyn CrmSession>, CrmError> {
        if let Some(delay) = self.org.login_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.org.state.write().await;
        if let Some(message) = &state.login_failure {
            return Err(CrmError::Auth(message.clone()));
        }
        state.session_expired = false;

        let login = self.org.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let info = LoginInfo {
            id: USER_ID.to_string(),
            organization_id: ORGANIZATION_ID.to_string(),
            url: format!("https://login.salesforce.com/id/{ORGANIZATION_ID}/{USER_ID}"),
            access_token: SecretString::from(format!("{username}-token-{login}")),
            instance_url: INSTANCE_URL.to_string(),
        };

        Ok(Arc::new(InMemorySession { org: Arc::clone(&self.org), info }))
    }
}

struct InMemorySession {
    org: Arc<InMemoryOrg>,
    info: LoginInfo,
}

fn expired() -> CrmError {
    CrmError::Api {
        message: "Session expired or invalid".to_string(),
        code: SESSION_EXPIRED_CODE.to_string(),
    }
}

fn missing_entity(id: &str) -> CrmError {
    CrmError::Api {
        message: format!("Provided external ID field does not exist or is not accessible: {id}"),
        code: "NOT_FOUND".to_string(),
    }
}

#[async_trait]
impl CrmSession for InMemorySession {
    fn login_info(&self) -> &LoginInfo {
        &self.info
    }

    async fn logout(&self) -> Result<(), CrmError> {
        self.org.logouts.fetch_add(1, Ordering::SeqCst);
        match &self.org.state.read().await.logout_failure {
            Some(message) => Err(CrmError::Api {
                message: message.clone(),
                code: "LOGOUT_FAILED".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn query(&self, soql: &str) -> Result<QueryResult, CrmError> {
        let mut state = self.org.state.write().await;
        state.calls.push(RemoteCall::Query(soql.to_string()));
        if state.session_expired {
            return Err(expired());
        }

        let Some(parsed) = ParsedQuery::parse(soql) else {
            return Err(CrmError::Api {
                message: format!("unexpected token in query: {soql}"),
                code: "MALFORMED_QUERY".to_string(),
            });
        };
        if state.failing_objects.contains(&parsed.object) {
            return Err(CrmError::Api {
                message: format!("sObject type '{}' is not supported.", parsed.object),
                code: "INVALID_TYPE".to_string(),
            });
        }

        let records: Vec<Value> = state
            .records
            .get(&parsed.object)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| parsed.matches(record))
                    .take(parsed.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .map(Value::Object)
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryResult { total_size: records.len() as u64, done: true, records })
    }

    async fn search(&self, sosl: &str) -> Result<Value, CrmError> {
        let mut state = self.org.state.write().await;
        state.calls.push(RemoteCall::Search(sosl.to_string()));
        if state.session_expired {
            return Err(expired());
        }

        Ok(state.search_result.clone().unwrap_or_else(|| json!({ "searchRecords": [] })))
    }

    async fn create(
        &self,
        object_type: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError> {
        let mut state = self.org.state.write().await;
        state.calls.push(RemoteCall::Create(object_type.to_string()));
        if state.session_expired {
            return Err(expired());
        }
        if let Some(errors) = &state.save_errors {
            return Ok(SaveResult::rejected(errors.clone()));
        }

        let id = self.org.allocate_id(object_type);
        let mut record = data.clone();
        record.insert("Id".to_string(), Value::String(id.clone()));
        state.records.entry(object_type.to_string()).or_default().push(record);

        Ok(SaveResult::saved(id))
    }

    async fn update(
        &self,
        object_type: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<SaveResult, CrmError> {
        let mut state = self.org.state.write().await;
        state.calls.push(RemoteCall::Update(object_type.to_string(), id.to_string()));
        if state.session_expired {
            return Err(expired());
        }
        if let Some(errors) = &state.save_errors {
            return Ok(SaveResult::rejected(errors.clone()));
        }

        let record = state
            .records
            .get_mut(object_type)
            .and_then(|records| records.iter_mut().find(|record| has_id(record, id)))
            .ok_or_else(|| missing_entity(id))?;
        for (field, value) in data {
            record.insert(field.clone(), value.clone());
        }

        Ok(SaveResult::saved(id))
    }

    async fn delete(&self, object_type: &str, id: &str) -> Result<SaveResult, CrmError> {
        let mut state = self.org.state.write().await;
        state.calls.push(RemoteCall::Delete(object_type.to_string(), id.to_string()));
        if state.session_expired {
            return Err(expired());
        }

        let records = state.records.get_mut(object_type).ok_or_else(|| missing_entity(id))?;
        let position =
            records.iter().position(|record| has_id(record, id)).ok_or_else(|| missing_entity(id))?;
        records.remove(position);

        Ok(SaveResult::saved(id))
    }
}

fn has_id(record: &Map<String, Value>, id: &str) -> bool {
    record.get("Id").and_then(Value::as_str) == Some(id)
}

#[derive(Debug, PartialEq, Eq)]
enum Filter {
    Equals { field: String, value: String },
    Contains { field: String, needle: String },
}

#[derive(Debug)]
struct ParsedQuery {
    object: String,
    filter: Option<Filter>,
    limit: Option<usize>,
}

impl ParsedQuery {
    fn parse(soql: &str) -> Option<Self> {
        let from = soql.find(" FROM ")?;
        let after = &soql[from + " FROM ".len()..];
        let object: String =
            after.chars().take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_').collect();
        if object.is_empty() {
            return None;
        }

        let rest = &after[object.len()..];
        let filter = rest.strip_prefix(" WHERE ").and_then(|clause| {
            let clause = clause.split(" ORDER BY ").next()?.split(" LIMIT ").next()?;
            parse_filter(clause.trim())
        });
        let limit = soql.rsplit_once(" LIMIT ").and_then(|(_, value)| value.trim().parse().ok());

        Some(Self { object, filter, limit })
    }

    fn matches(&self, record: &Map<String, Value>) -> bool {
        match &self.filter {
            None => true,
            Some(Filter::Equals { field, value }) => {
                record.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
            Some(Filter::Contains { field, needle }) => record
                .get(field)
                .and_then(Value::as_str)
                .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

fn parse_filter(clause: &str) -> Option<Filter> {
    if clause.contains('(') {
        return None;
    }
    if let Some((field, pattern)) = clause.split_once(" LIKE ") {
        let needle = pattern.trim().trim_matches('\'').trim_matches('%');
        return Some(Filter::Contains { field: field.trim().to_string(), needle: needle.to_string() });
    }
    let (field, value) = clause.split_once(" = ")?;
    Some(Filter::Equals {
        field: field.trim().to_string(),
        value: value.trim().trim_matches('\'').to_string(),
    })
}
