use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use forcelink_core::{ResponseEnvelope, ToolError};

use crate::operations;
use crate::session::SessionManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Object,
    StringArray,
}

impl ParamKind {
    fn schema(self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer", "minimum": 0 }),
            Self::Object => json!({ "type": "object" }),
            Self::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, description, required: true, default: None }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, description, required: false, default: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    /// Writes to the org; refused while read-only mode is on.
    pub mutating: bool,
}

impl ToolDescriptor {
    /// Required parameter names that are absent or null, in declaration order.
    pub fn missing_arguments(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.params
            .iter()
            .filter(|param| param.required)
            .filter(|param| matches!(arguments.get(param.name), None | Some(Value::Null)))
            .map(|param| param.name.to_string())
            .collect()
    }

    /// JSON schema object advertised to protocol clients.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        for param in &self.params {
            let mut schema = param.kind.schema();
            if let Value::Object(fields) = &mut schema {
                fields.insert("description".to_string(), json!(param.description));
                if let Some(default) = &param.default {
                    fields.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(param.name.to_string(), schema);
        }

        let required: Vec<&str> =
            self.params.iter().filter(|param| param.required).map(|param| param.name).collect();

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), json!(required));
        schema
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<ResponseEnvelope, ToolError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is registered more than once")]
    Duplicate(String),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registers the nine Salesforce tools against one shared session.
    pub fn salesforce(session: &Arc<SessionManager>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        operations::search::register(&mut registry, session)?;
        operations::crud::register(&mut registry, session)?;
        operations::relationship::register(&mut registry, session)?;
        Ok(registry)
    }

    pub fn register<T>(&mut self, tool: T) -> Result<(), RegistryError>
    where
        T: ToolHandler + 'static,
    {
        let name = tool.descriptor().name.to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        self.order.push(name.clone());
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|tool| tool.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
