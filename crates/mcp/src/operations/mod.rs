//! The nine Salesforce tools, grouped by what they touch.

pub mod crud;
pub mod relationship;
pub mod search;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use forcelink_core::catalog::DEFAULT_LIMIT;
use forcelink_core::{ResponseEnvelope, ToolError};

use crate::registry::{ToolDescriptor, ToolHandler};

/// A tool body that receives already-deserialized parameters.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Params: DeserializeOwned + Send + 'static;

    fn descriptor() -> ToolDescriptor;

    async fn run(&self, params: Self::Params) -> Result<ResponseEnvelope, ToolError>;
}

/// Adapts an [`Operation`] to the untyped [`ToolHandler`] seam.
pub struct Typed<O: Operation> {
    descriptor: ToolDescriptor,
    operation: O,
}

impl<O: Operation> Typed<O> {
    pub fn new(operation: O) -> Self {
        Self { descriptor: O::descriptor(), operation }
    }
}

#[async_trait]
impl<O: Operation> ToolHandler for Typed<O> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<ResponseEnvelope, ToolError> {
        let params = serde_json::from_value::<O::Params>(Value::Object(arguments)).map_err(
            |error| ToolError::InvalidArguments {
                tool: self.descriptor.name.to_string(),
                reason: error.to_string(),
            },
        )?;

        self.operation.run(params).await
    }
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
