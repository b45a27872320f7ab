pub mod catalog;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod soql;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, SalesforceConfig};
pub use envelope::ResponseEnvelope;
pub use errors::{describe, normalize, FieldError, ToolError};
