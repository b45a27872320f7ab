use serde::Serialize;
use serde_json::Value;

/// The single result shape every tool call returns.
///
/// Fields are private so the two constructors are the only way to build one:
/// a success never carries `error`, a failure never carries `data`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
            details: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, message: None, data: None, error: Some(error.into()), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Pretty JSON with two-space indentation, the text payload of a tool result.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|error| {
            format!(
                "{{\n  \"success\": false,\n  \"error\": \"envelope serialization failed: {}\"\n}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::ResponseEnvelope;

    #[test]
    fn success_envelope_never_serializes_error() {
        let envelope = ResponseEnvelope::success("Retrieved Account record", json!({"Id": "001"}));
        let payload: Value = serde_json::from_str(&envelope.to_pretty_json()).expect("valid json");

        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"]["Id"], "001");
        assert!(payload.get("error").is_none());
        assert!(payload.get("details").is_none());
    }

    #[test]
    fn failure_envelope_never_serializes_data() {
        let envelope = ResponseEnvelope::failure("Unknown tool: nope")
            .with_details(json!({"supportedObjects": ["Account"]}));
        let payload: Value = serde_json::from_str(&envelope.to_pretty_json()).expect("valid json");

        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "Unknown tool: nope");
        assert_eq!(payload["details"]["supportedObjects"][0], "Account");
        assert!(payload.get("data").is_none());
        assert!(payload.get("message").is_none());
    }

    #[test]
    fn pretty_json_uses_two_space_indent() {
        let text = ResponseEnvelope::failure("boom").to_pretty_json();

        assert_eq!(text, "{\n  \"success\": false,\n  \"error\": \"boom\"\n}");
    }
}
