//! Query-string safety helpers shared by every SOQL/SOSL builder.
//!
//! The denylist is substring based, not a parser: it stops the obvious statement
//! terminators and comment markers from reaching a query string and nothing more.

use serde_json::{Map, Value};

use crate::errors::ToolError;

/// Checked in order; the first hit is reported.
pub const DENYLIST: [&str; 6] = [";", "--", "/*", "*/", "xp_", "sp_"];

/// Rejects input containing a denylisted pattern (case-insensitive), otherwise trims it.
pub fn sanitize(input: &str) -> Result<String, ToolError> {
    let lowered = input.to_lowercase();
    if let Some(pattern) = DENYLIST.iter().find(|pattern| lowered.contains(**pattern)) {
        return Err(ToolError::InvalidQuery { pattern });
    }

    Ok(input.trim().to_string())
}

/// Fails with the ordered list of names that are absent, null, or empty strings.
pub fn validate_required_fields(
    data: &Map<String, Value>,
    required: &[&str],
) -> Result<(), ToolError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| match data.get(**name) {
            None | Some(Value::Null) => true,
            Some(Value::String(value)) => value.is_empty(),
            Some(_) => false,
        })
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::RequiredFieldMissing(missing))
    }
}

/// Resolves `{name}` placeholders in a single left-to-right pass.
///
/// Substituted values are never rescanned, so a value containing `{limit}` is emitted
/// verbatim. Braces that do not enclose a known name are copied through, which keeps
/// SOSL's `FIND {term}` syntax intact.
pub fn render(template: &str, params: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open + 1..];
        let substitution = candidate.find('}').and_then(|close| {
            let name = &candidate[..close];
            params.iter().find(|(key, _)| *key == name).map(|(_, value)| (*value, close))
        });

        match substitution {
            Some((value, close)) => {
                rendered.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = candidate;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}
