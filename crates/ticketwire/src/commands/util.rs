//! Shared helpers for command handlers.

use std::path::Path;

use serde_json::Value;

use crate::error::CliError;

/// Parse a payload argument: inline JSON, or `@path` to read a file.
pub fn parse_payload(raw: &str) -> Result<Value, CliError> {
    if let Some(path) = raw.strip_prefix('@') {
        return read_json_file(Path::new(path));
    }
    Ok(serde_json::from_str(raw)?)
}

/// Read and parse a JSON file.
pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: path.display().to_string(),
        reason: format!("invalid JSON: {e}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inline_payload() {
        assert_eq!(parse_payload(r#"{"ticketId": 9}"#).unwrap(), json!({"ticketId": 9}));
    }

    #[test]
    fn file_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"["a", 1]"#).unwrap();
        let value = parse_payload(&format!("@{}", path.display())).unwrap();
        assert_eq!(value, json!(["a", 1]));
    }

    #[test]
    fn bad_payload_is_json_error() {
        assert!(matches!(parse_payload("{nope"), Err(CliError::Json(_))));
    }
}
