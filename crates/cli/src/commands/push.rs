//! `gpuhub push`: send one snapshot file to the hub

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::client::ApiClient;
use crate::output::{print_json, print_success, OutputFormat};

/// Field names the hub accepts for the agent name
const AGENT_NAME_FIELDS: [&str; 3] = ["agentName", "agent_name", "server_name"];

/// Read a snapshot file and apply the optional agent name override
pub fn load_snapshot(path: &Path, agent: Option<&str>) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut snapshot: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let Some(object) = snapshot.as_object_mut() else {
        bail!("{} must contain a JSON object", path.display());
    };

    if let Some(name) = agent {
        for field in AGENT_NAME_FIELDS {
            object.remove(field);
        }
        object.insert("agentName".to_string(), Value::String(name.to_string()));
    }

    Ok(snapshot)
}

/// Push a snapshot file
pub async fn push_snapshot(
    client: &ApiClient,
    file: &Path,
    agent: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = load_snapshot(file, agent.as_deref())?;
    let reply = client.update(&snapshot).await?;

    match format {
        OutputFormat::Json => print_json(&reply)?,
        OutputFormat::Table => print_success(&reply.message),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_override_replaces_every_agent_name_alias() {
        let file = file_with(r#"{"server_name": "old", "gpus": []}"#);
        let snapshot = load_snapshot(file.path(), Some("new")).unwrap();

        assert_eq!(snapshot["agentName"], "new");
        assert!(snapshot.get("server_name").is_none());
        assert!(snapshot["gpus"].is_array());
    }

    #[test]
    fn test_file_is_sent_as_is_without_override() {
        let file = file_with(r#"{"agentName": "gpu-box-1", "devices": []}"#);
        let snapshot = load_snapshot(file.path(), None).unwrap();
        assert_eq!(snapshot["agentName"], "gpu-box-1");
    }

    #[test]
    fn test_rejects_non_object_and_invalid_json() {
        assert!(load_snapshot(file_with("[1, 2]").path(), None).is_err());
        assert!(load_snapshot(file_with("{oops").path(), None).is_err());
        assert!(load_snapshot(Path::new("/nonexistent/snapshot.json"), None).is_err());
    }
}
