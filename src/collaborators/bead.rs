//! Bead/work tracker collaborator: open-work counts during the scan phase
//! and issue creation on finding export. See spec §6.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::command::CommandExecutor;

#[derive(Debug, thiserror::Error)]
pub enum BeadError {
    #[error("bead invocation failed: {0}")]
    Invocation(#[from] anyhow::Error),
    #[error("bead returned malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// A created work item, as bead reports it on `sync` (spec §6 "stdout is
/// JSON with an `id` field; either a bare object or an array accepted").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
}

#[async_trait]
pub trait BeadClient: Send + Sync {
    async fn open_work_count(&self, project_root: &Path) -> Result<u64, BeadError>;

    /// Create an issue from a merged finding; `priority` is 0-3, mapped
    /// from impact per spec §4.6.8.
    async fn create_issue(&self, project_root: &Path, title: &str, body: &str, priority: u8) -> Result<CreatedIssue, BeadError>;
}

/// Accepts bead's documented "bare object or array" stdout shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BeadIdResponse {
    One(CreatedIssue),
    Many(Vec<CreatedIssue>),
}

/// Shells out to the real `bead` binary.
pub struct BeadCli {
    pub binary: String,
}

impl Default for BeadCli {
    fn default() -> Self {
        Self { binary: "bead".to_string() }
    }
}

#[async_trait]
impl BeadClient for BeadCli {
    async fn open_work_count(&self, project_root: &Path) -> Result<u64, BeadError> {
        let stdout = CommandExecutor::run(
            &self.binary,
            &["--json", "open-work", &project_root.display().to_string()],
            Some(project_root),
        )
        .await?;

        let value: serde_json::Value = serde_json::from_str(stdout.trim())?;
        let count = match value {
            serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
            serde_json::Value::Object(obj) => obj.get("open_work").and_then(|v| v.as_u64()).unwrap_or(0),
            serde_json::Value::Array(items) => items.len() as u64,
            _ => 0,
        };
        Ok(count)
    }

    async fn create_issue(&self, project_root: &Path, title: &str, body: &str, priority: u8) -> Result<CreatedIssue, BeadError> {
        let priority_arg = priority.to_string();
        let stdout = CommandExecutor::run(
            &self.binary,
            &["--json", "create", "--title", title, "--body", body, "--priority", &priority_arg],
            Some(project_root),
        )
        .await?;

        let response: BeadIdResponse = serde_json::from_str(stdout.trim())?;
        match response {
            BeadIdResponse::One(issue) => Ok(issue),
            BeadIdResponse::Many(mut issues) => {
                issues.pop().ok_or_else(|| BeadError::MalformedJson(empty_array_error()))
            }
        }
    }
}

fn empty_array_error() -> serde_json::Error {
    use serde::de::Error;
    serde_json::Error::custom("empty array response from bead")
}

/// impact -> priority mapping, spec §4.6.8.
pub fn impact_priority(impact: &str) -> u8 {
    match impact {
        "critical" => 0,
        "high" => 1,
        "medium" => 2,
        _ => 3,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_priority_mapping_matches_spec() {
        assert_eq!(impact_priority("critical"), 0);
        assert_eq!(impact_priority("high"), 1);
        assert_eq!(impact_priority("medium"), 2);
        assert_eq!(impact_priority("low"), 3);
    }
}
