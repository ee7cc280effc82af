use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Pointer to the most recently ingested command, written by `repty log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCommand {
    pub last_command_id: i64,
    pub timestamp: i64,
    pub cwd: Option<String>,
}

pub fn write_state(path: &Path, state: &LastCommand) -> Result<()> {
    let body = serde_json::to_string(state).context("Failed to serialize state")?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write state to {}", path.display()))
}

/// A missing or unreadable state file is treated as "no last command".
pub fn read_state(path: &Path) -> Option<LastCommand> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "ignoring corrupt state file");
            None
        }
    }
}
