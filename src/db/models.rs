use serde::{Deserialize, Serialize};

use super::tags::TagSet;

/// One recorded or manually saved command.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub command: String,
    pub cwd: Option<String>,
    /// Absent for manually saved favorites.
    pub exit_code: Option<i32>,
    /// Epoch milliseconds, assigned at insert.
    pub timestamp: i64,
    pub tags: TagSet,
}

impl Entry {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.iter().map(str::to_string).collect()
    }

    pub fn formatted_timestamp(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
            .map(|dt| {
                dt.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Fields supplied by the caller when creating an entry.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub command: String,
    pub cwd: Option<String>,
    pub exit_code: Option<i32>,
    pub tags: TagSet,
}

/// Reduced view of an entry handed to the ranking collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateContext {
    pub id: i64,
    pub command: String,
    pub cwd: Option<String>,
    pub timestamp: String,
    pub exit_code: Option<i32>,
    pub tags: Vec<String>,
}

impl From<&Entry> for CandidateContext {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            command: entry.command.clone(),
            cwd: entry.cwd.clone(),
            timestamp: entry.formatted_timestamp(),
            exit_code: entry.exit_code,
            tags: entry.tag_list(),
        }
    }
}
