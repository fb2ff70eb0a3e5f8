use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Action,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub name: String,
    #[serde(default)]
    pub details: Value,
}

/// Audit trail of one scan or webhook invocation.
///
/// Entries are also mirrored to tracing so they show up in the live log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<ExecLogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(&mut self, name: &str, details: Value) {
        tracing::debug!(action = name, %details, "📝 action");
        self.push(EntryKind::Action, name, details);
    }

    pub fn error(&mut self, name: &str, details: Value) {
        tracing::error!(error = name, %details, "❌ error");
        self.push(EntryKind::Error, name, details);
    }

    fn push(&mut self, kind: EntryKind, name: &str, details: Value) {
        self.entries.push(ExecLogEntry {
            timestamp: Utc::now(),
            kind,
            name: name.to_string(),
            details,
        });
    }

    pub fn entries(&self) -> &[ExecLogEntry] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Error)
            .count()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.entries)
    }

    /// logs/<job>_<YYYYMMDD>.json
    pub fn file_name(job: &str, at: DateTime<Utc>) -> String {
        format!("logs/{}_{}.json", job, at.format("%Y%m%d"))
    }
}
