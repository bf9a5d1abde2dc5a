use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub at: DateTime<Utc>,
    pub change_id: String,
    pub source: EventSource,
    pub body: Value,
}

impl EventRecord {
    pub fn new(change_id: String, source: EventSource, body: Value) -> Self {
        Self {
            id: format!("evt_{}", Ulid::new()),
            at: Utc::now(),
            change_id,
            source,
            body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventSource {
    Cli,
    Mcp,
}
