use serde::{Deserialize, Serialize};

/// One completed loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub ts: i64,
    /// The action as proposed, when there was one to dispatch.
    pub action: Option<serde_json::Value>,
    pub description: String,
    pub outcome_message: String,
    pub succeeded: bool,
    /// Whether the next captured frame differed. Filled in one iteration late.
    pub screen_changed: bool,
}

/// Append-only trail of a run, owned by the engine and handed to the oracle read-only.
#[derive(Debug, Default)]
pub struct RunHistory {
    entries: Vec<HistoryEntry>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        tracing::debug!(
            iteration = entry.iteration,
            succeeded = entry.succeeded,
            description = %entry.description,
            "history entry recorded"
        );
        self.entries.push(entry);
    }

    /// Record a dispatched action's outcome.
    pub fn record_action(
        &mut self,
        iteration: u32,
        action: serde_json::Value,
        description: String,
        succeeded: bool,
        outcome_message: String,
    ) {
        self.push(HistoryEntry {
            iteration,
            ts: chrono::Utc::now().timestamp_millis(),
            action: Some(action),
            description,
            outcome_message,
            succeeded,
            screen_changed: false,
        });
    }

    /// Record a failed decision attempt (no action was produced).
    pub fn record_oracle_failure(&mut self, iteration: u32, error: String) {
        self.push(HistoryEntry {
            iteration,
            ts: chrono::Utc::now().timestamp_millis(),
            action: None,
            description: format!("Error: {error}"),
            outcome_message: error,
            succeeded: false,
            screen_changed: false,
        });
    }

    /// The change caused by the previous action only becomes visible on the next capture.
    pub fn mark_last_screen_changed(&mut self, changed: bool) {
        if let Some(last) = self.entries.last_mut() {
            last.screen_changed = changed;
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }
}
