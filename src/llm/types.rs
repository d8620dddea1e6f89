use serde::{Deserialize, Serialize};

use crate::agent_engine::history::HistoryEntry;
use crate::perception::grid::GridInfo;
use crate::perception::types::StagnationSignal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Everything the oracle sees besides the task and the frame.
#[derive(Debug, Clone, Copy)]
pub struct OracleContext<'a> {
    pub history: &'a [HistoryEntry],
    /// 1-based index of the current iteration.
    pub iteration: u32,
    pub max_iterations: u32,
    pub stagnation: StagnationSignal,
    pub grid: &'a GridInfo,
}

/// One oracle reply: optional reasoning plus exactly one raw action.
/// The action is validated later, by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub thinking: Option<String>,
    pub action: serde_json::Value,
}

impl Decision {
    /// The raw `type` tag, lower-cased, if the action carries one.
    pub fn tag(&self) -> Option<String> {
        self.action
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(|t| t.trim().to_ascii_lowercase())
    }
}
