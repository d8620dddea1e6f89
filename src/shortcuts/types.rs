use serde::{Deserialize, Serialize};

use crate::agent_engine::state::{Action, MouseButton};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutKind {
    #[default]
    Click,
    DoubleClick,
    RightClick,
}

/// A well-known on-screen affordance reachable without asking the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownLocation {
    /// Lower-case substring looked for in the task text.
    pub match_key: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub action_kind: ShortcutKind,
    pub description: String,
}

impl KnownLocation {
    pub fn to_action(&self) -> Action {
        match self.action_kind {
            ShortcutKind::Click => Action::Click { x: self.x, y: self.y, button: MouseButton::Left },
            ShortcutKind::RightClick => Action::Click { x: self.x, y: self.y, button: MouseButton::Right },
            ShortcutKind::DoubleClick => Action::DoubleClick { x: self.x, y: self.y },
        }
    }
}
