use crate::shortcuts::types::{KnownLocation, ShortcutKind};

/// Built-in table for the 1920x1080 KDE desktop image: desktop icons in the
/// top-left column, taskbar entries along y = 740. Earlier rows win.
const BUILTIN: &[(&str, i32, i32, &str)] = &[
    ("vlc", 46, 55, "VLC media player desktop icon"),
    ("vlc media player", 46, 55, "VLC media player desktop icon"),
    ("media player", 46, 55, "VLC media player desktop icon"),
    ("zen browser", 46, 165, "Zen Browser desktop icon"),
    ("zenbrowser", 46, 165, "Zen Browser desktop icon"),
    ("zen", 46, 165, "Zen Browser desktop icon"),
    ("browser", 46, 165, "Zen Browser desktop icon"),
    ("app menu", 30, 740, "App menu in taskbar"),
    ("menu", 30, 740, "App menu in taskbar"),
    ("start", 30, 740, "App menu in taskbar"),
    ("show desktop", 78, 740, "Show desktop in taskbar"),
    ("vlc taskbar", 128, 740, "VLC in taskbar"),
    ("settings", 178, 740, "Settings in taskbar"),
    ("file manager", 228, 740, "File manager (Dolphin) in taskbar"),
    ("files", 228, 740, "File manager (Dolphin) in taskbar"),
    ("dolphin", 228, 740, "Dolphin file manager in taskbar"),
    ("terminal", 278, 740, "Terminal (Konsole) in taskbar"),
    ("konsole", 278, 740, "Konsole terminal in taskbar"),
    ("console", 278, 740, "Terminal in taskbar"),
];

/// Static, ordered table of known locations. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    locations: Vec<KnownLocation>,
}

impl CapabilityRegistry {
    pub fn new(locations: Vec<KnownLocation>) -> Self {
        let locations = locations
            .into_iter()
            .map(|mut loc| {
                loc.match_key = loc.match_key.to_lowercase();
                loc
            })
            .filter(|loc| {
                if loc.match_key.trim().is_empty() {
                    tracing::warn!(description = %loc.description, "ignoring known location with empty match key");
                    false
                } else {
                    true
                }
            })
            .collect();
        Self { locations }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|&(key, x, y, description)| KnownLocation {
                    match_key: key.to_string(),
                    x,
                    y,
                    action_kind: ShortcutKind::Click,
                    description: description.to_string(),
                })
                .collect(),
        )
    }

    /// An empty registry disables the quick path entirely.
    pub fn empty() -> Self {
        Self { locations: Vec::new() }
    }

    pub fn from_override(locations: Option<Vec<KnownLocation>>) -> Self {
        match locations {
            Some(locations) => {
                tracing::info!(count = locations.len(), "using configured shortcut table");
                Self::new(locations)
            }
            None => Self::builtin(),
        }
    }

    /// First entry whose key is a case-insensitive substring of the task.
    pub fn lookup(&self, task: &str) -> Option<&KnownLocation> {
        let task = task.to_lowercase();
        self.locations.iter().find(|loc| task.contains(&loc.match_key))
    }

    pub fn locations(&self) -> &[KnownLocation] {
        &self.locations
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
