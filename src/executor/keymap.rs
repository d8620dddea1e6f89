use crate::errors::DeviceError;

/// A key the remote target can press and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Backspace,
    Space,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    CapsLock,
    PrintScreen,
    Menu,
    F(u8),
    Ctrl,
    Shift,
    Alt,
    Super,
    Char(char),
}

impl Key {
    pub fn is_modifier(self) -> bool {
        matches!(self, Key::Ctrl | Key::Shift | Key::Alt | Key::Super)
    }

    /// X keysym name, as understood by xdotool.
    pub fn keysym(self) -> String {
        let name = match self {
            Key::Enter => "Return",
            Key::Escape => "Escape",
            Key::Tab => "Tab",
            Key::Backspace => "BackSpace",
            Key::Space => "space",
            Key::Delete => "Delete",
            Key::Insert => "Insert",
            Key::Home => "Home",
            Key::End => "End",
            Key::PageUp => "Prior",
            Key::PageDown => "Next",
            Key::Up => "Up",
            Key::Down => "Down",
            Key::Left => "Left",
            Key::Right => "Right",
            Key::CapsLock => "Caps_Lock",
            Key::PrintScreen => "Print",
            Key::Menu => "Menu",
            Key::F(n) => return format!("F{n}"),
            Key::Ctrl => "ctrl",
            Key::Shift => "shift",
            Key::Alt => "alt",
            Key::Super => "super",
            Key::Char(c) => return char_keysym(c),
        };
        name.to_string()
    }
}

fn char_keysym(c: char) -> String {
    let name = match c {
        '+' => "plus",
        '-' => "minus",
        '=' => "equal",
        ',' => "comma",
        '.' => "period",
        '/' => "slash",
        '\\' => "backslash",
        ';' => "semicolon",
        '\'' => "apostrophe",
        '`' => "grave",
        '[' => "bracketleft",
        ']' => "bracketright",
        _ => return c.to_string(),
    };
    name.to_string()
}

/// Named keys and their aliases. Lookup is case-insensitive.
const NAMED_KEYS: &[(&str, Key)] = &[
    ("enter", Key::Enter),
    ("return", Key::Enter),
    ("escape", Key::Escape),
    ("esc", Key::Escape),
    ("tab", Key::Tab),
    ("backspace", Key::Backspace),
    ("space", Key::Space),
    ("spacebar", Key::Space),
    ("delete", Key::Delete),
    ("del", Key::Delete),
    ("insert", Key::Insert),
    ("home", Key::Home),
    ("end", Key::End),
    ("pageup", Key::PageUp),
    ("page_up", Key::PageUp),
    ("pgup", Key::PageUp),
    ("pagedown", Key::PageDown),
    ("page_down", Key::PageDown),
    ("pgdn", Key::PageDown),
    ("up", Key::Up),
    ("arrowup", Key::Up),
    ("down", Key::Down),
    ("arrowdown", Key::Down),
    ("left", Key::Left),
    ("arrowleft", Key::Left),
    ("right", Key::Right),
    ("arrowright", Key::Right),
    ("capslock", Key::CapsLock),
    ("printscreen", Key::PrintScreen),
    ("print", Key::PrintScreen),
    ("menu", Key::Menu),
    ("ctrl", Key::Ctrl),
    ("control", Key::Ctrl),
    ("shift", Key::Shift),
    ("alt", Key::Alt),
    ("super", Key::Super),
    ("win", Key::Super),
    ("meta", Key::Super),
    ("cmd", Key::Super),
];

/// Common shortcuts reachable by name, expanded to (modifiers, key).
const NAMED_COMBOS: &[(&str, &[Key], Key)] = &[
    ("copy", &[Key::Ctrl], Key::Char('c')),
    ("paste", &[Key::Ctrl], Key::Char('v')),
    ("cut", &[Key::Ctrl], Key::Char('x')),
    ("undo", &[Key::Ctrl], Key::Char('z')),
    ("select_all", &[Key::Ctrl], Key::Char('a')),
    ("save", &[Key::Ctrl], Key::Char('s')),
    ("switch_window", &[Key::Alt], Key::Tab),
    ("close_window", &[Key::Alt], Key::F(4)),
    ("open_terminal", &[Key::Ctrl, Key::Alt], Key::Char('t')),
];

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// Resolve a single key name. Unknown names are an error, never ignored.
///
/// Single characters resolve to their lowercase key; an uppercase letter
/// needs an explicit shift.
pub fn lookup_key(name: &str) -> Result<Key, DeviceError> {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(Key::Char(c.to_ascii_lowercase()));
    }
    if !name.is_empty() && trimmed.is_empty() {
        return Ok(Key::Space);
    }

    let norm = normalize(trimmed);
    let compact = norm.replace('_', "");
    if let Some((_, key)) = NAMED_KEYS
        .iter()
        .find(|(alias, _)| *alias == norm || *alias == compact)
    {
        return Ok(*key);
    }

    if let Some(n) = compact.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        if (1..=12).contains(&n) {
            return Ok(Key::F(n));
        }
    }

    Err(DeviceError::UnknownKey(name.to_string()))
}

/// Resolve a modifier name, rejecting non-modifier keys.
pub fn lookup_modifier(name: &str) -> Result<Key, DeviceError> {
    match lookup_key(name)? {
        key if key.is_modifier() => Ok(key),
        _ => Err(DeviceError::UnknownKey(format!("{name} (not a modifier)"))),
    }
}

pub fn is_modifier_name(name: &str) -> bool {
    lookup_modifier(name).is_ok()
}

/// Named shortcut such as "copy" → ([Ctrl], c).
pub fn lookup_combo(name: &str) -> Option<(Vec<Key>, Key)> {
    let norm = normalize(name);
    NAMED_COMBOS
        .iter()
        .find(|(alias, _, _)| *alias == norm)
        .map(|(_, mods, key)| (mods.to_vec(), *key))
}
