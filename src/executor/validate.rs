use serde_json::{Map, Value};

use crate::agent_engine::state::{Action, MouseButton, ScrollDirection};
use crate::errors::ValidationError;
use crate::perception::grid::GridMapper;

const DEFAULT_SCROLL_AMOUNT: u32 = 3;
const DEFAULT_WAIT_MS: u64 = 1000;
const DEFAULT_DONE_MESSAGE: &str = "Task completed successfully";
const DEFAULT_FAIL_MESSAGE: &str = "Task could not be completed";

type Object = Map<String, Value>;

/// Turn an oracle-proposed JSON action into a typed [`Action`].
///
/// Nothing here touches a device. Accepts snake_case and camelCase field
/// names, integer or fractional coordinates (rounded), and a `cell` grid
/// reference in place of a missing `x`/`y` pair.
pub fn validate(raw: &Value, grid: &GridMapper) -> Result<Action, ValidationError> {
    let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;
    let tag = obj
        .get("type")
        .or_else(|| obj.get("action"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingTag)?;

    let mut bad = Vec::new();
    let action = match normalize_tag(tag).as_str() {
        "click" | "leftclick" => {
            let (x, y) = point(obj, grid, &mut bad);
            let button = match field(obj, &["button"]) {
                None => MouseButton::Left,
                Some(v) => v.as_str().and_then(MouseButton::parse).unwrap_or_else(|| {
                    bad.push("button");
                    MouseButton::Left
                }),
            };
            Action::Click { x, y, button }
        }
        "rightclick" => {
            let (x, y) = point(obj, grid, &mut bad);
            Action::Click { x, y, button: MouseButton::Right }
        }
        "middleclick" => {
            let (x, y) = point(obj, grid, &mut bad);
            Action::Click { x, y, button: MouseButton::Middle }
        }
        "doubleclick" => {
            let (x, y) = point(obj, grid, &mut bad);
            Action::DoubleClick { x, y }
        }
        "move" | "mousemove" | "hover" => {
            let (x, y) = point(obj, grid, &mut bad);
            Action::Move { x, y }
        }
        "drag" => Action::Drag {
            start_x: required_coord(obj, &["start_x", "startX"], "start_x", &mut bad),
            start_y: required_coord(obj, &["start_y", "startY"], "start_y", &mut bad),
            end_x: required_coord(obj, &["end_x", "endX"], "end_x", &mut bad),
            end_y: required_coord(obj, &["end_y", "endY"], "end_y", &mut bad),
        },
        "scroll" => {
            let (x, y) = if has_point(obj) || field(obj, &["cell"]).is_none() {
                (
                    optional_coord(obj, &["x"], "x", 0, &mut bad),
                    optional_coord(obj, &["y"], "y", 0, &mut bad),
                )
            } else {
                point(obj, grid, &mut bad)
            };
            let direction = match field(obj, &["direction"]) {
                None => ScrollDirection::default(),
                Some(v) => match v.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
                    Some("up") => ScrollDirection::Up,
                    Some("down") => ScrollDirection::Down,
                    _ => {
                        bad.push("direction");
                        ScrollDirection::default()
                    }
                },
            };
            let amount = match field(obj, &["amount", "clicks"]) {
                None => DEFAULT_SCROLL_AMOUNT,
                Some(v) => non_negative(v).and_then(|n| u32::try_from(n).ok()).unwrap_or_else(|| {
                    bad.push("amount");
                    0
                }),
            };
            Action::Scroll { x, y, direction, amount }
        }
        "type" | "typetext" => match field(obj, &["text"]) {
            Some(Value::String(text)) => Action::TypeText { text: text.clone() },
            _ => {
                bad.push("text");
                Action::TypeText { text: String::new() }
            }
        },
        "key" | "keypress" | "hotkey" => {
            let key = match field(obj, &["key", "keys"]).and_then(Value::as_str) {
                Some(k) if !k.is_empty() => k.to_string(),
                _ => {
                    bad.push("key");
                    String::new()
                }
            };
            let modifiers = match field(obj, &["modifiers"]) {
                None => Vec::new(),
                Some(Value::Array(items)) => {
                    let names: Option<Vec<String>> = items
                        .iter()
                        .map(|m| m.as_str().map(|s| s.trim().to_ascii_lowercase()))
                        .collect();
                    names.unwrap_or_else(|| {
                        bad.push("modifiers");
                        Vec::new()
                    })
                }
                Some(_) => {
                    bad.push("modifiers");
                    Vec::new()
                }
            };
            Action::KeyPress { key, modifiers }
        }
        "wait" | "sleep" => {
            let duration_ms = match field(obj, &["duration_ms", "durationMs", "duration"]) {
                None => DEFAULT_WAIT_MS,
                Some(v) => non_negative(v).unwrap_or_else(|| {
                    bad.push("duration_ms");
                    0
                }),
            };
            Action::Wait { duration_ms }
        }
        "screenshot" => Action::Screenshot,
        "done" | "complete" | "finish" => Action::Done {
            message: message(obj, DEFAULT_DONE_MESSAGE),
        },
        "fail" | "error" => Action::Fail {
            message: message(obj, DEFAULT_FAIL_MESSAGE),
        },
        _ => return Err(ValidationError::UnknownTag(tag.to_string())),
    };

    if bad.is_empty() {
        Ok(action)
    } else {
        Err(ValidationError::InvalidFields {
            tag: action.tag().to_string(),
            fields: bad,
        })
    }
}

/// Shape check for an already-typed action.
pub fn check(action: &Action) -> Result<(), ValidationError> {
    match action {
        Action::KeyPress { key, .. } if key.is_empty() => Err(ValidationError::InvalidFields {
            tag: action.tag().to_string(),
            fields: vec!["key"],
        }),
        _ => Ok(()),
    }
}

/// `double_click`, `doubleClick` and `double-click` all become `doubleclick`.
fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| *c != '_' && *c != '-' && *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

/// First present, non-null value among `names`.
fn field<'a>(obj: &'a Object, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| obj.get(*n))
        .find(|v| !v.is_null())
}

fn has_point(obj: &Object) -> bool {
    field(obj, &["x"]).is_some() || field(obj, &["y"]).is_some()
}

fn as_coord(v: &Value) -> Option<i32> {
    if let Some(n) = v.as_i64() {
        return i32::try_from(n).ok();
    }
    let f = v.as_f64()?.round();
    (f >= i32::MIN as f64 && f <= i32::MAX as f64).then_some(f as i32)
}

fn non_negative(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    let f = v.as_f64()?.round();
    (f >= 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn required_coord(obj: &Object, names: &[&str], label: &'static str, bad: &mut Vec<&'static str>) -> i32 {
    field(obj, names).and_then(as_coord).unwrap_or_else(|| {
        bad.push(label);
        0
    })
}

fn optional_coord(
    obj: &Object,
    names: &[&str],
    label: &'static str,
    default: i32,
    bad: &mut Vec<&'static str>,
) -> i32 {
    match field(obj, names) {
        None => default,
        Some(v) => as_coord(v).unwrap_or_else(|| {
            bad.push(label);
            default
        }),
    }
}

/// `x`/`y`, or the centre of `cell` when neither coordinate is given.
fn point(obj: &Object, grid: &GridMapper, bad: &mut Vec<&'static str>) -> (i32, i32) {
    if !has_point(obj) {
        if let Some(cell) = field(obj, &["cell"]) {
            return match cell.as_str().and_then(|c| grid.grid_to_pixel(c)) {
                Some(p) => p,
                None => {
                    bad.push("cell");
                    (0, 0)
                }
            };
        }
    }
    (
        required_coord(obj, &["x"], "x", bad),
        required_coord(obj, &["y"], "y", bad),
    )
}

fn message(obj: &Object, default: &str) -> String {
    field(obj, &["message", "reason", "text"])
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}
