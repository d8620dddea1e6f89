use crate::llm::types::OracleContext;

/// Instructions sent as the system message on every call.
pub fn system_prompt(grid_description: &str) -> String {
    format!(
        r#"You control a Linux desktop through mouse and keyboard. You see one screenshot per step and choose exactly ONE action.

{grid_description}
Coordinates are screen pixels. You may give a grid cell instead of x/y with "cell": "C4".

Reply with JSON only:
{{"thinking": "<short reasoning>", "action": {{...}}}}

Actions:
  {{"type": "click", "x": 100, "y": 200, "button": "left|right|middle"}}
  {{"type": "double_click", "x": 100, "y": 200}}
  {{"type": "move", "x": 100, "y": 200}}
  {{"type": "drag", "start_x": 10, "start_y": 20, "end_x": 300, "end_y": 400}}
  {{"type": "scroll", "x": 960, "y": 540, "direction": "up|down", "amount": 3}}
  {{"type": "type_text", "text": "hello"}}
  {{"type": "key_press", "key": "Return"}}   combos: "ctrl+c", or "key": "t" with "modifiers": ["ctrl", "alt"]
  {{"type": "wait", "duration_ms": 1000}}
  {{"type": "done", "message": "<what was achieved>"}}
  {{"type": "fail", "message": "<why it cannot be done>"}}

Rules:
- Answer "done" as soon as the screenshot shows the goal is reached.
- If the screen did not change after your last action, do not repeat it; try another approach.
- Answer "fail" only when the task is impossible."#
    )
}

/// Per-call user text: task, attempt counter, previous steps, stagnation warning.
pub fn user_prompt(task: &str, ctx: &OracleContext<'_>) -> String {
    let mut out = format!(
        "Task: {task}\nAttempt {} of {}.\n",
        ctx.iteration, ctx.max_iterations
    );

    if ctx.history.is_empty() {
        out.push_str("No actions taken yet.\n");
    } else {
        out.push_str("Previous actions:\n");
        for (i, entry) in ctx.history.iter().enumerate() {
            let status = if entry.succeeded { "ok" } else { "FAILED" };
            let screen = if entry.screen_changed {
                "screen changed"
            } else {
                "screen unchanged"
            };
            out.push_str(&format!(
                "{}. {} -> {status}, {screen}\n",
                i + 1,
                entry.description
            ));
        }
    }

    if ctx.stagnation.screen_unchanged {
        out.push_str(&format!(
            "WARNING: the screen has not changed for {} step(s).",
            ctx.stagnation.unchanged_count
        ));
        if ctx.stagnation.threshold_reached {
            out.push_str(" Your actions are not working. Choose a different element, a keyboard shortcut, or another strategy.");
        }
        out.push('\n');
    }

    out.push_str("Look at the screenshot and respond with the next action as JSON.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::history::HistoryEntry;
    use crate::perception::grid::GridMapper;
    use crate::perception::types::StagnationSignal;

    fn entry(description: &str, succeeded: bool, screen_changed: bool) -> HistoryEntry {
        HistoryEntry {
            iteration: 1,
            ts: 0,
            action: None,
            description: description.into(),
            outcome_message: String::new(),
            succeeded,
            screen_changed,
        }
    }

    #[test]
    fn history_is_numbered_with_flags() {
        let grid = GridMapper::default().info();
        let history = vec![
            entry("Click at (10, 20)", true, false),
            entry("Error: rate limited", false, false),
        ];
        let ctx = OracleContext {
            history: &history,
            iteration: 3,
            max_iterations: 10,
            stagnation: StagnationSignal::default(),
            grid: &grid,
        };
        let text = user_prompt("open firefox", &ctx);
        assert!(text.starts_with("Task: open firefox\nAttempt 3 of 10."));
        assert!(text.contains("1. Click at (10, 20) -> ok, screen unchanged"));
        assert!(text.contains("2. Error: rate limited -> FAILED"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn stagnation_adds_warning() {
        let grid = GridMapper::default().info();
        let ctx = OracleContext {
            history: &[],
            iteration: 5,
            max_iterations: 10,
            stagnation: StagnationSignal {
                screen_unchanged: true,
                unchanged_count: 3,
                threshold_reached: true,
            },
            grid: &grid,
        };
        let text = user_prompt("x", &ctx);
        assert!(text.contains("has not changed for 3 step(s)"));
        assert!(text.contains("not working"));
    }

    #[test]
    fn system_prompt_embeds_grid_description() {
        let grid = GridMapper::default();
        assert!(system_prompt(&grid.describe()).contains("12x8 grid"));
    }
}
