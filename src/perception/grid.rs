//! Coarse grid reference system over the target screen.
//!
//! Grid labeling convention:
//!   - Columns: A, B, C … (left → right)
//!   - Rows:    1, 2, 3 … (top  → bottom)
//!
//! Used for spatial descriptions in prompts and logs, never for precise dispatch.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z])(\d{1,3})$").expect("grid label regex must compile"));

/// Convert 0-indexed column number to its letter label. 0→A, 1→B, …
pub fn col_label(col: u32) -> char {
    char::from(b'A' + col.min(25) as u8)
}

/// Full label for a grid cell: col=2, row=3 → "C4".
pub fn cell_label(col: u32, row: u32) -> String {
    format!("{}{}", col_label(col), row + 1)
}

/// Parse a grid cell label like "C4" into (col_0indexed, row_0indexed).
/// Returns `None` if the label cannot be parsed.
pub fn parse_grid_label(label: &str) -> Option<(u32, u32)> {
    let caps = LABEL_RE.captures(label.trim())?;
    let letter = caps[1].to_ascii_uppercase().chars().next()?;
    let col = letter as u32 - 'A' as u32;
    let row = caps[2].parse::<u32>().ok()?.checked_sub(1)?;
    Some((col, row))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInfo {
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GridMapper {
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
}

impl GridMapper {
    pub fn new(width: u32, height: u32, cols: u32, rows: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            cols: cols.clamp(1, 26),
            rows: rows.max(1),
        }
    }

    pub fn from_config(cfg: &GridConfig) -> Self {
        Self::new(cfg.screen_width, cfg.screen_height, cfg.cols, cfg.rows)
    }

    fn cell_size(&self) -> (f64, f64) {
        (
            self.width as f64 / self.cols as f64,
            self.height as f64 / self.rows as f64,
        )
    }

    /// Centre of the referenced cell in pixels, or `None` for a malformed or
    /// out-of-range reference.
    pub fn grid_to_pixel(&self, reference: &str) -> Option<(i32, i32)> {
        let (col, row) = parse_grid_label(reference)?;
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let (cell_w, cell_h) = self.cell_size();
        let cx = (col as f64 * cell_w + cell_w / 2.0).round() as i32;
        let cy = (row as f64 * cell_h + cell_h / 2.0).round() as i32;
        Some((cx, cy))
    }

    /// Cell containing the pixel. Out-of-range input clamps to the nearest edge cell.
    pub fn pixel_to_grid(&self, x: i32, y: i32) -> String {
        let (cell_w, cell_h) = self.cell_size();
        let col = (x.max(0) as f64 / cell_w).floor() as u32;
        let row = (y.max(0) as f64 / cell_h).floor() as u32;
        cell_label(col.min(self.cols - 1), row.min(self.rows - 1))
    }

    pub fn info(&self) -> GridInfo {
        let (cell_w, cell_h) = self.cell_size();
        let (cell_width, cell_height) = (cell_w.round() as u32, cell_h.round() as u32);
        GridInfo {
            cols: self.cols,
            rows: self.rows,
            cell_width,
            cell_height,
            description: format!(
                "Screen is divided into {c}x{r} grid (A-{last} columns, 1-{r} rows). Each cell is {cell_width}x{cell_height}px.",
                c = self.cols,
                r = self.rows,
                last = col_label(self.cols - 1),
            ),
        }
    }

    pub fn describe(&self) -> String {
        self.info().description
    }
}

impl Default for GridMapper {
    fn default() -> Self {
        Self::from_config(&GridConfig::default())
    }
}
