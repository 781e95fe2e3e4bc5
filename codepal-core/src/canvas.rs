//! # Drawing Canvas
//!
//! Drawing commands produced by simulated runs, the append-only history of
//! visual batches, and the interpreter that replays the latest batch onto a
//! fixed-size frame.
//!
//! ## Rendering rules
//! - Only the last batch is replayed; older batches are history
//! - No batches at all renders the placeholder frame
//! - `fill` becomes the background and hides everything drawn before it
//! - `clear` resets to the blank background with no marks
//! - Unrecognized command types are skipped

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

pub const CANVAS_WIDTH: u32 = 400;
pub const CANVAS_HEIGHT: u32 = 300;

pub const BLANK_BACKGROUND: &str = "#FFFFFF";
pub const DEFAULT_INK: &str = "#222222";

pub const PLACEHOLDER_BACKGROUND: &str = "#1E1E2E";
pub const PLACEHOLDER_INK: &str = "#CDD6F4";
pub const PLACEHOLDER_TEXT: &str = "Screen not initialized yet";

/// How long a frame counts as "just updated" after a new batch arrives
pub const UPDATE_WINDOW: Duration = Duration::from_millis(1200);

// ============================================================================
// Commands
// ============================================================================

/// One drawing instruction as produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawingCommand {
    Fill {
        color: String,
    },
    Circle {
        x: f64,
        y: f64,
        radius: f64,
        color: String,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: String,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Clear,
    /// Any command type this interpreter does not know
    #[serde(other)]
    Unsupported,
}

impl DrawingCommand {
    /// Check numbers are finite, sizes non-negative and colors non-blank.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            DrawingCommand::Fill { color } => check_color("fill", color),
            DrawingCommand::Circle { x, y, radius, color } => {
                check_finite("circle", &[("x", *x), ("y", *y), ("radius", *radius)])?;
                check_size("circle", "radius", *radius)?;
                check_color("circle", color)
            }
            DrawingCommand::Rect {
                x,
                y,
                width,
                height,
                color,
            } => {
                check_finite(
                    "rect",
                    &[("x", *x), ("y", *y), ("width", *width), ("height", *height)],
                )?;
                check_size("rect", "width", *width)?;
                check_size("rect", "height", *height)?;
                check_color("rect", color)
            }
            DrawingCommand::Text { x, y, color, .. } => {
                check_finite("text", &[("x", *x), ("y", *y)])?;
                match color {
                    Some(color) => check_color("text", color),
                    None => Ok(()),
                }
            }
            DrawingCommand::Clear | DrawingCommand::Unsupported => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DrawingCommand::Fill { .. } => "fill",
            DrawingCommand::Circle { .. } => "circle",
            DrawingCommand::Rect { .. } => "rect",
            DrawingCommand::Text { .. } => "text",
            DrawingCommand::Clear => "clear",
            DrawingCommand::Unsupported => "unsupported",
        }
    }
}

fn check_finite(command: &str, values: &[(&str, f64)]) -> std::result::Result<(), String> {
    match values.iter().find(|(_, v)| !v.is_finite()) {
        Some((field, _)) => Err(format!("{}.{} is not a finite number", command, field)),
        None => Ok(()),
    }
}

fn check_size(command: &str, field: &str, value: f64) -> std::result::Result<(), String> {
    if value < 0.0 {
        Err(format!("{}.{} must not be negative", command, field))
    } else {
        Ok(())
    }
}

fn check_color(command: &str, color: &str) -> std::result::Result<(), String> {
    if color.trim().is_empty() {
        Err(format!("{}.color must not be blank", command))
    } else {
        Ok(())
    }
}

// ============================================================================
// Visual State
// ============================================================================

/// Append-only history of complete-frame command batches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualState {
    batches: Vec<Vec<DrawingCommand>>,
}

impl VisualState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch. Earlier batches are never touched.
    pub fn push(&mut self, batch: Vec<DrawingCommand>) {
        self.batches.push(batch);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn latest(&self) -> Option<&[DrawingCommand]> {
        self.batches.last().map(Vec::as_slice)
    }

    pub fn batches(&self) -> &[Vec<DrawingCommand>] {
        &self.batches
    }

    /// Load a visual state saved as a JSON array of batches
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("canvas::load")
                .with_context("path", path.display().to_string())
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::decode_failed("VisualState", e.to_string())
                .with_operation("canvas::load")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A visible shape on the frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Circle {
        x: f64,
        y: f64,
        radius: f64,
        color: String,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: String,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: String,
    },
}

/// The rendered canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub marks: Vec<Mark>,
    pub placeholder: bool,
}

impl Frame {
    pub fn blank() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            background: BLANK_BACKGROUND.to_string(),
            marks: Vec::new(),
            placeholder: false,
        }
    }

    /// Shown before any run has produced a batch
    pub fn placeholder() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            background: PLACEHOLDER_BACKGROUND.to_string(),
            marks: vec![Mark::Text {
                x: f64::from(CANVAS_WIDTH) / 2.0,
                y: f64::from(CANVAS_HEIGHT) / 2.0,
                text: PLACEHOLDER_TEXT.to_string(),
                color: PLACEHOLDER_INK.to_string(),
            }],
            placeholder: true,
        }
    }

    fn apply(&mut self, command: &DrawingCommand) {
        match command {
            DrawingCommand::Fill { color } => {
                self.background = color.clone();
                self.marks.clear();
            }
            DrawingCommand::Circle { x, y, radius, color } => self.marks.push(Mark::Circle {
                x: *x,
                y: *y,
                radius: *radius,
                color: color.clone(),
            }),
            DrawingCommand::Rect {
                x,
                y,
                width,
                height,
                color,
            } => self.marks.push(Mark::Rect {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                color: color.clone(),
            }),
            DrawingCommand::Text { x, y, text, color } => self.marks.push(Mark::Text {
                x: *x,
                y: *y,
                text: text.clone(),
                color: color.clone().unwrap_or_else(|| DEFAULT_INK.to_string()),
            }),
            DrawingCommand::Clear => *self = Frame::blank(),
            DrawingCommand::Unsupported => {
                debug!(target: "codepal::canvas", "skipping unsupported drawing command");
            }
        }
    }

    /// Export the frame as a standalone SVG document
    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
            w = self.width,
            h = self.height
        ));
        out.push_str(&format!(
            "  <rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
            self.width,
            self.height,
            escape(&self.background)
        ));

        for mark in &self.marks {
            match mark {
                Mark::Circle { x, y, radius, color } => out.push_str(&format!(
                    "  <circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"{}\"/>\n",
                    x,
                    y,
                    radius,
                    escape(color)
                )),
                Mark::Rect {
                    x,
                    y,
                    width,
                    height,
                    color,
                } => out.push_str(&format!(
                    "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
                    x,
                    y,
                    width,
                    height,
                    escape(color)
                )),
                Mark::Text { x, y, text, color } => {
                    let anchor = if self.placeholder { " text-anchor=\"middle\"" } else { "" };
                    out.push_str(&format!(
                        "  <text x=\"{}\" y=\"{}\" fill=\"{}\" font-family=\"monospace\" font-size=\"16\"{}>{}</text>\n",
                        x,
                        y,
                        escape(color),
                        anchor,
                        escape(text)
                    ));
                }
            }
        }

        out.push_str("</svg>\n");
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Replay the latest batch onto a fresh frame
pub fn render(state: &VisualState) -> Frame {
    let Some(batch) = state.latest() else {
        return Frame::placeholder();
    };

    let mut frame = Frame::blank();
    for command in batch {
        frame.apply(command);
    }
    debug!(
        target: "codepal::canvas",
        batch = state.len(),
        commands = batch.len(),
        marks = frame.marks.len(),
        "frame rendered"
    );
    frame
}

// ============================================================================
// Update pulse
// ============================================================================

/// Presentation-side observer that reports a short "just updated" window
/// whenever the batch count grows.
#[derive(Debug, Clone)]
pub struct UpdatePulse {
    window: Duration,
    seen: usize,
    raised_at: Option<Instant>,
}

impl Default for UpdatePulse {
    fn default() -> Self {
        Self::new(UPDATE_WINDOW)
    }
}

impl UpdatePulse {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: 0,
            raised_at: None,
        }
    }

    /// Record the current batch count and report whether the pulse is active.
    ///
    /// A shrinking count (a fresh session) only resets the baseline.
    pub fn observe(&mut self, count: usize, now: Instant) -> bool {
        if count > self.seen {
            self.raised_at = Some(now);
        }
        self.seen = count;
        self.is_active(now)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.raised_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Vec<DrawingCommand> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_commands() {
        let commands = decode(json!([
            {"type": "fill", "color": "#000000"},
            {"type": "circle", "x": 10, "y": 20.5, "radius": 5, "color": "yellow"},
            {"type": "text", "x": 1, "y": 2, "text": "hi"},
            {"type": "clear"},
            {"type": "sparkle", "amount": 9000}
        ]));

        assert_eq!(commands.len(), 5);
        assert_eq!(
            commands[1],
            DrawingCommand::Circle {
                x: 10.0,
                y: 20.5,
                radius: 5.0,
                color: "yellow".into()
            }
        );
        assert_eq!(commands[3], DrawingCommand::Clear);
        assert_eq!(commands[4], DrawingCommand::Unsupported);
    }

    #[test]
    fn test_missing_field_fails_decode() {
        let result: std::result::Result<DrawingCommand, _> =
            serde_json::from_value(json!({"type": "circle", "x": 1, "y": 2, "color": "red"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let ok = DrawingCommand::Rect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 0.0,
            color: "red".into(),
        };
        assert!(ok.validate().is_ok());

        let negative = DrawingCommand::Circle {
            x: 0.0,
            y: 0.0,
            radius: -1.0,
            color: "red".into(),
        };
        assert!(negative.validate().unwrap_err().contains("radius"));

        let blank = DrawingCommand::Fill { color: "  ".into() };
        assert!(blank.validate().is_err());

        let infinite = DrawingCommand::Text {
            x: f64::INFINITY,
            y: 0.0,
            text: "a".into(),
            color: None,
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn test_empty_state_renders_placeholder() {
        let frame = render(&VisualState::new());
        assert!(frame.placeholder);
        assert_eq!(frame, Frame::placeholder());
        assert_eq!(frame.background, PLACEHOLDER_BACKGROUND);
    }

    #[test]
    fn test_fill_sets_background() {
        let mut state = VisualState::new();
        state.push(decode(json!([{"type": "fill", "color": "#0000FF"}])));

        let frame = render(&state);
        assert_eq!(frame.background, "#0000FF");
        assert!(!frame.placeholder);
        assert!(frame.marks.is_empty());
        assert!(!frame.to_svg().contains(PLACEHOLDER_TEXT));
    }

    #[test]
    fn test_fill_hides_earlier_marks() {
        let mut state = VisualState::new();
        state.push(decode(json!([
            {"type": "circle", "x": 1, "y": 1, "radius": 1, "color": "red"},
            {"type": "fill", "color": "black"},
            {"type": "rect", "x": 0, "y": 0, "width": 4, "height": 4, "color": "white"}
        ])));

        let frame = render(&state);
        assert_eq!(frame.background, "black");
        assert_eq!(frame.marks.len(), 1);
        assert!(matches!(frame.marks[0], Mark::Rect { .. }));
    }

    #[test]
    fn test_clear_resets_frame() {
        let mut state = VisualState::new();
        state.push(decode(json!([
            {"type": "fill", "color": "black"},
            {"type": "circle", "x": 1, "y": 1, "radius": 1, "color": "red"},
            {"type": "clear"},
            {"type": "text", "x": 5, "y": 5, "text": "after"}
        ])));

        let frame = render(&state);
        assert_eq!(frame.background, BLANK_BACKGROUND);
        assert_eq!(
            frame.marks,
            vec![Mark::Text {
                x: 5.0,
                y: 5.0,
                text: "after".into(),
                color: DEFAULT_INK.into()
            }]
        );
    }

    #[test]
    fn test_only_latest_batch_replayed() {
        let mut state = VisualState::new();
        state.push(decode(json!([
            {"type": "circle", "x": 1, "y": 1, "radius": 1, "color": "red"}
        ])));
        state.push(decode(json!([{"type": "fill", "color": "green"}])));

        let frame = render(&state);
        assert_eq!(state.len(), 2);
        assert_eq!(frame.background, "green");
        assert!(frame.marks.is_empty());
    }

    #[test]
    fn test_unsupported_skipped() {
        let mut state = VisualState::new();
        state.push(decode(json!([
            {"type": "fill", "color": "navy"},
            {"type": "teleport", "x": 1}
        ])));

        let frame = render(&state);
        assert_eq!(frame.background, "navy");
        assert!(frame.marks.is_empty());
    }

    #[test]
    fn test_svg_escapes_text() {
        let mut state = VisualState::new();
        state.push(vec![DrawingCommand::Text {
            x: 10.0,
            y: 20.0,
            text: "<b>&\"hi\"".into(),
            color: Some("#FF0000".into()),
        }]);

        let svg = render(&state).to_svg();
        assert!(svg.starts_with("<svg "));
        assert!(svg.contains("&lt;b&gt;&amp;&quot;hi&quot;"));
        assert!(svg.contains("fill=\"#FF0000\""));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_state_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visual.json");
        std::fs::write(&path, r##"[[{"type":"fill","color":"#123456"}]]"##).unwrap();

        let state = VisualState::load(&path).unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(render(&state).background, "#123456");

        std::fs::write(&path, "not json").unwrap();
        let err = VisualState::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeFailed);
    }

    #[test]
    fn test_update_pulse() {
        let start = Instant::now();
        let mut pulse = UpdatePulse::default();

        assert!(!pulse.observe(0, start));
        assert!(pulse.observe(1, start));
        assert!(pulse.is_active(start + Duration::from_millis(1100)));
        assert!(!pulse.observe(1, start + Duration::from_millis(1300)));

        // A shorter history resets the baseline without a pulse
        assert!(!pulse.observe(0, start + Duration::from_millis(1400)));
        assert!(pulse.observe(1, start + Duration::from_millis(1500)));
    }
}
