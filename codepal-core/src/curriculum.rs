//! # Curriculum
//!
//! Static course content (worlds, levels, steps) and in-memory progress.
//! Level order is the order levels appear in the course; the first level is
//! always open and every later level opens once its predecessor is completed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// A themed group of levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub id: String,
    pub title: String,
}

/// One instruction inside a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub instruction: String,
    pub hint: String,
    /// Key of the visual action the step expects
    pub expected_action: String,
    /// Judging hint for the model, never shown to the player
    pub reference_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: u32,
    pub world_id: String,
    pub title: String,
    pub steps: Vec<Step>,
}

impl Level {
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// A complete course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    pub worlds: Vec<World>,
    pub levels: Vec<Level>,
}

impl Curriculum {
    /// Build a course, checking its structure
    pub fn new(worlds: Vec<World>, levels: Vec<Level>) -> Result<Self> {
        let course = Self { worlds, levels };
        course.validate()?;
        Ok(course)
    }

    /// Parse a course from JSON text
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let course: Curriculum = serde_json::from_str(raw).map_err(|e| {
            Error::decode_failed("Curriculum", e.to_string())
                .with_operation("curriculum::parse")
                .set_source(e)
        })?;
        course.validate()?;
        Ok(course)
    }

    /// Load a course from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("curriculum::load")
                .with_context("path", path.display().to_string())
        })?;
        let course = Self::from_json_str(&raw)
            .map_err(|e| e.with_context("path", path.display().to_string()))?;
        info!(
            target: "codepal::curriculum",
            path = %path.display(),
            worlds = course.worlds.len(),
            levels = course.levels.len(),
            "course loaded"
        );
        Ok(course)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::invalid_argument(msg).with_operation("curriculum::validate"));

        if self.levels.is_empty() {
            return invalid("course has no levels".into());
        }

        let worlds: HashSet<&str> = self.worlds.iter().map(|w| w.id.as_str()).collect();
        let mut ids = HashSet::new();
        for level in &self.levels {
            if !ids.insert(level.id) {
                return invalid(format!("level id {} appears twice", level.id));
            }
            if !worlds.contains(level.world_id.as_str()) {
                return invalid(format!(
                    "level {} belongs to unknown world '{}'",
                    level.id, level.world_id
                ));
            }
            if level.steps.is_empty() {
                return invalid(format!("level {} has no steps", level.id));
            }
        }
        Ok(())
    }

    pub fn level(&self, id: u32) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == id)
    }

    /// Zero-based position of level `id` in course order
    pub fn position(&self, id: u32) -> Option<usize> {
        self.levels.iter().position(|l| l.id == id)
    }

    pub fn world(&self, id: &str) -> Option<&World> {
        self.worlds.iter().find(|w| w.id == id)
    }

    /// Levels of `world_id`, in course order
    pub fn levels_in<'a>(&'a self, world_id: &'a str) -> impl Iterator<Item = &'a Level> + 'a {
        self.levels.iter().filter(move |l| l.world_id == world_id)
    }

    /// The sample course shipped with codepal
    pub fn builtin() -> Self {
        let step = |instruction: &str, hint: &str, action: &str, code: &str| Step {
            instruction: instruction.to_string(),
            hint: hint.to_string(),
            expected_action: action.to_string(),
            reference_code: code.to_string(),
        };

        Self {
            worlds: vec![
                World {
                    id: "night-sky".into(),
                    title: "Night Sky".into(),
                },
                World {
                    id: "block-town".into(),
                    title: "Block Town".into(),
                },
            ],
            levels: vec![
                Level {
                    id: 1,
                    world_id: "night-sky".into(),
                    title: "Paint the Night".into(),
                    steps: vec![
                        step(
                            "Ask me to paint the whole screen black, like the night sky.",
                            "Try saying: make the screen black.",
                            "fill_screen",
                            "screen.fill(\"#000000\")",
                        ),
                        step(
                            "Now put a big yellow moon in the sky.",
                            "A moon is a circle. Ask for a yellow circle near the top.",
                            "draw_circle",
                            "screen.circle(300, 80, 40, \"yellow\")",
                        ),
                    ],
                },
                Level {
                    id: 2,
                    world_id: "night-sky".into(),
                    title: "Twinkle Twinkle".into(),
                    steps: vec![
                        step(
                            "Draw three little white stars using a loop.",
                            "Ask me to repeat drawing a small circle 3 times.",
                            "repeat_circles",
                            "repeat 3 {\n  screen.circle(60 * i + 50, 60, 4, \"white\")\n}",
                        ),
                        step(
                            "Sign your sky by writing your name at the bottom.",
                            "Ask me to write some text near the bottom of the screen.",
                            "draw_text",
                            "screen.text(20, 280, \"Made by me\")",
                        ),
                    ],
                },
                Level {
                    id: 3,
                    world_id: "block-town".into(),
                    title: "First House".into(),
                    steps: vec![
                        step(
                            "Start with a fresh, clean screen.",
                            "Ask me to clear the screen.",
                            "clear_screen",
                            "screen.clear()",
                        ),
                        step(
                            "Build the walls of a house with a red rectangle.",
                            "A rectangle needs a position, a width and a height.",
                            "draw_rect",
                            "screen.rect(150, 150, 100, 100, \"red\")",
                        ),
                        step(
                            "Give the house a blue door.",
                            "A door is a small, tall rectangle at the bottom of the house.",
                            "draw_rect",
                            "screen.rect(185, 200, 30, 50, \"blue\")",
                        ),
                    ],
                },
            ],
        }
    }
}

/// Completed levels for the current process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    completed: BTreeSet<u32>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion; returns false if it was already recorded
    pub fn record(&mut self, level_id: u32) -> bool {
        self.completed.insert(level_id)
    }

    pub fn is_completed(&self, level_id: u32) -> bool {
        self.completed.contains(&level_id)
    }

    /// The first level is always selectable; later levels need their
    /// predecessor completed. Unknown levels never are.
    pub fn is_selectable(&self, course: &Curriculum, level_id: u32) -> bool {
        match course.position(level_id) {
            Some(0) => true,
            Some(pos) => self.is_completed(course.levels[pos - 1].id),
            None => false,
        }
    }

    /// Resolve `level_id` for play, failing if it is unknown or locked
    pub fn check_selectable<'a>(&self, course: &'a Curriculum, level_id: u32) -> Result<&'a Level> {
        let level = course
            .level(level_id)
            .ok_or_else(|| Error::level_not_found(level_id).with_operation("progress::select"))?;
        if !self.is_selectable(course, level_id) {
            return Err(Error::level_locked(level_id).with_operation("progress::select"));
        }
        Ok(level)
    }
}
