use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an episode run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Pitch,
    Outline,
    Validated,
    Scene1,
    Evaluating(u32),
    Planning(u32),
    Scripting(u32),
    Summarizing(u32),
    /// Scoring the given 1-based block of the finished episode.
    Scoring(usize),
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pitch => write!(f, "pitch"),
            Self::Outline => write!(f, "outline"),
            Self::Validated => write!(f, "validated"),
            Self::Scene1 => write!(f, "scene 1"),
            Self::Evaluating(n) => write!(f, "evaluating scene {n}"),
            Self::Planning(n) => write!(f, "planning scene {n}"),
            Self::Scripting(n) => write!(f, "scripting scene {n}"),
            Self::Summarizing(n) => write!(f, "summarizing scene {n}"),
            Self::Scoring(n) => write!(f, "scoring block {n}"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Progress notifications for whoever drives the run (the CLI prints them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    State(PipelineState),
    OutlineReviewed { coherent: bool },
    /// A scene was summarized and appended to memory.
    SceneStored { scene_number: u32, location: String },
    /// Verdicts of the three continuity agents for a scene.
    SceneEvaluated {
        scene_number: u32,
        character: bool,
        comedic: bool,
        environment: bool,
    },
    ScriptSaved { path: String },
    BlockScored {
        block: usize,
        first_scene: u32,
        last_scene: u32,
        mean: f32,
    },
}
