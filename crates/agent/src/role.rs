use std::fmt;

use serde::{Deserialize, Serialize};

/// Who issued a model call.  Used for error context and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Character,
    Comedic,
    Environment,
    Planner,
    Showrunner,
    ScriptWriter,
    Summarizer,
    Critic,
}

impl AgentRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Character => "character agent",
            Self::Comedic => "comedic agent",
            Self::Environment => "environment agent",
            Self::Planner => "scene planner",
            Self::Showrunner => "showrunner",
            Self::ScriptWriter => "script writer",
            Self::Summarizer => "summarizer",
            Self::Critic => "script critic",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
