//! Error types for the writers' room agents.

use sitcom_llm::LlmError;

use crate::role::AgentRole;

/// A model reply that does not follow the expected response grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("response is empty")]
    Empty,

    #[error("missing section '{section}'")]
    MissingSection { section: String },

    #[error("first line does not declare a yes/no verdict: {line:?}")]
    MissingVerdict { line: String },

    #[error("section '{section}' needs {expected} item(s), found {found}")]
    TooFewItems {
        section: String,
        expected: usize,
        found: usize,
    },

    #[error("section '{section}' repeats an agent recommendation verbatim: {line:?}")]
    VerbatimCopy { section: String, line: String },

    #[error("score for '{criterion}' must be between 1 and 10, got {score}")]
    ScoreOutOfRange { criterion: String, score: u32 },

    #[error("scene {scene_number} not found in outline")]
    SceneNotFound { scene_number: u32 },
}

/// Failure of one agent step, tagged with the agent and scene it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Missing or malformed input; never retried.
    #[error("{role} (scene {scene_number}): invalid input: {reason}")]
    InvalidInput {
        role: AgentRole,
        scene_number: u32,
        reason: String,
    },

    /// The model call failed for good, usually after exhausting retries.
    #[error("{role} (scene {scene_number}): {step} failed: {source}")]
    Generation {
        role: AgentRole,
        scene_number: u32,
        step: &'static str,
        #[source]
        source: LlmError,
    },
}

impl AgentError {
    pub fn role(&self) -> AgentRole {
        match self {
            Self::InvalidInput { role, .. } | Self::Generation { role, .. } => *role,
        }
    }

    pub fn scene_number(&self) -> u32 {
        match self {
            Self::InvalidInput { scene_number, .. } | Self::Generation { scene_number, .. } => {
                *scene_number
            }
        }
    }

    /// `true` when every retry attempt was used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                source: LlmError::ExhaustedRetries { .. },
                ..
            }
        )
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_scene_and_agent() {
        let err = AgentError::InvalidInput {
            role: AgentRole::Planner,
            scene_number: 4,
            reason: "comedic recommendations are empty".into(),
        };
        assert_eq!(err.role(), AgentRole::Planner);
        assert_eq!(err.scene_number(), 4);
        assert_eq!(
            err.to_string(),
            "scene planner (scene 4): invalid input: comedic recommendations are empty"
        );
    }

    #[test]
    fn exhausted_generation_is_detected() {
        let err = AgentError::Generation {
            role: AgentRole::Environment,
            scene_number: 3,
            step: "transition check",
            source: LlmError::ExhaustedRetries {
                operation: "environment agent: transition check".into(),
                attempts: 3,
                last: Box::new(LlmError::EmptyResponse {
                    provider: "openai".into(),
                }),
            },
        };
        assert!(err.is_exhausted());
        assert!(err.to_string().starts_with("environment agent (scene 3): transition check failed"));
    }
}
