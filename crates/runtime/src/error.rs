use std::path::PathBuf;

use sitcom_agent::{AgentError, AgentRole};
use sitcom_llm::LlmError;
use sitcom_memory::StorageError;

/// First fatal failure of an episode run, with enough context to report
/// which scene and which agent it came from.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("scene {scene_number}: scene memory rejected the record: {source}")]
    Storage {
        scene_number: u32,
        #[source]
        source: StorageError,
    },

    #[error("scene {scene_number}: embedding failed: {source}")]
    Embedding {
        scene_number: u32,
        #[source]
        source: LlmError,
    },

    #[error("scene {scene_number} is missing from the outline")]
    MissingScene { scene_number: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn scene_number(&self) -> Option<u32> {
        match self {
            Self::Agent(err) => Some(err.scene_number()),
            Self::Storage { scene_number, .. }
            | Self::Embedding { scene_number, .. }
            | Self::MissingScene { scene_number } => Some(*scene_number),
            Self::InvalidInput(_) | Self::Output { .. } => None,
        }
    }

    pub fn agent(&self) -> Option<AgentRole> {
        match self {
            Self::Agent(err) => Some(err.role()),
            _ => None,
        }
    }

    pub(crate) fn storage(scene_number: u32) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Storage {
            scene_number,
            source,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_exposed() {
        let err = PipelineError::storage(4)(StorageError::OutOfOrder {
            last: 4,
            attempted: 4,
        });
        assert_eq!(err.scene_number(), Some(4));
        assert_eq!(err.agent(), None);
        assert!(err.to_string().starts_with("scene 4: scene memory rejected the record"));

        let err = PipelineError::from(AgentError::InvalidInput {
            role: AgentRole::Comedic,
            scene_number: 6,
            reason: "scene description is empty".into(),
        });
        assert_eq!(err.agent(), Some(AgentRole::Comedic));
        assert_eq!(err.scene_number(), Some(6));
    }
}
