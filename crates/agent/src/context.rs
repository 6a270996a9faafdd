use sitcom_memory::{SceneMemory, SceneRecord};

use crate::bundle::SceneRange;
use crate::error::{AgentError, AgentResult};
use crate::role::AgentRole;

/// What one agent sees while evaluating one candidate scene: the trailing
/// window of memory and the candidate's outline description.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub scene_number: u32,
    pub description: &'a str,
    pub window: &'a [SceneRecord],
    pub memory: &'a SceneMemory,
    pub range: SceneRange,
}

impl<'a> EvaluationContext<'a> {
    /// Build the context, rejecting empty descriptions and any stored record
    /// that is not strictly before `scene_number`.
    pub fn new(
        role: AgentRole,
        memory: &'a SceneMemory,
        scene_number: u32,
        description: &'a str,
        num_scenes: usize,
    ) -> AgentResult<Self> {
        let invalid = |reason: String| AgentError::InvalidInput {
            role,
            scene_number,
            reason,
        };

        if description.trim().is_empty() {
            return Err(invalid("scene description is empty".to_string()));
        }
        if let Some(last) = memory.last_scene_number() {
            if last >= scene_number {
                return Err(invalid(format!(
                    "memory already holds scene {last}; cannot evaluate scene {scene_number}"
                )));
            }
        }

        Ok(Self {
            scene_number,
            description: description.trim(),
            window: memory.window(num_scenes),
            memory,
            range: SceneRange::consulted(scene_number, num_scenes),
        })
    }

    pub fn window_scene_numbers(&self) -> Vec<u32> {
        self.window.iter().map(|r| r.scene_number).collect()
    }
}

/// Lookback to use for `scene_number`: the opening evaluation (scene 2)
/// only ever has scene 1 to look at.
pub fn lookback_for(scene_number: u32, num_scenes: usize, first_scene_lookback: usize) -> usize {
    if scene_number <= 2 {
        first_scene_lookback
    } else {
        num_scenes
    }
}
