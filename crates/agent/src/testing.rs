//! Fixtures shared by the agent test modules.

use std::sync::Arc;

use sitcom_config::SamplingConfig;
use sitcom_llm::{LlmResult, RetryPolicy, ScriptedLlm};
use sitcom_memory::{SceneMemory, SceneMetadata, SceneRecord};

use crate::llm::AgentLlm;

pub const DIMENSION: usize = 4;

pub fn record(
    scene_number: u32,
    characters: &[&str],
    location: &str,
    joke: &str,
    tone: &str,
) -> SceneRecord {
    let metadata = SceneMetadata {
        summary: format!("Scene {scene_number} summary with {}.", characters.join(" and ")),
        characters: characters.iter().map(|c| c.to_string()).collect(),
        location: location.to_string(),
        recurring_joke: joke.to_string(),
        emotional_tone: tone.to_string(),
    };
    SceneRecord::new(scene_number, metadata, format!("SCRIPT {scene_number}"))
}

pub fn memory_with(records: Vec<SceneRecord>) -> SceneMemory {
    let mut memory = SceneMemory::new(DIMENSION);
    for record in records {
        let n = record.scene_number as f32;
        memory
            .append(record, vec![n, 1.0, 0.0, 0.0])
            .expect("fixture records are ordered");
    }
    memory
}

pub fn scripted(
    responder: impl Fn(&str) -> LlmResult<String> + Send + Sync + 'static,
) -> (Arc<ScriptedLlm>, AgentLlm) {
    let llm = Arc::new(ScriptedLlm::with_responder(responder));
    let agent_llm = AgentLlm::new(llm.clone(), RetryPolicy::default(), SamplingConfig::default());
    (llm, agent_llm)
}
