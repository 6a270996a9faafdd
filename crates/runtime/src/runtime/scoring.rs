use sitcom_agent::text::{OutlineScene, parse_outline};
use tracing::{info, instrument};

use super::{EpisodeRuntime, RelatedScene};
use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::{self, BlockScores, ScriptScene};
use crate::events::{PipelineEvent, PipelineState};

impl EpisodeRuntime {
    /// Score a finished episode in blocks of `pipeline.evaluation_block_size`
    /// scenes. Every block after the first sees the outline entries of the
    /// block before it.
    #[instrument(skip_all, fields(scenes = scenes.len()))]
    pub async fn evaluate_episode(
        &self,
        concept: &str,
        outline: &str,
        scenes: &[ScriptScene],
    ) -> PipelineResult<Vec<BlockScores>> {
        if scenes.is_empty() {
            return Err(PipelineError::InvalidInput("there are no scenes to evaluate".to_string()));
        }
        let size = self.config.pipeline.evaluation_block_size.max(1);
        let entries = parse_outline(outline);

        let mut results = Vec::with_capacity(scenes.len().div_ceil(size));
        let mut previous: Vec<OutlineScene> = Vec::new();
        for (index, chunk) in scenes.chunks(size).enumerate() {
            let block = index + 1;
            self.enter(PipelineState::Scoring(block));
            let scores =
                evaluation::evaluate_block(&self.llm, concept, block, chunk, &previous).await?;
            info!(
                block,
                first = scores.first_scene,
                last = scores.last_scene,
                mean = scores.mean(),
                "scene block scored"
            );
            self.emit(PipelineEvent::BlockScored {
                block,
                first_scene: scores.first_scene,
                last_scene: scores.last_scene,
                mean: scores.mean(),
            });
            results.push(scores);

            previous = entries
                .iter()
                .filter(|entry| chunk.iter().any(|scene| scene.scene_number == entry.number))
                .cloned()
                .collect();
        }
        Ok(results)
    }

    pub async fn explain_related(
        &self,
        title: &str,
        scene_number: u32,
        script: &str,
        related: &[RelatedScene],
    ) -> PipelineResult<String> {
        Ok(evaluation::explain_related(&self.llm, title, scene_number, script, related).await?)
    }
}
