use std::fmt;

use serde::Serialize;
use sitcom_agent::{
    AgentRecommendationBundle, CharacterReport, ComedicReport, EnvironmentReport, ScenePlan,
};
use sitcom_llm::retry_with_backoff;
use sitcom_memory::{SceneMemory, SceneRecord, SceneRecordEvent};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::EpisodeRuntime;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{PipelineEvent, PipelineState};
use crate::writing;

/// The three continuity reports for one scene.
#[derive(Debug, Clone, Serialize)]
pub struct WritersRoomNotes {
    pub scene_number: u32,
    pub character: CharacterReport,
    pub comedic: ComedicReport,
    pub environment: EnvironmentReport,
}

impl WritersRoomNotes {
    /// Bundles in planner order: character, comedic, environment.
    pub fn bundles(&self) -> [AgentRecommendationBundle; 3] {
        [
            self.character.bundle(),
            self.comedic.bundle(),
            self.environment.bundle(),
        ]
    }
}

/// An earlier scene retrieved by similarity to the scene being planned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedScene {
    pub scene_number: u32,
    pub similarity: f32,
    pub summary: String,
}

impl fmt::Display for RelatedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scene {} (similarity {:.2}): {}",
            self.scene_number, self.similarity, self.summary
        )
    }
}

/// One related scene per line; empty when there are none.
pub fn render_related(related: &[RelatedScene]) -> String {
    related
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl EpisodeRuntime {
    /// Run the three continuity agents against the same memory snapshot.
    ///
    /// The agents only read `memory`, so they run concurrently; the first
    /// failure aborts the scene.
    #[instrument(skip_all, fields(scene = scene_number))]
    pub async fn evaluate_scene(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
    ) -> PipelineResult<WritersRoomNotes> {
        self.enter(PipelineState::Evaluating(scene_number));
        let (character, comedic, environment) = tokio::try_join!(
            self.character.evaluate(memory, scene_number, description),
            self.comedic.evaluate(memory, scene_number, description),
            self.environment.evaluate(memory, scene_number, description),
        )?;

        info!(
            scene = scene_number,
            character = character.is_consistent,
            comedic = comedic.tone_consistent,
            environment = environment.is_consistent,
            "writers' room verdicts"
        );
        self.emit(PipelineEvent::SceneEvaluated {
            scene_number,
            character: character.is_consistent,
            comedic: comedic.tone_consistent,
            environment: environment.is_consistent,
        });

        Ok(WritersRoomNotes {
            scene_number,
            character,
            comedic,
            environment,
        })
    }

    /// Earlier scenes most similar to `description`, best first.
    ///
    /// Empty when memory is empty or `memory.related_scenes` is zero.
    pub async fn related_scenes(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
    ) -> PipelineResult<Vec<RelatedScene>> {
        let k = self.config.memory.related_scenes;
        if memory.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed(scene_number, description).await?;
        let nearest = memory
            .nearest(&query, k)
            .map_err(PipelineError::storage(scene_number))?;
        Ok(nearest
            .into_iter()
            .map(|hit| RelatedScene {
                scene_number: hit.record.scene_number,
                similarity: hit.score,
                summary: hit.record.summary.clone(),
            })
            .collect())
    }

    pub async fn plan_scene(
        &self,
        notes: &WritersRoomNotes,
        description: &str,
        related: &[RelatedScene],
    ) -> PipelineResult<ScenePlan> {
        self.enter(PipelineState::Planning(notes.scene_number));
        let [character, comedic, environment] = notes.bundles();
        let plan = self
            .planner
            .plan(
                notes.scene_number,
                description,
                &character,
                &comedic,
                &environment,
                &render_related(related),
            )
            .await?;
        Ok(plan)
    }

    /// Summarize `script`, embed the summary and append the record.
    ///
    /// Nothing is appended unless every step succeeds.  The JSONL export is
    /// best effort: a failed write is logged and the run continues.
    #[instrument(skip_all, fields(scene = scene_number))]
    pub async fn store_scene(
        &self,
        memory: &mut SceneMemory,
        run_id: Uuid,
        title: &str,
        scene_number: u32,
        script: &str,
    ) -> PipelineResult<()> {
        self.enter(PipelineState::Summarizing(scene_number));
        let metadata = writing::summarize(&self.llm, title, scene_number, script).await?;
        let embedding = self.embed(scene_number, &metadata.summary).await?;
        let record = SceneRecord::new(scene_number, metadata, script);
        let location = record.location.clone();

        let event = self
            .event_log()
            .map(|log| (log, SceneRecordEvent::new(run_id, record.clone(), embedding.clone())));
        memory
            .append(record, embedding)
            .map_err(PipelineError::storage(scene_number))?;

        if let Some((log, event)) = event {
            if let Err(err) = log.append(&event).await {
                warn!(scene = scene_number, path = %log.path().display(), %err, "scene export failed");
            }
        }

        info!(scene = scene_number, location = %location, stored = memory.len(), "scene stored");
        self.emit(PipelineEvent::SceneStored {
            scene_number,
            location,
        });
        Ok(())
    }

    async fn embed(&self, scene_number: u32, text: &str) -> PipelineResult<Vec<f32>> {
        let embedder = self.embedder.as_ref();
        retry_with_backoff(&self.retry, "embed scene text", || embedder.encode(text))
            .await
            .map_err(|source| PipelineError::Embedding {
                scene_number,
                source,
            })
    }
}
