use std::path::{Path, PathBuf};

use serde::Serialize;
use sitcom_agent::ScenePlan;
use sitcom_agent::text::{episode_concept, extract_scene, file_stem, outline_scene_count};
use sitcom_memory::SceneMemory;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{EpisodeRuntime, RelatedScene, WritersRoomNotes, render_related};
use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::{BlockScores, ScriptScene};
use crate::events::{PipelineEvent, PipelineState};
use crate::writing::{self, Concept, OutlineReview};

#[derive(Debug, Clone, Default)]
pub struct EpisodeRequest {
    pub keywords: Vec<String>,
    /// Overrides `pipeline.target_scenes`; zero means every outlined scene.
    pub target_scenes: Option<u32>,
}

/// What the writers' room produced for one scene.  Scene 1 and baseline
/// scenes have no notes or plan.
#[derive(Debug, Clone, Serialize)]
pub struct SceneOutcome {
    pub scene_number: u32,
    pub notes: Option<WritersRoomNotes>,
    pub plan: Option<ScenePlan>,
    pub related: Vec<RelatedScene>,
    /// Set when `pipeline.explain_related_scenes` is on and scenes were related.
    pub related_explanation: Option<String>,
    pub script: String,
}

impl SceneOutcome {
    fn plain(scene_number: u32, script: String) -> Self {
        Self {
            scene_number,
            notes: None,
            plan: None,
            related: Vec::new(),
            related_explanation: None,
            script,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Episode {
    pub run_id: Uuid,
    pub concept: Concept,
    pub outline: String,
    pub review: Option<OutlineReview>,
    pub scenes: Vec<SceneOutcome>,
    pub memory: SceneMemory,
    pub script_path: Option<PathBuf>,
    /// Block scores; empty unless `pipeline.evaluate_episode` is on.
    pub evaluation: Vec<BlockScores>,
}

impl Episode {
    pub fn assembled_script(&self) -> String {
        self.scenes
            .iter()
            .map(|scene| scene.script.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn script_scenes(&self) -> Vec<ScriptScene> {
        self.scenes
            .iter()
            .map(|scene| ScriptScene {
                scene_number: scene.scene_number,
                script: scene.script.clone(),
            })
            .collect()
    }

    /// Premise used when scoring: the outline's episode concept, else the pitch.
    pub fn premise(&self) -> String {
        episode_concept(&self.outline).unwrap_or_else(|| self.concept.text.clone())
    }
}

impl EpisodeRuntime {
    pub async fn pitch(&self, keywords: &[String]) -> PipelineResult<Concept> {
        self.enter(PipelineState::Pitch);
        let concept = writing::pitch(&self.llm, keywords).await?;
        info!(title = %concept.title, "concept pitched");
        Ok(concept)
    }

    pub async fn outline(&self, concept: &Concept) -> PipelineResult<String> {
        self.enter(PipelineState::Outline);
        let outline = writing::outline(&self.llm, &concept.text, self.config.pipeline.outline_scenes).await?;
        info!(scenes = outline_scene_count(&outline), "outline written");
        Ok(outline)
    }

    /// Review the outline.  The verdict is advisory and never stops a run.
    pub async fn review(&self, concept: &Concept, outline: &str) -> PipelineResult<OutlineReview> {
        let review = writing::review_outline(&self.llm, &concept.text, outline).await?;
        if !review.coherent {
            warn!("outline review flagged coherence problems; continuing");
        }
        self.emit(PipelineEvent::OutlineReviewed {
            coherent: review.coherent,
        });
        self.enter(PipelineState::Validated);
        Ok(review)
    }

    /// Pitch, outline, then every scene through the writers' room.
    #[instrument(skip_all)]
    pub async fn run_episode(&self, request: &EpisodeRequest) -> PipelineResult<Episode> {
        let concept = self.pitch(&request.keywords).await?;
        let outline = self.outline(&concept).await?;
        self.run_from_outline(concept, outline, request.target_scenes).await
    }

    /// Produce the episode from an existing concept and outline.
    pub async fn run_from_outline(
        &self,
        concept: Concept,
        outline: String,
        target_scenes: Option<u32>,
    ) -> PipelineResult<Episode> {
        let available = outline_scene_count(&outline);
        if available == 0 {
            return Err(PipelineError::InvalidInput("outline has no scenes".to_string()));
        }
        let target = self.scene_target(target_scenes, available);

        let review = if self.config.pipeline.validate_outline {
            Some(self.review(&concept, &outline).await?)
        } else {
            None
        };

        let run_id = Uuid::new_v4();
        info!(%run_id, title = %concept.title, target, available, "episode run started");
        if let Some(premise) = episode_concept(&outline) {
            info!(%run_id, premise = %premise, "episode concept");
        }

        let mut memory = self.new_memory();
        let mut scenes = Vec::with_capacity(target as usize);
        scenes.push(
            self.write_scene_one(&mut memory, run_id, &concept.title, &outline)
                .await?,
        );
        for scene_number in 2..=target {
            scenes.push(
                self.write_next_scene(&mut memory, run_id, &concept.title, &outline, scene_number)
                    .await?,
            );
        }

        let episode = Episode {
            run_id,
            concept,
            outline,
            review,
            scenes,
            memory,
            script_path: None,
            evaluation: Vec::new(),
        };
        self.finish(episode, "").await
    }

    /// Write the episode without the writers' room: every scene after the
    /// first is scripted from the outline and the last three scripts only.
    #[instrument(skip_all)]
    pub async fn run_baseline(
        &self,
        concept: Concept,
        outline: String,
        target_scenes: Option<u32>,
    ) -> PipelineResult<Episode> {
        let available = outline_scene_count(&outline);
        if available == 0 {
            return Err(PipelineError::InvalidInput("outline has no scenes".to_string()));
        }
        let target = self.scene_target(target_scenes, available);
        let run_id = Uuid::new_v4();
        info!(%run_id, title = %concept.title, target, "baseline run started");

        self.enter(PipelineState::Scene1);
        let description = scene_description(&outline, 1)?;
        let first = writing::scene_one_script(&self.llm, &concept.title, &description).await?;
        let mut scenes = vec![SceneOutcome::plain(1, first)];
        for scene_number in 2..=target {
            self.enter(PipelineState::Scripting(scene_number));
            let previous: Vec<&str> = scenes.iter().map(|s| s.script.as_str()).collect();
            let script = writing::baseline_scene_script(
                &self.llm,
                &concept.title,
                &outline,
                scene_number,
                &previous[previous.len().saturating_sub(writing::BASELINE_CONTEXT_SCENES)..],
            )
            .await?;
            scenes.push(SceneOutcome::plain(scene_number, script));
        }

        let episode = Episode {
            run_id,
            concept,
            outline,
            review: None,
            scenes,
            memory: self.new_memory(),
            script_path: None,
            evaluation: Vec::new(),
        };
        self.finish(episode, "_baseline").await
    }

    /// Save the script, score it when configured, and mark the run done.
    async fn finish(&self, mut episode: Episode, suffix: &str) -> PipelineResult<Episode> {
        let path = self.save_script(&episode, suffix).await?;
        self.emit(PipelineEvent::ScriptSaved {
            path: path.display().to_string(),
        });
        episode.script_path = Some(path);

        if self.config.pipeline.evaluate_episode {
            match self
                .evaluate_episode(&episode.premise(), &episode.outline, &episode.script_scenes())
                .await
            {
                Ok(scores) => episode.evaluation = scores,
                Err(err) => warn!(%err, "episode evaluation failed; the script is kept"),
            }
        }
        self.enter(PipelineState::Done);
        Ok(episode)
    }

    /// Script scene 1 straight from the outline and store it.
    pub async fn write_scene_one(
        &self,
        memory: &mut SceneMemory,
        run_id: Uuid,
        title: &str,
        outline: &str,
    ) -> PipelineResult<SceneOutcome> {
        self.enter(PipelineState::Scene1);
        let description = scene_description(outline, 1)?;
        let script = writing::scene_one_script(&self.llm, title, &description).await?;
        self.store_scene(memory, run_id, title, 1, &script).await?;
        Ok(SceneOutcome::plain(1, script))
    }

    /// Evaluate, plan, script and store one scene after the first.
    #[instrument(skip_all, fields(scene = scene_number))]
    pub async fn write_next_scene(
        &self,
        memory: &mut SceneMemory,
        run_id: Uuid,
        title: &str,
        outline: &str,
        scene_number: u32,
    ) -> PipelineResult<SceneOutcome> {
        let description = scene_description(outline, scene_number)?;
        let notes = self.evaluate_scene(memory, scene_number, &description).await?;
        let related = self.related_scenes(memory, scene_number, &description).await?;
        let plan = self.plan_scene(&notes, &description, &related).await?;

        self.enter(PipelineState::Scripting(scene_number));
        let script =
            writing::scene_script(&self.llm, title, &description, &plan, &render_related(&related))
                .await?;
        self.store_scene(memory, run_id, title, scene_number, &script)
            .await?;

        let related_explanation = if self.config.pipeline.explain_related_scenes && !related.is_empty() {
            match self.explain_related(title, scene_number, &script, &related).await {
                Ok(explanation) => Some(explanation),
                Err(err) => {
                    warn!(scene = scene_number, %err, "related scene explanation failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(SceneOutcome {
            scene_number,
            notes: Some(notes),
            plan: Some(plan),
            related,
            related_explanation,
            script,
        })
    }

    /// Write the assembled script to `<output_dir>/<title><suffix>.txt`.
    pub async fn save_script(&self, episode: &Episode, suffix: &str) -> PipelineResult<PathBuf> {
        let dir = Path::new(&self.config.pipeline.output_dir);
        let path = dir.join(format!("{}{suffix}.txt", file_stem(&episode.concept.title)));
        let output = |source: std::io::Error| PipelineError::Output {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(dir).await.map_err(output)?;
        tokio::fs::write(&path, episode.assembled_script())
            .await
            .map_err(output)?;
        info!(path = %path.display(), scenes = episode.scenes.len(), "script saved");
        Ok(path)
    }

    pub(super) fn scene_target(&self, requested: Option<u32>, available: u32) -> u32 {
        let target = requested.unwrap_or(self.config.pipeline.target_scenes);
        if target == 0 {
            available
        } else {
            target.min(available)
        }
    }
}

fn scene_description(outline: &str, scene_number: u32) -> PipelineResult<String> {
    extract_scene(outline, scene_number).ok_or(PipelineError::MissingScene { scene_number })
}
