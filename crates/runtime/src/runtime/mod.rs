//! Episode runtime: configuration, model access and the per-scene loop.

mod episode;
mod scoring;
mod writers_room;

use std::sync::Arc;

use sitcom_agent::{AgentLlm, CharacterAgent, ComedicAgent, EnvironmentAgent, ScenePlanner};
use sitcom_config::AppConfig;
use sitcom_llm::{Embedder, LlmClient, LlmResult, RetryPolicy, build_client, build_embedder};
use sitcom_memory::{SceneEventLog, SceneMemory};
use tokio::sync::mpsc;
use tracing::info;

use crate::events::{PipelineEvent, PipelineState};

pub use episode::{Episode, EpisodeRequest, SceneOutcome};
pub use writers_room::{RelatedScene, WritersRoomNotes, render_related};

/// Everything one episode run needs: the agents, the script writer's model
/// access, the embedder that feeds scene memory, and an optional progress
/// channel.
#[derive(Clone)]
pub struct EpisodeRuntime {
    config: AppConfig,
    llm: AgentLlm,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    character: CharacterAgent,
    comedic: ComedicAgent,
    environment: EnvironmentAgent,
    planner: ScenePlanner,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EpisodeRuntime {
    pub fn new(config: AppConfig, client: Arc<dyn LlmClient>, embedder: Arc<dyn Embedder>) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let llm = AgentLlm::new(client, retry, config.llm.sampling.clone());
        if config.agents.config_version != 1 {
            tracing::warn!(
                version = config.agents.config_version,
                "unknown agents config version; using current agent behavior"
            );
        }
        Self {
            character: CharacterAgent::new(llm.clone(), &config.agents),
            comedic: ComedicAgent::new(llm.clone(), &config.agents),
            environment: EnvironmentAgent::new(llm.clone(), &config.agents),
            planner: ScenePlanner::new(llm.clone()),
            llm,
            embedder,
            retry,
            config,
            events: None,
        }
    }

    /// Build the provider client and embedder described by `config`.
    pub fn from_config(config: AppConfig) -> LlmResult<Self> {
        let client = build_client(&config.llm)?;
        let embedder = build_embedder(&config)?;
        info!(
            provider = client.provider(),
            model = config.active_model(),
            dimension = embedder.dimension(),
            "episode runtime ready"
        );
        Ok(Self::new(config, client, embedder))
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn llm(&self) -> &AgentLlm {
        &self.llm
    }

    /// An empty memory sized for this runtime's embedder.
    pub fn new_memory(&self) -> SceneMemory {
        SceneMemory::new(self.embedder.dimension())
    }

    fn event_log(&self) -> Option<SceneEventLog> {
        let path = self.config.memory.export_path.trim();
        (!path.is_empty()).then(|| SceneEventLog::new(path))
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn enter(&self, state: PipelineState) {
        info!(state = %state, "pipeline state");
        self.emit(PipelineEvent::State(state));
    }
}
