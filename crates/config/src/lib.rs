use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── LLM provider ──────────────────────────────────────────────────────────────

/// Which completion backend the writers' room talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Ollama,
}

/// A temperature / nucleus-sampling pair used for one family of calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPreset {
    pub temperature: f32,
    pub top_p: f32,
}

impl SamplingPreset {
    pub const fn new(temperature: f32, top_p: f32) -> Self {
        Self { temperature, top_p }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Continuity checks and extraction.  Kept at zero so verdicts are stable.
    pub analysis: SamplingPreset,
    /// Recommendations, scene plans and scene scripts.
    pub creative: SamplingPreset,
    pub pitch: SamplingPreset,
    pub outline: SamplingPreset,
    pub validation: SamplingPreset,
    pub summary: SamplingPreset,
    /// Scoring finished scene blocks.
    pub evaluation: SamplingPreset,
    /// Explaining how related earlier scenes shaped a scene.
    pub explanation: SamplingPreset,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            analysis: SamplingPreset::new(0.0, 1.0),
            creative: SamplingPreset::new(0.7, 0.9),
            pitch: SamplingPreset::new(0.85, 1.0),
            outline: SamplingPreset::new(0.8, 1.0),
            validation: SamplingPreset::new(0.5, 1.0),
            summary: SamplingPreset::new(0.4, 1.0),
            evaluation: SamplingPreset::new(0.1, 1.0),
            explanation: SamplingPreset::new(0.4, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub openai_model: String,
    pub openai_base_url: String,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    pub openai_api_key: String,
    pub ollama_model: String,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
    pub request_timeout_secs: u64,
    pub sampling: SamplingConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: String::new(),
            ollama_model: "llama3.1:8b".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
            sampling: SamplingConfig::default(),
        }
    }
}

// ── Retry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per external call, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every attempt after that.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

// ── Agents ────────────────────────────────────────────────────────────────────

/// Lookback windows for the three continuity agents.
///
/// `config_version` is bumped whenever the meaning of a field changes so that
/// stale config files can be told apart from current ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub config_version: u32,
    pub character_lookback: usize,
    pub comedic_lookback: usize,
    pub environment_lookback: usize,
    /// Window used by every agent while evaluating scene 2, when only the
    /// opening scene exists.
    pub first_scene_lookback: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            config_version: 1,
            character_lookback: 3,
            comedic_lookback: 3,
            environment_lookback: 3,
            first_scene_lookback: 1,
        }
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing; needs no network.
    #[default]
    Hash,
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    /// Every vector appended to scene memory must have exactly this length.
    pub embedding_dimension: usize,
    /// When non-empty, every stored scene is appended here as JSONL.
    pub export_path: String,
    /// How many related earlier scenes are attached to a scene plan.
    pub related_scenes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_backend: EmbeddingBackend::Hash,
            embedding_model: "all-minilm".to_string(),
            embedding_dimension: 384,
            export_path: String::new(),
            related_scenes: 2,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of scenes requested from the outline generator.
    pub outline_scenes: u32,
    /// Stop after this many scenes.  `0` means "every scene in the outline".
    pub target_scenes: u32,
    pub validate_outline: bool,
    pub output_dir: String,
    /// Score the finished episode in blocks of `evaluation_block_size` scenes.
    pub evaluate_episode: bool,
    pub evaluation_block_size: usize,
    /// Ask the model how the related earlier scenes shaped each scene.
    pub explain_related_scenes: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outline_scenes: 20,
            target_scenes: 0,
            validate_outline: true,
            output_dir: "scripts".to_string(),
            evaluate_episode: false,
            evaluation_block_size: 5,
            explain_related_scenes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub agents: AgentsConfig,
    pub memory: MemoryConfig,
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.llm.openai_api_key = key;
            }
        }

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.llm.provider = ProviderKind::Ollama;
                config.llm.ollama_base_url = value;
            }
        }

        if let Ok(model) = env::var("SITCOM_MODEL") {
            if !model.is_empty() {
                match config.llm.provider {
                    ProviderKind::OpenAi => config.llm.openai_model = model,
                    ProviderKind::Ollama => config.llm.ollama_model = model,
                }
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        match self.llm.provider {
            ProviderKind::OpenAi => &self.llm.openai_model,
            ProviderKind::Ollama => &self.llm.ollama_model,
        }
    }

    /// Copy of the config with secrets masked, for `sitcom doctor`.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.llm.openai_api_key.is_empty() {
            copy.llm.openai_api_key = "***".to_string();
        }
        copy
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Tests that touch process env vars must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn pipeline_defaults_match_writers_room_conventions() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay_ms, 1000);
        assert_eq!(cfg.agents.character_lookback, 3);
        assert_eq!(cfg.agents.comedic_lookback, 3);
        assert_eq!(cfg.agents.environment_lookback, 3);
        assert_eq!(cfg.agents.first_scene_lookback, 1);
        assert_eq!(cfg.pipeline.outline_scenes, 20);
        assert!(cfg.pipeline.validate_outline);
        assert!(!cfg.pipeline.evaluate_episode);
        assert_eq!(cfg.pipeline.evaluation_block_size, 5);
        assert_eq!(cfg.llm.sampling.evaluation.temperature, 0.1);
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    #[test]
    fn analysis_sampling_is_deterministic() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.analysis, SamplingPreset::new(0.0, 1.0));
        assert_eq!(sampling.creative, SamplingPreset::new(0.7, 0.9));
        assert!((sampling.summary.temperature - 0.4).abs() < f32::EPSILON);
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.memory.embedding_dimension, 384);
        assert_eq!(cfg.memory.embedding_backend, EmbeddingBackend::Hash);
    }

    #[test]
    fn load_from_valid_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
ollama_model = "mistral:7b"

[llm.sampling.creative]
temperature = 0.9
top_p = 0.95

[agents]
comedic_lookback = 5

[memory]
embedding_backend = "ollama"
embedding_dimension = 768

[pipeline]
target_scenes = 4
validate_outline = false
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Ollama);
        assert_eq!(cfg.active_model(), "mistral:7b");
        assert_eq!(cfg.llm.sampling.creative, SamplingPreset::new(0.9, 0.95));
        // Untouched presets keep their defaults.
        assert_eq!(cfg.llm.sampling.analysis, SamplingPreset::new(0.0, 1.0));
        assert_eq!(cfg.agents.comedic_lookback, 5);
        assert_eq!(cfg.agents.character_lookback, 3);
        assert_eq!(cfg.memory.embedding_backend, EmbeddingBackend::Ollama);
        assert_eq!(cfg.memory.embedding_dimension, 768);
        assert_eq!(cfg.pipeline.target_scenes, 4);
        assert!(!cfg.pipeline.validate_outline);
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.pipeline.output_dir = "/tmp/episodes".to_string();
        cfg.retry.base_delay_ms = 250;
        cfg.memory.export_path = "memory.jsonl".to_string();

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.pipeline.output_dir, "/tmp/episodes");
        assert_eq!(loaded.retry.base_delay_ms, 250);
        assert_eq!(loaded.memory.export_path, "memory.jsonl");
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_overrides_api_key_and_provider() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[llm]\nopenai_api_key = \"from-file\"\n").unwrap();

        // SAFETY: env access is serialized by ENV_LOCK.
        unsafe { env::set_var("OPENAI_API_KEY", "from-env") };
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.llm.openai_api_key, "from-env");
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);

        unsafe { env::set_var("OLLAMA_BASE_URL", "http://gpu-box:11434") };
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Ollama);
        assert_eq!(cfg.llm.ollama_base_url, "http://gpu-box:11434");

        unsafe {
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("OLLAMA_BASE_URL");
        }
    }

    #[test]
    fn redacted_masks_api_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.openai_api_key = "sk-secret".to_string();
        assert_eq!(cfg.redacted().llm.openai_api_key, "***");
        assert!(AppConfig::default().redacted().llm.openai_api_key.is_empty());
    }
}
