mod episode_cmds;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sitcom_config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "sitcom",
    version,
    about = "Multi-agent sitcom writers' room with scene continuity memory"
)]
struct Cli {
    /// TOML configuration file; missing files fall back to defaults.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pitch a new sitcom concept.
    Pitch {
        /// Themes, ideas or settings to work in.
        keywords: Vec<String>,
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Outline the pilot episode for a saved concept.
    Outline {
        #[arg(long, value_name = "PATH")]
        concept: PathBuf,
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Review an outline for coherence.
    Validate {
        #[arg(long, value_name = "PATH")]
        concept: PathBuf,
        #[arg(long, value_name = "PATH")]
        outline: PathBuf,
    },
    /// Write and store scene 1 of an outline.
    SceneOne {
        #[arg(long, value_name = "PATH")]
        concept: PathBuf,
        #[arg(long, value_name = "PATH")]
        outline: PathBuf,
    },
    /// Evaluate and plan one scene against a stored run.
    #[command(name = "writers-room")]
    WritersRoom {
        #[arg(long, value_name = "PATH")]
        outline: PathBuf,
        #[arg(long)]
        scene: u32,
        /// Run to replay from the scene log; defaults to the latest run.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Pitch, outline and write a whole episode.
    Run {
        keywords: Vec<String>,
        /// Number of scenes to write; 0 writes every outlined scene.
        #[arg(long)]
        scenes: Option<u32>,
        /// Start from a saved concept instead of pitching.
        #[arg(long, value_name = "PATH", requires = "outline")]
        concept: Option<PathBuf>,
        /// Start from a saved outline instead of outlining.
        #[arg(long, value_name = "PATH", requires = "concept")]
        outline: Option<PathBuf>,
        /// Skip the writers' room and script every scene from the outline.
        #[arg(long)]
        baseline: bool,
        /// Score the finished episode in scene blocks.
        #[arg(long)]
        evaluate: bool,
        /// Explain how related earlier scenes shaped each scene.
        #[arg(long)]
        explain_related: bool,
    },
    /// Score a saved script in blocks of scenes.
    Evaluate {
        #[arg(long, value_name = "PATH")]
        script: PathBuf,
        #[arg(long, value_name = "PATH")]
        outline: PathBuf,
        /// Pitch to score against when the outline has no episode concept.
        #[arg(long, value_name = "PATH")]
        concept: Option<PathBuf>,
        /// Scenes per block; defaults to `pipeline.evaluation_block_size`.
        #[arg(long)]
        block_size: Option<usize>,
        /// Print the scores as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration and check the providers.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Pitch { keywords, out } => {
            episode_cmds::run_pitch(config, &keywords, out.as_deref()).await?;
        }
        Commands::Outline { concept, out } => {
            episode_cmds::run_outline(config, &concept, out.as_deref()).await?;
        }
        Commands::Validate { concept, outline } => {
            episode_cmds::run_validate(config, &concept, &outline).await?;
        }
        Commands::SceneOne { concept, outline } => {
            episode_cmds::run_scene_one(config, &concept, &outline).await?;
        }
        Commands::WritersRoom {
            outline,
            scene,
            run_id,
        } => {
            episode_cmds::run_writers_room(config, &outline, scene, run_id.as_deref()).await?;
        }
        Commands::Run {
            keywords,
            scenes,
            concept,
            outline,
            baseline,
            evaluate,
            explain_related,
        } => {
            config.pipeline.evaluate_episode |= evaluate;
            config.pipeline.explain_related_scenes |= explain_related;
            let inputs = concept.zip(outline);
            episode_cmds::run_episode(config, keywords, scenes, inputs, baseline).await?;
        }
        Commands::Evaluate {
            script,
            outline,
            concept,
            block_size,
            json,
        } => {
            if let Some(size) = block_size {
                config.pipeline.evaluation_block_size = size;
            }
            episode_cmds::run_evaluate(config, &script, &outline, concept.as_deref(), json).await?;
        }
        Commands::Doctor => {
            episode_cmds::run_doctor(&config).await?;
        }
    }

    Ok(())
}
