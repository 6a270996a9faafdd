use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use sitcom_agent::text::{episode_concept, extract_scene, outline_scene_count};
use sitcom_config::AppConfig;
use sitcom_llm::{build_client, build_embedder};
use sitcom_memory::SceneEventLog;
use sitcom_runtime::evaluation::split_script;
use sitcom_runtime::{
    BlockScores, Concept, Episode, EpisodeRequest, EpisodeRuntime, PipelineEvent, PipelineResult,
};

fn runtime(config: AppConfig) -> Result<EpisodeRuntime> {
    EpisodeRuntime::from_config(config).context("failed to initialise model providers")
}

/// Runtime whose progress events are printed to stderr as they arrive.
/// Pass both halves to [`finish_progress`] so queued events are flushed.
fn runtime_with_progress(config: AppConfig) -> Result<(EpisodeRuntime, JoinHandle<()>)> {
    let runtime = runtime(config)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_progress(rx, print_event);
    Ok((runtime.with_events(tx), printer))
}

fn spawn_progress<F>(mut rx: mpsc::UnboundedReceiver<PipelineEvent>, mut on_event: F) -> JoinHandle<()>
where
    F: FnMut(&PipelineEvent) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            on_event(&event);
        }
    })
}

/// Close the event channel and wait for the printer to drain it.
async fn finish_progress(runtime: EpisodeRuntime, printer: JoinHandle<()>) {
    drop(runtime);
    if let Err(err) = printer.await {
        eprintln!("progress printer stopped early: {err}");
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::State(state) => eprintln!("» {state}"),
        PipelineEvent::OutlineReviewed { coherent } => {
            eprintln!("  outline review: {}", if *coherent { "coherent" } else { "needs work (continuing)" });
        }
        PipelineEvent::SceneEvaluated {
            scene_number,
            character,
            comedic,
            environment,
        } => eprintln!(
            "  scene {scene_number} verdicts: character={} comedic={} environment={}",
            verdict(*character),
            verdict(*comedic),
            verdict(*environment)
        ),
        PipelineEvent::SceneStored {
            scene_number,
            location,
        } => eprintln!("  scene {scene_number} stored ({location})"),
        PipelineEvent::ScriptSaved { path } => eprintln!("  script saved to {path}"),
        PipelineEvent::BlockScored {
            block,
            first_scene,
            last_scene,
            mean,
        } => eprintln!("  block {block} (scenes {first_scene}-{last_scene}) scored {mean:.1}/10"),
    }
}

fn verdict(consistent: bool) -> &'static str {
    if consistent { "ok" } else { "flagged" }
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {what} from {}", path.display()))?;
    if text.trim().is_empty() {
        bail!("{what} file {} is empty", path.display());
    }
    Ok(text)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("saved to {}", path.display());
    Ok(())
}

pub(crate) async fn run_pitch(config: AppConfig, keywords: &[String], out: Option<&Path>) -> Result<()> {
    let runtime = runtime(config)?;
    let concept = runtime.pitch(keywords).await?;
    println!("{}", concept.text);
    if let Some(path) = out {
        write_text(path, &concept.text)?;
    }
    Ok(())
}

pub(crate) async fn run_outline(config: AppConfig, concept: &Path, out: Option<&Path>) -> Result<()> {
    let concept = Concept::from_text(read_text(concept, "concept")?);
    let runtime = runtime(config)?;
    let outline = runtime.outline(&concept).await?;
    println!("{outline}");
    if let Some(path) = out {
        write_text(path, &outline)?;
    }
    Ok(())
}

pub(crate) async fn run_validate(config: AppConfig, concept: &Path, outline: &Path) -> Result<()> {
    let concept = Concept::from_text(read_text(concept, "concept")?);
    let outline = read_text(outline, "outline")?;
    let runtime = runtime(config)?;
    let review = runtime.review(&concept, &outline).await?;
    println!("{}", review.text);
    println!();
    println!("coherent: {}", if review.coherent { "yes" } else { "no" });
    Ok(())
}

pub(crate) async fn run_scene_one(config: AppConfig, concept: &Path, outline: &Path) -> Result<()> {
    let concept = Concept::from_text(read_text(concept, "concept")?);
    let outline = read_text(outline, "outline")?;
    let export = config.memory.export_path.clone();
    let (runtime, printer) = runtime_with_progress(config)?;

    let run_id = Uuid::new_v4();
    let mut memory = runtime.new_memory();
    let scene = runtime
        .write_scene_one(&mut memory, run_id, &concept.title, &outline)
        .await;
    finish_progress(runtime, printer).await;
    println!("{}", scene?.script);

    if export.trim().is_empty() {
        eprintln!("run {run_id}: scene log disabled (memory.export_path is empty)");
    } else {
        eprintln!("run {run_id}: scene 1 logged to {export}");
    }
    Ok(())
}

pub(crate) async fn run_writers_room(
    config: AppConfig,
    outline: &Path,
    scene_number: u32,
    run_id: Option<&str>,
) -> Result<()> {
    if scene_number < 2 {
        bail!("the writers' room starts at scene 2; use `sitcom scene-one` for scene 1");
    }
    let outline = read_text(outline, "outline")?;
    let description = extract_scene(&outline, scene_number)
        .with_context(|| format!("scene {scene_number} is not in the outline"))?;

    let export = config.memory.export_path.trim().to_string();
    if export.is_empty() {
        bail!("memory.export_path is not set; there is no scene log to replay");
    }
    let log = SceneEventLog::new(&export);
    let run_id = match run_id {
        Some(raw) => Uuid::parse_str(raw).with_context(|| format!("invalid run id {raw}"))?,
        None => log
            .runs()?
            .last()
            .copied()
            .with_context(|| format!("no runs recorded in {export}"))?,
    };

    let runtime = runtime(config)?;
    let memory = log.replay(run_id, runtime.new_memory().dimension())?;
    println!("run {run_id}: {} stored scene(s)", memory.len());

    let notes = runtime.evaluate_scene(&memory, scene_number, &description).await?;
    for bundle in notes.bundles() {
        println!();
        println!("── {} ──", bundle.agent);
        println!("consistent: {}", if bundle.is_consistent { "yes" } else { "no" });
        println!("{}", bundle.explanation);
        println!("{}", bundle.recommendations);
    }

    let related = runtime.related_scenes(&memory, scene_number, &description).await?;
    if !related.is_empty() {
        println!();
        println!("── related scenes ──");
        for scene in &related {
            println!("{scene}");
        }
    }
    let plan = runtime.plan_scene(&notes, &description, &related).await?;
    println!();
    println!("{plan}");
    Ok(())
}

pub(crate) async fn run_episode(
    config: AppConfig,
    keywords: Vec<String>,
    scenes: Option<u32>,
    inputs: Option<(std::path::PathBuf, std::path::PathBuf)>,
    baseline: bool,
) -> Result<()> {
    let inputs = match inputs {
        Some((concept, outline)) => {
            let concept = Concept::from_text(read_text(&concept, "concept")?);
            let outline = read_text(&outline, "outline")?;
            eprintln!("outline has {} scene(s)", outline_scene_count(&outline));
            Some((concept, outline))
        }
        None => None,
    };

    let (runtime, printer) = runtime_with_progress(config)?;
    let episode = match (inputs, baseline) {
        (Some((concept, outline)), false) => runtime.run_from_outline(concept, outline, scenes).await,
        (Some((concept, outline)), true) => runtime.run_baseline(concept, outline, scenes).await,
        (None, false) => {
            runtime
                .run_episode(&EpisodeRequest {
                    keywords,
                    target_scenes: scenes,
                })
                .await
        }
        (None, true) => baseline_from_keywords(&runtime, &keywords, scenes).await,
    };
    finish_progress(runtime, printer).await;
    let episode = episode?;

    println!("title: {}", episode.concept.title);
    println!("run id: {}", episode.run_id);
    println!("scenes written: {}", episode.scenes.len());
    if let Some(path) = &episode.script_path {
        println!("script: {}", path.display());
    }
    for scene in &episode.scenes {
        if let Some(explanation) = &scene.related_explanation {
            println!();
            println!("── scene {} related scenes ──", scene.scene_number);
            println!("{explanation}");
        }
    }
    if !episode.evaluation.is_empty() {
        println!();
        print_scores(&episode.evaluation);
    }
    Ok(())
}

async fn baseline_from_keywords(
    runtime: &EpisodeRuntime,
    keywords: &[String],
    scenes: Option<u32>,
) -> PipelineResult<Episode> {
    let concept = runtime.pitch(keywords).await?;
    let outline = runtime.outline(&concept).await?;
    runtime.run_baseline(concept, outline, scenes).await
}

pub(crate) async fn run_evaluate(
    config: AppConfig,
    script: &Path,
    outline: &Path,
    concept: Option<&Path>,
    json: bool,
) -> Result<()> {
    let scenes = split_script(&read_text(script, "script")?);
    if scenes.is_empty() {
        bail!("{} has no `# Scene N` headings", script.display());
    }
    let outline = read_text(outline, "outline")?;
    let premise = match (episode_concept(&outline), concept) {
        (Some(premise), _) => premise,
        (None, Some(path)) => read_text(path, "concept")?,
        (None, None) => bail!("the outline has no episode concept; pass --concept"),
    };

    let (runtime, printer) = runtime_with_progress(config)?;
    let scores = runtime.evaluate_episode(&premise, &outline, &scenes).await;
    finish_progress(runtime, printer).await;
    let scores = scores?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else {
        print_scores(&scores);
    }
    Ok(())
}

fn print_scores(blocks: &[BlockScores]) {
    for block in blocks {
        println!(
            "Block {} (scenes {}-{}), mean {:.1}",
            block.block,
            block.first_scene,
            block.last_scene,
            block.mean()
        );
        for score in &block.scores {
            println!("  {:<16} {:>2}  {}", score.criterion.label(), score.score, score.justification);
        }
    }
}

pub(crate) async fn run_doctor(config: &AppConfig) -> Result<()> {
    println!("sitcom doctor");
    println!("- provider: {:?}", config.llm.provider);
    println!("- model: {}", config.active_model());
    println!("- retry: {} attempts, {} ms base delay", config.retry.max_attempts, config.retry.base_delay_ms);
    println!(
        "- lookback: character={} comedic={} environment={} (scene 2: {})",
        config.agents.character_lookback,
        config.agents.comedic_lookback,
        config.agents.environment_lookback,
        config.agents.first_scene_lookback
    );
    println!(
        "- scene log: {}",
        if config.memory.export_path.trim().is_empty() { "disabled" } else { config.memory.export_path.as_str() }
    );
    println!("- output dir: {}", config.pipeline.output_dir);

    match build_client(&config.llm) {
        Ok(client) => println!("- completion client: {} ready", client.provider()),
        Err(err) => println!("- completion client: error: {err}"),
    }
    match build_embedder(config) {
        Ok(embedder) => match embedder.encode("doctor probe").await {
            Ok(vector) => println!("- embedder: ok ({} dimensions)", vector.len()),
            Err(err) => println!("- embedder: error: {err}"),
        },
        Err(err) => println!("- embedder: error: {err}"),
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sitcom_llm::{HashEmbedder, ScriptedLlm};
    use sitcom_runtime::PipelineState;

    use super::*;

    #[tokio::test]
    async fn queued_events_are_printed_before_returning() -> Result<()> {
        let llm = Arc::new(ScriptedLlm::with_responder(|_| {
            Ok("Title: \"Lock & Key\"\nDescription: Pat runs a locksmith shop.".to_string())
        }));
        let runtime = EpisodeRuntime::new(AppConfig::default(), llm, Arc::new(HashEmbedder::new(16)));
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = runtime.with_events(tx);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let printer = spawn_progress(rx, move |event| {
            assert!(matches!(event, PipelineEvent::State(PipelineState::Pitch)));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            runtime.pitch(&["locksmith".to_string()]).await?;
        }
        finish_progress(runtime, printer).await;

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        Ok(())
    }
}
