//! Scoring of finished scripts and explanations of how related earlier
//! scenes shaped a scene.
//!
//! A block evaluation asks the model to grade consecutive scenes on five
//! criteria, each `1..=10` with a one-line justification:
//!
//! ```text
//! - Coherence: 8 – the block flows from the previous scenes
//! - Relevance: 7 – ...
//! ```

use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sitcom_agent::text::OutlineScene;
use sitcom_agent::{AgentLlm, AgentResult, AgentRole, CallSite, ParseError};

use crate::runtime::RelatedScene;

pub const SCENE_BLOCK_EVALUATION: &str = "Scene Block Evaluation";
pub const RELATED_SCENE_EXPLANATION: &str = "Related Scene Explanation";

pub const NO_RELATED_SCENES: &str = "No related scenes were used for this scene.";

/// Characters of each related summary quoted in the explanation prompt.
const SUMMARY_PREVIEW_CHARS: usize = 100;

static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s*•-]*\**\s*(coherence|relevance|interestingness|humou?r|overall quality)\s*\**\s*:\s*\**\s*(\d+)(?:\s*/\s*10)?\s*\**\s*(?:[–—:-]+\s*)?(.*)$",
    )
    .expect("score line regex")
});

static SCRIPT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^# Scene (\d+)\b").expect("script heading regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Coherence,
    Relevance,
    Interestingness,
    Humor,
    OverallQuality,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Coherence,
        Criterion::Relevance,
        Criterion::Interestingness,
        Criterion::Humor,
        Criterion::OverallQuality,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Coherence => "Coherence",
            Self::Relevance => "Relevance",
            Self::Interestingness => "Interestingness",
            Self::Humor => "Humor",
            Self::OverallQuality => "Overall Quality",
        }
    }

    fn question(self) -> &'static str {
        match self {
            Self::Coherence => "Does the scene block flow logically and stay internally consistent?",
            Self::Relevance => "Do the scenes support the episode concept, character arcs and prior developments?",
            Self::Interestingness => "Are the scenes original, engaging and narratively dynamic?",
            Self::Humor => "Is the comedy well timed, character driven and varied?",
            Self::OverallQuality => "Holistic rating of structure, tone, genre fit and polish.",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "coherence" => Some(Self::Coherence),
            "relevance" => Some(Self::Relevance),
            "interestingness" => Some(Self::Interestingness),
            "humor" | "humour" => Some(Self::Humor),
            "overall quality" => Some(Self::OverallQuality),
            _ => None,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub score: u8,
    pub justification: String,
}

/// Scores of one block of consecutive scenes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockScores {
    /// 1-based block index.
    pub block: usize,
    pub first_scene: u32,
    pub last_scene: u32,
    /// One entry per criterion, in [`Criterion::ALL`] order.
    pub scores: Vec<CriterionScore>,
}

impl BlockScores {
    pub fn score(&self, criterion: Criterion) -> Option<u8> {
        self.scores
            .iter()
            .find(|s| s.criterion == criterion)
            .map(|s| s.score)
    }

    pub fn mean(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let total: u32 = self.scores.iter().map(|s| u32::from(s.score)).sum();
        total as f32 / self.scores.len() as f32
    }
}

/// One scene of an assembled script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptScene {
    pub scene_number: u32,
    pub script: String,
}

/// Split an assembled script on its `# Scene N` headings.
pub fn split_script(script: &str) -> Vec<ScriptScene> {
    let headings: Vec<(u32, usize)> = SCRIPT_HEADING
        .captures_iter(script)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some((number, start))
        })
        .collect();
    headings
        .iter()
        .enumerate()
        .map(|(i, &(scene_number, start))| {
            let end = headings.get(i + 1).map_or(script.len(), |&(_, next)| next);
            ScriptScene {
                scene_number,
                script: script[start..end].trim().to_string(),
            }
        })
        .collect()
}

/// Read the five criterion lines. The first line per criterion wins; every
/// criterion is required.
pub fn parse_block_scores(reply: &str) -> Result<Vec<CriterionScore>, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let mut found: Vec<CriterionScore> = Vec::new();
    for caps in reply.lines().filter_map(|line| SCORE_LINE.captures(line.trim())) {
        let Some(criterion) = caps.get(1).and_then(|m| Criterion::from_label(m.as_str())) else {
            continue;
        };
        if found.iter().any(|s| s.criterion == criterion) {
            continue;
        }
        let raw: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_default();
        let score = u8::try_from(raw)
            .ok()
            .filter(|score| (1..=10).contains(score))
            .ok_or_else(|| ParseError::ScoreOutOfRange {
                criterion: criterion.label().to_string(),
                score: raw,
            })?;
        found.push(CriterionScore {
            criterion,
            score,
            justification: caps
                .get(3)
                .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
                .unwrap_or_default(),
        });
    }

    Criterion::ALL
        .iter()
        .map(|criterion| {
            found
                .iter()
                .find(|s| s.criterion == *criterion)
                .cloned()
                .ok_or_else(|| ParseError::MissingSection {
                    section: criterion.label().to_string(),
                })
        })
        .collect()
}

/// Grade one block of scenes. `previous` are the outline entries of the
/// block before, given as context.
pub async fn evaluate_block(
    llm: &AgentLlm,
    concept: &str,
    block: usize,
    scenes: &[ScriptScene],
    previous: &[OutlineScene],
) -> AgentResult<BlockScores> {
    let first_scene = scenes.first().map_or(0, |s| s.scene_number);
    let last_scene = scenes.last().map_or(0, |s| s.scene_number);

    let mut prompt = format!(
        "### {SCENE_BLOCK_EVALUATION}\nYou are a sitcom development executive at a streaming \
         platform reviewing the pilot of a new sitcom.\n\nEpisode concept:\n\"{}\"\n\n",
        concept.trim()
    );
    if !previous.is_empty() {
        prompt.push_str("Summary of the previous scenes, for context:\n");
        for scene in previous {
            let _ = writeln!(prompt, "Scene {}: {}", scene.number, scene.description.trim());
        }
        prompt.push('\n');
    }
    let _ = write!(
        prompt,
        "Below is a block of {} sitcom scene(s). Score the block from 1 to 10 on each \
         criterion and give a short justification.\n\n",
        scenes.len()
    );
    for (i, criterion) in Criterion::ALL.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {} - {}", i + 1, criterion.label(), criterion.question());
    }
    prompt.push_str("\n---\n\nScenes:\n");
    for scene in scenes {
        let _ = write!(prompt, "{}\n\n", scene.script.trim());
    }
    prompt.push_str("---\n\nRespond exactly like this:\n\n");
    for criterion in Criterion::ALL {
        let _ = writeln!(prompt, "- {}: <score> – <justification>", criterion.label());
    }

    let scores = llm
        .ask(
            CallSite::new(AgentRole::Critic, first_scene, "block evaluation"),
            &prompt,
            llm.sampling().evaluation.into(),
            parse_block_scores,
        )
        .await?;
    Ok(BlockScores {
        block,
        first_scene,
        last_scene,
        scores,
    })
}

/// Explain how the related earlier scenes influenced `script`.
pub async fn explain_related(
    llm: &AgentLlm,
    title: &str,
    scene_number: u32,
    script: &str,
    related: &[RelatedScene],
) -> AgentResult<String> {
    if related.is_empty() {
        return Ok(NO_RELATED_SCENES.to_string());
    }

    let mut prompt = format!(
        "### {RELATED_SCENE_EXPLANATION}\nYou are a sitcom script evaluator.\n\n\
         The following is Scene {scene_number} of a sitcom titled \"{title}\". It was \
         written with earlier scenes retrieved by semantic similarity.\n\n\
         Selected earlier scenes:\n"
    );
    for scene in related {
        let _ = writeln!(
            prompt,
            "- Scene {} (similarity {:.2}): {}",
            scene.scene_number,
            scene.similarity,
            preview(&scene.summary)
        );
    }
    prompt.push_str(
        "\nYour task:\n\
         1. Explain why each earlier scene may have been selected, from its summary and similarity.\n\
         2. Describe how each one appears to have influenced the current scene.\n\
         3. Point out callbacks, continued character arcs, and preserved tone or style.\n\n\
         Earlier scene summaries:\n",
    );
    for scene in related {
        let _ = writeln!(prompt, "Scene {}: {}", scene.scene_number, scene.summary.trim());
    }
    let _ = write!(prompt, "\nScene {scene_number}:\n{}\n", script.trim());

    llm.ask(
        CallSite::new(AgentRole::Critic, scene_number, "related scene explanation"),
        &prompt,
        llm.sampling().explanation.into(),
        |reply| {
            let reply = reply.trim();
            if reply.is_empty() {
                Err(ParseError::Empty)
            } else {
                Ok(reply.to_string())
            }
        },
    )
    .await
}

fn preview(summary: &str) -> String {
    let summary = summary.trim();
    if summary.chars().count() <= SUMMARY_PREVIEW_CHARS {
        return summary.to_string();
    }
    let cut: String = summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}
