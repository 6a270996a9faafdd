//! Single-call writing steps around the writers' room: pitch, outline,
//! outline review, scene scripts and the scene summarizer.
//!
//! Episode-level steps (pitch, outline, review) report scene 0 in errors.

use std::fmt::Write as _;

use serde::Serialize;
use sitcom_agent::parse::{self, parse_verdict};
use sitcom_agent::text::{extract_scene, extract_title, outline_scene_count};
use sitcom_agent::{AgentLlm, AgentResult, AgentRole, CallSite, ParseError, ScenePlan};
use sitcom_memory::{NEUTRAL_TONE, NO_RECURRING_JOKE, SceneMetadata, UNKNOWN_LOCATION};

pub const SITCOM_PITCH: &str = "Sitcom Pitch";
pub const PILOT_OUTLINE: &str = "Pilot Outline";
pub const OUTLINE_REVIEW: &str = "Outline Review";
pub const SCENE_SCRIPT: &str = "Scene Script";
pub const SCENE_SUMMARY: &str = "Scene Summary";
pub const BASELINE_SCENE: &str = "Baseline Scene";

/// Earlier scripts shown to the baseline writer.
pub const BASELINE_CONTEXT_SCENES: usize = 3;

/// Runtime of one scene slot, used for the script headings.
const SCENE_SECONDS: u32 = 150;

const SUMMARY_HEADERS: [&str; 5] = [
    "Summary:",
    "Characters:",
    "Location:",
    "Recurring Joke:",
    "Emotional Tone:",
];

/// A generated sitcom concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concept {
    pub title: String,
    pub text: String,
}

impl Concept {
    /// Concept from existing pitch text; the title falls back to `Untitled`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let title = extract_title(&text).unwrap_or_else(|| "Untitled".to_string());
        Self { title, text }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineReview {
    pub coherent: bool,
    pub text: String,
}

pub async fn pitch(llm: &AgentLlm, keywords: &[String]) -> AgentResult<Concept> {
    let mut prompt = task(SITCOM_PITCH, "creative comedy screenwriter");
    prompt.push_str(
        "Generate an original sitcom concept in one paragraph. Be specific about \
         the premise, the main characters and their dynamics, and the tone.\n",
    );
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        let _ = writeln!(
            prompt,
            "Incorporate these themes, ideas or settings if relevant: {}",
            keywords.join(", ")
        );
    }
    prompt.push_str("\nAlways follow this structure:\nTitle: <title of the sitcom>\nDescription: <one paragraph>\n");

    llm.ask(
        CallSite::new(AgentRole::Showrunner, 0, "concept pitch"),
        &prompt,
        llm.sampling().pitch.into(),
        |reply| {
            let title = extract_title(reply).ok_or_else(|| ParseError::MissingSection {
                section: "Title".to_string(),
            })?;
            Ok(Concept {
                title,
                text: reply.trim().to_string(),
            })
        },
    )
    .await
}

pub async fn outline(llm: &AgentLlm, concept: &str, scenes: u32) -> AgentResult<String> {
    let mut prompt = task(PILOT_OUTLINE, "professional sitcom writer");
    let _ = write!(
        prompt,
        "Here is the pitch for a new sitcom:\n{concept}\n\n\
         Write an outline for the pilot episode. Start with a one or two sentence \
         Episode Concept, then break the episode into approximately {scenes} scenes.\n\n\
         For each scene use exactly this format:\n\
         Scene <number>: \"<Scene Title>\" <one or two sentence description>\n\n\
         Each description says what happens, who is involved and the tone.\n"
    );

    llm.ask(
        CallSite::new(AgentRole::Showrunner, 0, "pilot outline"),
        &prompt,
        llm.sampling().outline.into(),
        |reply| {
            if outline_scene_count(reply) == 0 || extract_scene(reply, 1).is_none() {
                return Err(ParseError::SceneNotFound { scene_number: 1 });
            }
            Ok(reply.trim().to_string())
        },
    )
    .await
}

pub async fn review_outline(llm: &AgentLlm, concept: &str, outline: &str) -> AgentResult<OutlineReview> {
    let mut prompt = task(OUTLINE_REVIEW, "veteran sitcom script editor");
    let _ = write!(
        prompt,
        "Decide whether the outline below is coherent: it fits the premise, keeps \
         a consistent tone, and has logical character and plot progression.\n\n\
         Return your answer in this format:\n\
         Coherence: <Yes or No>\n\
         Reasoning:\n\
         - <two to four bullet points; suggest fixes when the answer is No>\n\n\
         Sitcom Pitch:\n{concept}\n\nEpisode Outline:\n{outline}\n"
    );

    llm.ask(
        CallSite::new(AgentRole::Showrunner, 0, "outline review"),
        &prompt,
        llm.sampling().validation.into(),
        parse_review,
    )
    .await
}

fn parse_review(reply: &str) -> Result<OutlineReview, ParseError> {
    let line = reply
        .lines()
        .find(|line| parse::strip_key(line, "Coherence:").is_some())
        .ok_or_else(|| ParseError::MissingSection {
            section: "Coherence".to_string(),
        })?;
    Ok(OutlineReview {
        coherent: parse_verdict(line)?.consistent,
        text: reply.trim().to_string(),
    })
}

/// `# Scene N [m:ss-m:ss]`, assuming fixed-length scene slots.
pub fn scene_heading(scene_number: u32) -> String {
    let start = scene_number.saturating_sub(1) * SCENE_SECONDS;
    let end = start + SCENE_SECONDS;
    format!(
        "# Scene {scene_number} [{}:{:02}-{}:{:02}]",
        start / 60,
        start % 60,
        end / 60,
        end % 60
    )
}

fn script_reply(scene_number: u32) -> impl Fn(&str) -> Result<String, ParseError> {
    move |reply: &str| {
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(format!("{}\n{reply}", scene_heading(scene_number)))
    }
}

const SCRIPT_FORMAT: &str = "Format:\n\
    - Scene heading (e.g. INT. LOCKSMITH SHOP - DAY)\n\
    - Character names in ALL CAPS\n\
    - Stage directions in parentheses\n\
    - [LAUGH TRACK] only where the rhythm earns it, sparingly\n\
    Write 50 to 70 lines, one scene only, and end cleanly.\n";

pub async fn scene_one_script(llm: &AgentLlm, title: &str, description: &str) -> AgentResult<String> {
    let mut prompt = task(SCENE_SCRIPT, "professional sitcom scriptwriter");
    let _ = write!(
        prompt,
        "Sitcom Title: {title}\nScene 1 Description: {description}\n\n\
         Write this scene as a formatted sitcom script.\n\n{SCRIPT_FORMAT}"
    );

    llm.ask(
        CallSite::new(AgentRole::ScriptWriter, 1, "scene script"),
        &prompt,
        llm.creative(),
        script_reply(1),
    )
    .await
}

pub async fn scene_script(
    llm: &AgentLlm,
    title: &str,
    description: &str,
    plan: &ScenePlan,
    related: &str,
) -> AgentResult<String> {
    let scene_number = plan.scene_number;
    let mut prompt = task(SCENE_SCRIPT, "sitcom scene writer");
    let _ = write!(
        prompt,
        "Sitcom Title: {title}\nScene {scene_number} Outline: {description}\n\n{}\n\n",
        plan.render()
    );
    if !related.trim().is_empty() {
        let _ = write!(prompt, "Relevant background from earlier scenes:\n{related}\n\n");
    }
    let _ = write!(
        prompt,
        "Write the scene. Hit both Character Goals and the Comedic Goal, use the \
         Environment Detail, and work the Creative Suggestion in naturally.\n\n{SCRIPT_FORMAT}"
    );

    llm.ask(
        CallSite::new(AgentRole::ScriptWriter, scene_number, "scene script"),
        &prompt,
        llm.creative(),
        script_reply(scene_number),
    )
    .await
}

/// Scene N written from the outline and the latest scripts alone, with no
/// continuity notes or plan.
pub async fn baseline_scene_script(
    llm: &AgentLlm,
    title: &str,
    outline: &str,
    scene_number: u32,
    previous: &[&str],
) -> AgentResult<String> {
    let mut prompt = task(BASELINE_SCENE, "professional sitcom writer");
    let _ = write!(prompt, "Sitcom Title: {title}\n\nPilot outline:\n{}\n\n", outline.trim());
    if !previous.is_empty() {
        let _ = write!(prompt, "Previous scenes:\n{}\n\n", previous.join("\n\n"));
    }
    let _ = write!(
        prompt,
        "Write Scene {scene_number} of the outline as a formatted sitcom script.\n\n{SCRIPT_FORMAT}"
    );

    llm.ask(
        CallSite::new(AgentRole::ScriptWriter, scene_number, "baseline scene script"),
        &prompt,
        llm.creative(),
        script_reply(scene_number),
    )
    .await
}

pub async fn summarize(
    llm: &AgentLlm,
    title: &str,
    scene_number: u32,
    script: &str,
) -> AgentResult<SceneMetadata> {
    let mut prompt = task(SCENE_SUMMARY, &format!("head writer of a sitcom called \"{title}\""));
    let _ = write!(
        prompt,
        "From the scene script below extract:\n\
         1. A 100 to 150 word summary of the key beats, relationships and setups\n\
         2. The names of every character who appears or speaks\n\
         3. The main location, if clearly stated\n\
         4. Any recurring joke or callback\n\
         5. The emotional tone in one or two words\n\n\
         Format your output as:\n\
         Summary:\n<summary>\n\n\
         Characters:\n- <name>\n- <name>\n\n\
         Location:\n<location or Unknown>\n\n\
         Recurring Joke:\n<description or None>\n\n\
         Emotional Tone:\n<tone>\n\n\
         Scene:\n{script}\n"
    );

    llm.ask(
        CallSite::new(AgentRole::Summarizer, scene_number, "scene summary"),
        &prompt,
        llm.sampling().summary.into(),
        parse_summary,
    )
    .await
}

/// Read the summarizer's labeled sections. Only `Summary` is mandatory.
pub fn parse_summary(reply: &str) -> Result<SceneMetadata, ParseError> {
    let section = |header: &str| parse::section_items(reply, header, &SUMMARY_HEADERS);
    let first = |header: &str, default: &str| {
        section(header)
            .and_then(|items| items.into_iter().next())
            .unwrap_or_else(|| default.to_string())
    };

    let summary = section("Summary:")
        .map(|lines| lines.join(" "))
        .filter(|summary| !summary.trim().is_empty())
        .ok_or_else(|| ParseError::MissingSection {
            section: "Summary".to_string(),
        })?;

    let mut characters: Vec<String> = Vec::new();
    for item in section("Characters:").unwrap_or_default() {
        for name in parse::parse_name_list(&item) {
            if !characters.contains(&name) {
                characters.push(name);
            }
        }
    }

    Ok(SceneMetadata {
        summary,
        characters,
        location: first("Location:", UNKNOWN_LOCATION),
        recurring_joke: first("Recurring Joke:", NO_RECURRING_JOKE),
        emotional_tone: first("Emotional Tone:", NEUTRAL_TONE),
    })
}

fn task(name: &str, role: &str) -> String {
    format!("### {name}\nYou are a {role}.\n\n")
}
