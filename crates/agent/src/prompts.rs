//! Prompt builders for the writers' room.
//!
//! Every prompt opens with a `### <Task>` line naming the step, followed by
//! the material the model should ground itself in and the exact response
//! grammar the matching reader in [`crate::parse`] expects.

use std::fmt::Write as _;

use sitcom_memory::SceneRecord;

use crate::bundle::AgentRecommendationBundle;

pub const CHARACTER_EXTRACTION: &str = "Character Extraction";
pub const CHARACTER_PROFILE: &str = "Character Profile";
pub const CHARACTER_CONSISTENCY: &str = "Character Consistency";
pub const CHARACTER_INTERACTIONS: &str = "Character Interactions";
pub const COMEDIC_CONSISTENCY: &str = "Comedic Consistency";
pub const HUMOR_ENHANCEMENTS: &str = "Humor Enhancements";
pub const ENVIRONMENT_EXTRACTION: &str = "Environment Extraction";
pub const ENVIRONMENT_TRANSITION: &str = "Environment Transition";
pub const ENVIRONMENT_DETAILS: &str = "Environment Details";
pub const SCENE_PLAN: &str = "Scene Plan";

/// `true` when `prompt` was built for `task`.
pub fn is_task(prompt: &str, task: &str) -> bool {
    prompt
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("### "))
        .is_some_and(|header| header.trim() == task)
}

fn header(task: &str, role: &str) -> String {
    format!("### {task}\nYou are the {role} on the sitcom writing team.\n\n")
}

fn scenes_phrase(num_scenes: usize) -> String {
    if num_scenes == 1 {
        "the prior scene".to_string()
    } else {
        format!("the last {num_scenes} scenes")
    }
}

/// One `Scene N:` line per record with the requested projection.
pub fn scene_digest<'a>(
    records: impl IntoIterator<Item = &'a SceneRecord>,
    project: impl Fn(&SceneRecord) -> &str,
) -> String {
    let lines: Vec<String> = records
        .into_iter()
        .map(|record| format!("Scene {}: {}", record.scene_number, project(record).trim()))
        .collect();
    if lines.is_empty() {
        return "None (no prior scenes)".to_string();
    }
    lines.join("\n")
}

fn critique(is_consistent: bool, explanation: &str) -> String {
    if is_consistent {
        String::new()
    } else {
        format!(
            "\nThe scene was flagged as inconsistent. Critique:\n{}\nYour suggestions must resolve this critique.\n",
            explanation.trim()
        )
    }
}

// ── Character ────────────────────────────────────────────────────────────────

pub fn character_extraction(description: &str, prior_characters: &[String]) -> String {
    let prior = if prior_characters.is_empty() {
        "None".to_string()
    } else {
        prior_characters.join(", ")
    };
    let mut prompt = header(CHARACTER_EXTRACTION, "Writers' Assistant");
    let _ = write!(
        prompt,
        "Previously established characters: {prior}\n\n\
         List every character who appears in the scene below. Use the exact \
         spelling of previously established characters when they appear.\n\n\
         Scene Description:\n{description}\n\n\
         Respond exactly in this format:\n\
         Characters: [comma-separated list]\n"
    );
    prompt
}

/// Profile from prior appearances (`evidence` non-empty) or, failing that,
/// strictly from the current description.
pub fn character_profile(name: &str, evidence: &[&SceneRecord], description: &str) -> String {
    let mut prompt = header(CHARACTER_PROFILE, "Script Supervisor");
    if evidence.is_empty() {
        let _ = write!(
            prompt,
            "There are no previous scenes involving {name}.\n\n\
             Current scene description:\n{description}\n\n\
             Describe {name} using only this description: personality traits, \
             speaking style, relationships with characters in this scene. \
             Do not reference other scenes. Where the description gives no \
             evidence, say so instead of inventing traits.\n"
        );
    } else {
        let scenes = scene_digest(evidence.iter().copied(), |r| r.summary.as_str());
        let _ = write!(
            prompt,
            "Build a grounded profile for {name} from these prior scenes:\n{scenes}\n\n\
             Cover personality traits, speaking style, key relationships, running \
             behaviors and emotional arc. Cite the scene number behind every \
             claim (\"In Scene 2, ...\"). Do not invent traits absent from the text.\n"
        );
    }
    prompt
}

pub fn character_consistency(description: &str, profiles: &str, num_scenes: usize) -> String {
    let mut prompt = header(CHARACTER_CONSISTENCY, "Head Writer");
    let _ = write!(
        prompt,
        "Character profiles (from {}):\n{profiles}\n\n\
         Planned Scene Description:\n{description}\n\n\
         Check whether each character behaves consistently with their \
         established personality, relationships and speaking style. Flag \
         contradictions based strictly on the profiles; point out missing \
         motivations instead of inventing them.\n\n\
         Respond exactly in this format:\n\
         Consistency Verdict (Yes/No): <Yes or No>\n\
         Explanation: <at most 5 lines>\n",
        scenes_phrase(num_scenes)
    );
    prompt
}

pub fn character_interactions(
    description: &str,
    profiles: &str,
    prior_scenes: &[u32],
    is_consistent: bool,
    explanation: &str,
) -> String {
    let cite = match prior_scenes {
        [] => "There are no prior scenes; ground each suggestion in the current scene only.".to_string(),
        scenes => format!(
            "Cite at least one of these prior scenes in every suggestion: {}.",
            scenes
                .iter()
                .map(|n| format!("Scene {n}"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut prompt = header(CHARACTER_INTERACTIONS, "Co-Executive Producer");
    let _ = write!(
        prompt,
        "Character profiles:\n{profiles}\n\n\
         Planned Scene Description:\n{description}\n{}\n\
         Suggest exactly two character interactions for this scene, each in \
         two or three sentences with a short justification. {cite}\n\n\
         Format:\n\
         Interaction Recommendations:\n\
         1. <suggestion> (justification)\n\
         2. <suggestion> (justification)\n",
        critique(is_consistent, explanation)
    );
    prompt
}

// ── Comedic ──────────────────────────────────────────────────────────────────

pub fn comedic_consistency(window: &[SceneRecord], description: &str) -> String {
    let summaries = scene_digest(window, |r| r.summary.as_str());
    let jokes = scene_digest(window, |r| r.recurring_joke.as_str());
    let tones = scene_digest(window, |r| r.emotional_tone.as_str());
    let mut prompt = header(COMEDIC_CONSISTENCY, "Comedy Continuity Editor");
    let _ = write!(
        prompt,
        "Prior scene summaries:\n{summaries}\n\n\
         Prior recurring jokes:\n{jokes}\n\n\
         Prior emotional tones:\n{tones}\n\n\
         Planned Scene Description:\n{description}\n\n\
         Judge two things separately:\n\
         1. Tone consistency: does the comedic tone follow from the prior scenes?\n\
         2. Joke overuse: is any recurring joke repeated across the prior scenes \
         without tonal variation and reused again here?\n\n\
         Respond exactly in this format:\n\
         Tone Consistent (Yes/No): <Yes or No>\n\
         Detected Tone: <short tag>\n\
         Explanation: <at most 5 lines>\n\
         Overuse Check: <overused joke names, comma-separated, or None>\n"
    );
    prompt
}

pub fn humor_enhancements(
    window: &[SceneRecord],
    description: &str,
    is_consistent: bool,
    explanation: &str,
    overused: &[String],
) -> String {
    let jokes = scene_digest(window, |r| r.recurring_joke.as_str());
    let avoid = if overused.is_empty() {
        String::new()
    } else {
        format!("Do not reuse these overused jokes as-is: {}.\n", overused.join(", "))
    };
    let mut prompt = header(HUMOR_ENHANCEMENTS, "Punch-Up Writer");
    let _ = write!(
        prompt,
        "Prior recurring jokes:\n{jokes}\n\n\
         Planned Scene Description:\n{description}\n{}{avoid}\n\
         Suggest two to four humor enhancements grounded in the prior scenes.\n\n\
         Format:\n\
         Suggestions:\n\
         - <enhancement>\n\
         - <enhancement>\n",
        critique(is_consistent, explanation)
    );
    prompt
}

// ── Environment ──────────────────────────────────────────────────────────────

pub fn environment_extraction(description: &str) -> String {
    let mut prompt = header(ENVIRONMENT_EXTRACTION, "Writers' Assistant");
    let _ = write!(
        prompt,
        "Identify the primary location of the scene below and its salient \
         props or features.\n\n\
         Scene Description:\n{description}\n\n\
         Respond exactly in this format:\n\
         Environment: <concise location name>\n\
         Key Details: <comma-separated list of props or features>\n"
    );
    prompt
}

pub fn environment_transition(
    window: &[SceneRecord],
    location: &str,
    description: &str,
) -> String {
    let locations = scene_digest(window, |r| r.location.as_str());
    let mut prompt = header(ENVIRONMENT_TRANSITION, "Continuity Supervisor");
    let _ = write!(
        prompt,
        "Prior locations:\n{locations}\n\n\
         New location: {location}\n\n\
         Planned Scene Description:\n{description}\n\n\
         Is the move from the most recent location to the new one narratively \
         motivated? A change of location with no explanatory beat is not a \
         logical transition.\n\n\
         Respond exactly in this format:\n\
         Logical Transition (Yes/No): <Yes or No>\n\
         Explanation: <at most 5 lines>\n\
         Suggested Transition Setup: <one linking beat, or None>\n"
    );
    prompt
}

pub fn environment_details(
    location: &str,
    key_details: &[String],
    description: &str,
    is_consistent: bool,
) -> String {
    let framing = if is_consistent {
        "The transition is smooth, so the details should reinforce continuity and tone."
    } else {
        "The transition is jarring, so choose details that ease the audience into the new setting."
    };
    let details = if key_details.is_empty() {
        "None".to_string()
    } else {
        key_details.join(", ")
    };
    let mut prompt = header(ENVIRONMENT_DETAILS, "Production Designer");
    let _ = write!(
        prompt,
        "Location: {location}\nKey Details: {details}\n\n\
         Planned Scene Description:\n{description}\n\n\
         {framing}\n\
         Suggest exactly two sensory or environmental details.\n\n\
         Format:\n\
         Environment Details Suggestions:\n\
         - <detail>\n\
         - <detail>\n"
    );
    prompt
}

// ── Planner ──────────────────────────────────────────────────────────────────

pub fn scene_plan(
    scene_number: u32,
    description: &str,
    character: &AgentRecommendationBundle,
    comedic: &AgentRecommendationBundle,
    environment: &AgentRecommendationBundle,
    related: &str,
) -> String {
    let mut prompt = header(SCENE_PLAN, "Showrunner");
    let _ = writeln!(prompt, "Scene {scene_number} description:\n{description}\n");
    if !related.trim().is_empty() {
        let _ = writeln!(prompt, "Related earlier scenes:\n{related}\n");
    }
    for bundle in [character, comedic, environment] {
        let _ = writeln!(
            prompt,
            "{} (consistent: {}):\n{}\n",
            bundle.agent,
            if bundle.is_consistent { "yes" } else { "no" },
            bundle.recommendations
        );
    }
    prompt.push_str(
        "Synthesize these notes into one plan. Rephrase every idea in your own \
         words; never copy a recommendation line verbatim.\n\n\
         Respond exactly in this format:\n\
         Scene Plan:\n\
         Character Goals:\n\
         - <goal>\n\
         - <goal>\n\
         Comedic Goal: <one goal>\n\
         Environment Detail: <one detail>\n\
         Creative Suggestion: <one idea that moves the story forward>\n",
    );
    prompt
}
