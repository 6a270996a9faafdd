//! Environment continuity: where the scene happens, and whether the story
//! earned the trip there.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sitcom_config::AgentsConfig;
use sitcom_memory::{SceneMemory, SceneRecord, is_none};
use tracing::{info, instrument};

use crate::bundle::{AgentRecommendationBundle, SceneRange};
use crate::context::{EvaluationContext, lookback_for};
use crate::error::{AgentResult, ParseError};
use crate::llm::{AgentLlm, CallSite};
use crate::parse;
use crate::prompts;
use crate::role::AgentRole;

pub const DETAIL_COUNT: usize = 2;

const TRANSITION_HEADERS: [&str; 2] = ["Explanation:", "Suggested Transition Setup:"];
const DETAILS_HEADER: &str = "Environment Details Suggestions:";

/// Words that mark a move between locations as motivated.
static TRANSITION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:arriv(?:e|es|ed|ing|al)|travel(?:s|ed|led|ing|ling)?|heads?\s+(?:to|for|over|out|off|back|home|down|up)|headed|heading|drives?|drove|driving|fl(?:y|ies|ew|ying|ight)|launch(?:es|ed|ing)?|return(?:s|ed|ing)?|enters?|entered|entering|walks?|walked|walking|moves?|moved|moving|meanwhile|later|flashback|teleport(?:s|ed|ing)?|transport(?:s|ed|ing)?|rockets?|commut(?:e|es|ed|ing)|escap(?:e|es|ed|ing)|visit(?:s|ed|ing)?|relocat(?:e|es|ed|ing)|back\s+(?:at|to|in|home))\b",
    )
    .expect("transition cue regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneEnvironment {
    pub location: String,
    pub key_details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TransitionReview {
    verdict: parse::Verdict,
    explanation: String,
    setup: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentReport {
    pub scene_number: u32,
    pub consulted: SceneRange,
    /// Known locations of the window, oldest first.
    pub prior_locations: Vec<String>,
    pub environment: SceneEnvironment,
    pub location_changed: bool,
    pub has_transition_cue: bool,
    pub is_consistent: bool,
    pub verdict_line: String,
    pub explanation: String,
    /// Always present when the transition is inconsistent.
    pub linking_setup: Option<String>,
    pub recommendations: Vec<String>,
    pub internal_thoughts: Vec<String>,
}

impl EnvironmentReport {
    pub fn bundle(&self) -> AgentRecommendationBundle {
        let explanation = match &self.linking_setup {
            Some(setup) => format!("{}\nSuggested transition: {setup}", self.explanation),
            None => self.explanation.clone(),
        };
        AgentRecommendationBundle::new(
            AgentRole::Environment,
            self.is_consistent,
            explanation.trim().to_string(),
            &self.recommendations,
        )
    }
}

#[derive(Clone)]
pub struct EnvironmentAgent {
    llm: AgentLlm,
    lookback: usize,
    first_scene_lookback: usize,
}

impl EnvironmentAgent {
    pub fn new(llm: AgentLlm, config: &AgentsConfig) -> Self {
        Self {
            llm,
            lookback: config.environment_lookback.max(1),
            first_scene_lookback: config.first_scene_lookback.max(1),
        }
    }

    pub async fn evaluate(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
    ) -> AgentResult<EnvironmentReport> {
        let num_scenes = lookback_for(scene_number, self.lookback, self.first_scene_lookback);
        self.evaluate_with(memory, scene_number, description, num_scenes).await
    }

    #[instrument(skip(self, memory, description), fields(agent = "environment"))]
    pub async fn evaluate_with(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
        num_scenes: usize,
    ) -> AgentResult<EnvironmentReport> {
        let role = AgentRole::Environment;
        let ctx = EvaluationContext::new(role, memory, scene_number, description, num_scenes)?;
        let site = |step| CallSite::new(role, scene_number, step);
        let mut thoughts = vec![format!(
            "Think: scene {scene_number}, consulting {}",
            ctx.range.describe()
        )];

        let environment = self
            .llm
            .ask(
                site("environment extraction"),
                &prompts::environment_extraction(ctx.description),
                self.llm.analysis(),
                parse_environment,
            )
            .await?;
        let prior_locations: Vec<String> = ctx
            .window
            .iter()
            .filter(|r| r.has_known_location())
            .map(|r| r.location.clone())
            .collect();
        let previous = previous_location(ctx.window);
        let location_changed =
            previous.is_some_and(|prev| !same_location(prev, &environment.location));
        let has_transition_cue = has_transition_cue(ctx.description);
        thoughts.push(format!(
            "Act: location {} (previously {}), details [{}]",
            environment.location,
            previous.unwrap_or("none"),
            environment.key_details.join(", ")
        ));

        let review = self
            .llm
            .ask(
                site("transition check"),
                &prompts::environment_transition(ctx.window, &environment.location, ctx.description),
                self.llm.analysis(),
                parse_transition,
            )
            .await?;
        let unmotivated = location_changed && !has_transition_cue;
        let is_consistent = review.verdict.consistent && !unmotivated;
        let linking_setup = if is_consistent {
            review.setup
        } else {
            Some(review.setup.unwrap_or_else(|| {
                fallback_setup(previous.unwrap_or("the previous scene"), &environment.location)
            }))
        };
        thoughts.push(format!(
            "Observe: {}{}",
            review.verdict.line,
            if unmotivated { "; location changes with no transition cue" } else { "" }
        ));

        let recommendations = self
            .llm
            .ask(
                site("environment details"),
                &prompts::environment_details(
                    &environment.location,
                    &environment.key_details,
                    ctx.description,
                    is_consistent,
                ),
                self.llm.creative(),
                parse_details,
            )
            .await?;
        thoughts.push(format!(
            "Recommend: {} detail(s) to {}",
            recommendations.len(),
            if is_consistent { "reinforce continuity" } else { "ease the discontinuity" }
        ));

        info!(
            scene = scene_number,
            consistent = is_consistent,
            location = %environment.location,
            location_changed,
            "environment evaluation complete"
        );

        Ok(EnvironmentReport {
            scene_number,
            consulted: ctx.range,
            prior_locations,
            environment,
            location_changed,
            has_transition_cue,
            is_consistent,
            verdict_line: review.verdict.line,
            explanation: review.explanation,
            linking_setup,
            recommendations,
            internal_thoughts: thoughts,
        })
    }
}

fn parse_environment(reply: &str) -> Result<SceneEnvironment, ParseError> {
    Ok(SceneEnvironment {
        location: parse::require_value(reply, "Environment:")?,
        key_details: parse::labeled_value(reply, "Key Details:")
            .map(|value| parse::parse_name_list(&value))
            .unwrap_or_default(),
    })
}

fn parse_transition(reply: &str) -> Result<TransitionReview, ParseError> {
    let verdict = parse::parse_verdict(reply)?;
    Ok(TransitionReview {
        verdict,
        explanation: parse::explanation(reply, &TRANSITION_HEADERS),
        setup: parse::section_items(reply, "Suggested Transition Setup:", &TRANSITION_HEADERS)
            .map(|items| items.join(" "))
            .filter(|setup| !setup.is_empty() && !is_none(setup)),
    })
}

fn parse_details(reply: &str) -> Result<Vec<String>, ParseError> {
    let items = parse::section_items(reply, DETAILS_HEADER, &[DETAILS_HEADER])
        .filter(|items| items.len() >= DETAIL_COUNT)
        .unwrap_or_else(|| parse::list_items(reply));
    if items.len() < DETAIL_COUNT {
        return Err(ParseError::TooFewItems {
            section: "Environment Details Suggestions".to_string(),
            expected: DETAIL_COUNT,
            found: items.len(),
        });
    }
    Ok(items.into_iter().take(DETAIL_COUNT).collect())
}

fn previous_location(window: &[SceneRecord]) -> Option<&str> {
    window
        .iter()
        .rev()
        .find(|r| r.has_known_location())
        .map(|r| r.location.as_str())
}

fn location_words(location: &str) -> BTreeSet<String> {
    location
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && *w != "the")
        .map(str::to_string)
        .collect()
}

/// Case-insensitive word match that also accepts one name whose words are
/// all part of the other ("Shop" vs "Pat's Locksmith Shop").
pub fn same_location(a: &str, b: &str) -> bool {
    let (a, b) = (location_words(a), location_words(b));
    !a.is_empty() && !b.is_empty() && (a.is_subset(&b) || b.is_subset(&a))
}

pub fn has_transition_cue(description: &str) -> bool {
    TRANSITION_CUE.is_match(description)
}

fn fallback_setup(previous: &str, current: &str) -> String {
    format!(
        "Open with a short beat that takes the characters from the {previous} to the {current}, \
         such as a phone call or an on-screen arrival that explains the move."
    )
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use sitcom_llm::LlmError;

    use super::*;
    use crate::prompts::is_task;
    use crate::testing::{memory_with, record, scripted};

    fn reply_for(prompt: &str, location: &str, transition: &str) -> Result<String, LlmError> {
        if is_task(prompt, prompts::ENVIRONMENT_EXTRACTION) {
            Ok(format!("Environment: {location}\nKey Details: oxygen tanks, viewport, humming vents"))
        } else if is_task(prompt, prompts::ENVIRONMENT_TRANSITION) {
            Ok(transition.to_string())
        } else if is_task(prompt, prompts::ENVIRONMENT_DETAILS) {
            Ok(format!("{DETAILS_HEADER}\n- The hiss of an airlock cycling\n- Moon dust on Pat's boots"))
        } else {
            Err(LlmError::EmptyResponse { provider: "test".into() })
        }
    }

    #[tokio::test]
    async fn unexplained_jump_to_moon_base_is_inconsistent() -> Result<()> {
        let memory = memory_with(vec![
            record(1, &["Pat"], "Locksmith Shop", "None", "warm"),
            record(2, &["Pat", "Lou"], "Locksmith Shop", "None", "warm"),
        ]);
        // Even a lenient model verdict is overruled by the missing cue.
        let (_llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "Moon Base",
                "Logical Transition (Yes/No): Yes\nExplanation: Sitcoms jump around.\nSuggested Transition Setup: None",
            )
        });
        let agent = EnvironmentAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent
            .evaluate(&memory, 3, "Pat and Lou bicker over oxygen rations at the Moon Base.")
            .await?;

        assert_eq!(report.environment.location, "Moon Base");
        assert_eq!(report.environment.key_details.len(), 3);
        assert!(report.location_changed);
        assert!(!report.has_transition_cue);
        assert!(!report.is_consistent);
        let setup = report.linking_setup.as_deref().unwrap_or_default();
        assert!(!setup.is_empty());
        assert!(setup.contains("Locksmith Shop"));
        assert_eq!(report.recommendations.len(), DETAIL_COUNT);
        assert!(report.bundle().explanation.contains("Suggested transition:"));
        Ok(())
    }

    #[tokio::test]
    async fn model_setup_is_kept_when_it_flags_the_jump() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat"], "Locksmith Shop", "None", "warm")]);
        let (_llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "Moon Base",
                "Logical Transition (Yes/No): No\nExplanation: Nothing explains the trip.\nSuggested Transition Setup: Pat wins a lunar raffle.",
            )
        });
        let agent = EnvironmentAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent.evaluate(&memory, 2, "Pat floats at the Moon Base.").await?;

        assert!(!report.is_consistent);
        assert_eq!(report.linking_setup.as_deref(), Some("Pat wins a lunar raffle."));
        assert_eq!(report.explanation, "Nothing explains the trip.");
        Ok(())
    }

    #[tokio::test]
    async fn staying_put_is_consistent() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat"], "Locksmith Shop", "None", "warm")]);
        let (_llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "The Locksmith Shop",
                "Logical Transition (Yes/No): Yes\nExplanation: Same shop.",
            )
        });
        let agent = EnvironmentAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent.evaluate(&memory, 2, "Pat sweeps the shop floor.").await?;

        assert!(!report.location_changed);
        assert!(report.is_consistent);
        assert_eq!(report.linking_setup, None);
        assert_eq!(report.prior_locations, vec!["Locksmith Shop"]);
        Ok(())
    }

    #[test]
    fn location_matching_and_cues() {
        assert!(same_location("Locksmith Shop", "the locksmith shop"));
        assert!(same_location("Shop", "Pat's Locksmith Shop"));
        assert!(!same_location("Locksmith Shop", "Moon Base"));
        assert!(has_transition_cue("Pat arrives at the Moon Base by rocket."));
        assert!(!has_transition_cue("Pat and Lou bicker at the Moon Base."));
        assert!(has_transition_cue("Later that night, Lou heads to the diner."));
        assert!(has_transition_cue("Pat is back at the shop."));
    }

    #[test]
    fn partial_words_are_not_matches() {
        assert!(!same_location("Bar", "Barbershop"));
        assert!(!same_location("Moon Base", "Moonbase Cafe"));
        assert!(!has_transition_cue("Pat nurses a headache."));
        assert!(!has_transition_cue("A radio hums in the background."));
        assert!(!has_transition_cue("Lou is ahead of schedule."));
    }

    #[tokio::test]
    async fn words_that_only_contain_a_cue_do_not_excuse_a_jump() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat", "Lou"], "Locksmith Shop", "None", "warm")]);
        let (_llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "Moon Base",
                "Logical Transition (Yes/No): Yes\nExplanation: Fine.\nSuggested Transition Setup: None",
            )
        });
        let agent = EnvironmentAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent
            .evaluate(&memory, 2, "Pat and Lou nurse a headache at the Moon Base.")
            .await?;

        assert!(report.location_changed);
        assert!(!report.has_transition_cue);
        assert!(!report.is_consistent);
        Ok(())
    }

    #[test]
    fn environment_requires_a_location() {
        assert!(matches!(
            parse_environment("Key Details: a stool"),
            Err(ParseError::MissingSection { .. })
        ));
        let env = parse_environment("Environment: [Diner]\nKey Details: None").unwrap();
        assert_eq!(env.location, "Diner");
        assert!(env.key_details.is_empty());
    }
}
