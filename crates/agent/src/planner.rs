//! Scene planner: folds the three continuity bundles into one plan for the
//! script writer.

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use crate::bundle::AgentRecommendationBundle;
use crate::error::{AgentError, AgentResult, ParseError};
use crate::llm::{AgentLlm, CallSite};
use crate::parse;
use crate::prompts;
use crate::role::AgentRole;

const PLAN_HEADERS: [&str; 5] = [
    "Scene Plan:",
    "Character Goals:",
    "Comedic Goal:",
    "Environment Detail:",
    "Creative Suggestion:",
];

/// The plan handed to the script writer. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenePlan {
    pub scene_number: u32,
    pub character_goals: [String; 2],
    pub comedic_goal: String,
    pub environment_detail: String,
    pub creative_suggestion: String,
}

impl ScenePlan {
    pub fn render(&self) -> String {
        format!(
            "Scene Plan:\n\
             Character Goals:\n- {}\n- {}\n\
             Comedic Goal: {}\n\
             Environment Detail: {}\n\
             Creative Suggestion: {}",
            self.character_goals[0],
            self.character_goals[1],
            self.comedic_goal,
            self.environment_detail,
            self.creative_suggestion
        )
    }
}

impl fmt::Display for ScenePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Clone)]
pub struct ScenePlanner {
    llm: AgentLlm,
}

impl ScenePlanner {
    pub fn new(llm: AgentLlm) -> Self {
        Self { llm }
    }

    /// Synthesize a plan for `scene_number`. `related` is optional extra
    /// context about earlier scenes and may be empty.
    #[instrument(skip_all, fields(agent = "planner", scene = scene_number))]
    pub async fn plan(
        &self,
        scene_number: u32,
        description: &str,
        character: &AgentRecommendationBundle,
        comedic: &AgentRecommendationBundle,
        environment: &AgentRecommendationBundle,
        related: &str,
    ) -> AgentResult<ScenePlan> {
        let invalid = |reason: String| AgentError::InvalidInput {
            role: AgentRole::Planner,
            scene_number,
            reason,
        };
        if description.trim().is_empty() {
            return Err(invalid("scene description is empty".to_string()));
        }
        for bundle in [character, comedic, environment] {
            if bundle.recommendations.trim().is_empty() {
                return Err(invalid(format!("{} recommendations are empty", bundle.agent)));
            }
        }

        let sources: Vec<String> = [character, comedic, environment]
            .into_iter()
            .flat_map(|bundle| bundle.items())
            .map(normalize)
            .collect();

        let plan = self
            .llm
            .ask(
                CallSite::new(AgentRole::Planner, scene_number, "scene plan"),
                &prompts::scene_plan(
                    scene_number,
                    description.trim(),
                    character,
                    comedic,
                    environment,
                    related,
                ),
                self.llm.creative(),
                |reply| parse_plan(scene_number, reply, &sources),
            )
            .await?;

        info!(scene = scene_number, "scene plan ready");
        Ok(plan)
    }
}

fn normalize(line: &str) -> String {
    parse::clean_line(line)
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_lowercase()
}

fn reject_copy(section: &str, line: String, sources: &[String]) -> Result<String, ParseError> {
    if sources.contains(&normalize(&line)) {
        return Err(ParseError::VerbatimCopy {
            section: section.to_string(),
            line,
        });
    }
    Ok(line)
}

fn single(reply: &str, header: &str, sources: &[String]) -> Result<String, ParseError> {
    let mut items = parse::require_items(reply, header, &PLAN_HEADERS, 1)?;
    let section = header.trim_end_matches(':');
    reject_copy(section, items.remove(0), sources)
}

/// Read the five plan sections; extra character goals are dropped.
fn parse_plan(scene_number: u32, reply: &str, sources: &[String]) -> Result<ScenePlan, ParseError> {
    let goals = parse::require_items(reply, "Character Goals:", &PLAN_HEADERS, 2)?;
    let mut goals = goals
        .into_iter()
        .map(|goal| reject_copy("Character Goals", goal, sources));
    let (Some(first), Some(second)) = (goals.next(), goals.next()) else {
        return Err(ParseError::MissingSection {
            section: "Character Goals".to_string(),
        });
    };

    Ok(ScenePlan {
        scene_number,
        character_goals: [first?, second?],
        comedic_goal: single(reply, "Comedic Goal:", sources)?,
        environment_detail: single(reply, "Environment Detail:", sources)?,
        creative_suggestion: single(reply, "Creative Suggestion:", sources)?,
    })
}
