//! Character continuity: are the people in the next scene still themselves?

use futures::future::try_join_all;
use serde::Serialize;
use sitcom_config::AgentsConfig;
use sitcom_memory::{SceneMemory, SceneRecord};
use tracing::{info, instrument, warn};

use crate::bundle::{AgentRecommendationBundle, SceneRange};
use crate::context::{EvaluationContext, lookback_for};
use crate::error::{AgentResult, ParseError};
use crate::llm::{AgentLlm, CallSite};
use crate::parse::{self, Verdict};
use crate::prompts;
use crate::role::AgentRole;
use crate::text::{cited_scenes, strip_citations_outside, strip_scene_citations};

/// Prior appearances consulted per character profile.
pub const PROFILE_EVIDENCE_SCENES: usize = 3;
pub const INTERACTION_COUNT: usize = 2;

const MISSING_EVIDENCE_NOTE: &str =
    "Evidence: no earlier appearances; drawn from the current description only.";
const INTERACTIONS_HEADER: &str = "Interaction Recommendations:";
const HEADERS: [&str; 2] = ["Explanation:", INTERACTIONS_HEADER];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterProfile {
    pub name: String,
    pub source_scenes: Vec<u32>,
    pub source_summaries: Vec<String>,
    pub profile: String,
}

impl CharacterProfile {
    /// Wrap a generated profile, keeping only citations of the scenes it was
    /// built from. A character without prior appearances cites none.
    fn grounded(name: &str, evidence: &[&SceneRecord], text: &str) -> Self {
        let source_scenes: Vec<u32> = evidence.iter().map(|r| r.scene_number).collect();
        let profile = if evidence.is_empty() {
            let mut text = text.trim().to_string();
            if !cited_scenes(&text).is_empty() {
                warn!(character = name, "profile without evidence cites scenes; stripping");
                text = strip_scene_citations(&text, "this scene");
            }
            format!("{text}\n{MISSING_EVIDENCE_NOTE}")
        } else {
            let text = text.trim();
            if cited_scenes(text).iter().any(|n| !source_scenes.contains(n)) {
                warn!(character = name, sources = ?source_scenes, "profile cites scenes it was not built from; stripping");
                strip_citations_outside(text, &source_scenes, "an earlier scene")
            } else {
                text.to_string()
            }
        };
        Self {
            name: name.to_string(),
            source_scenes,
            source_summaries: evidence.iter().map(|r| r.summary.clone()).collect(),
            profile,
        }
    }

    pub fn has_evidence(&self) -> bool {
        !self.source_summaries.is_empty()
    }
}

/// A character seen in the window but absent from the candidate scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormerCharacter {
    pub name: String,
    pub scenes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterReport {
    pub scene_number: u32,
    pub consulted: SceneRange,
    pub current_scene_characters: Vec<String>,
    pub new_characters: Vec<String>,
    pub former_characters: Vec<FormerCharacter>,
    pub profiles: Vec<CharacterProfile>,
    pub is_consistent: bool,
    pub verdict_line: String,
    pub explanation: String,
    pub recommendations: Vec<String>,
    pub internal_thoughts: Vec<String>,
}

impl CharacterReport {
    pub fn bundle(&self) -> AgentRecommendationBundle {
        AgentRecommendationBundle::new(
            AgentRole::Character,
            self.is_consistent,
            self.explanation.clone(),
            &self.recommendations,
        )
    }
}

#[derive(Clone)]
pub struct CharacterAgent {
    llm: AgentLlm,
    lookback: usize,
    first_scene_lookback: usize,
}

impl CharacterAgent {
    pub fn new(llm: AgentLlm, config: &AgentsConfig) -> Self {
        Self {
            llm,
            lookback: config.character_lookback.max(1),
            first_scene_lookback: config.first_scene_lookback.max(1),
        }
    }

    pub async fn evaluate(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
    ) -> AgentResult<CharacterReport> {
        let num_scenes = lookback_for(scene_number, self.lookback, self.first_scene_lookback);
        self.evaluate_with(memory, scene_number, description, num_scenes).await
    }

    #[instrument(skip(self, memory, description), fields(agent = "character"))]
    pub async fn evaluate_with(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
        num_scenes: usize,
    ) -> AgentResult<CharacterReport> {
        let role = AgentRole::Character;
        let ctx = EvaluationContext::new(role, memory, scene_number, description, num_scenes)?;
        let site = |step| CallSite::new(role, scene_number, step);
        let mut thoughts = Vec::new();

        // Think
        thoughts.push(format!(
            "Think: scene {scene_number}, consulting {}",
            ctx.range.describe()
        ));

        // Act
        let prior = window_characters(ctx.window);
        let prior_names: Vec<String> = prior.iter().map(|f| f.name.clone()).collect();
        let current = self
            .llm
            .ask(
                site("character extraction"),
                &prompts::character_extraction(ctx.description, &prior_names),
                self.llm.analysis(),
                parse_characters,
            )
            .await?;
        let new_characters: Vec<String> = current
            .iter()
            .filter(|name| !prior_names.contains(name))
            .cloned()
            .collect();
        let former_characters: Vec<FormerCharacter> = prior
            .into_iter()
            .filter(|former| !current.contains(&former.name))
            .collect();
        thoughts.push(format!(
            "Act: present [{}], new [{}], former [{}]",
            current.join(", "),
            new_characters.join(", "),
            former_characters
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let profiles = try_join_all(current.iter().map(|name| self.profile(&ctx, name))).await?;
        for profile in &profiles {
            thoughts.push(if profile.has_evidence() {
                format!("Act: profiled {} from scenes {:?}", profile.name, profile.source_scenes)
            } else {
                format!("Act: no prior evidence for {}; current scene only", profile.name)
            });
        }
        let profiles_text = render_profiles(&profiles);

        // Observe
        let (verdict, explanation) = self
            .llm
            .ask(
                site("consistency check"),
                &prompts::character_consistency(ctx.description, &profiles_text, num_scenes),
                self.llm.analysis(),
                |reply| {
                    let verdict = parse::parse_verdict(reply)?;
                    Ok((verdict, parse::explanation(reply, &HEADERS)))
                },
            )
            .await?;
        let Verdict { consistent, line } = verdict;
        thoughts.push(format!("Observe: {line}"));

        // Recommend
        let prior_scenes = ctx.window_scene_numbers();
        let raw = self
            .llm
            .ask(
                site("interaction recommendations"),
                &prompts::character_interactions(
                    ctx.description,
                    &profiles_text,
                    &prior_scenes,
                    consistent,
                    &explanation,
                ),
                self.llm.creative(),
                parse_interactions,
            )
            .await?;
        let anchor = citation_anchor(ctx.window, &current);
        let recommendations: Vec<String> = raw
            .into_iter()
            .map(|item| ground_recommendation(item, &prior_scenes, anchor))
            .collect();
        thoughts.push(format!(
            "Recommend: {} interaction(s){}",
            recommendations.len(),
            if consistent { "" } else { " resolving the flagged contradiction" }
        ));

        info!(
            scene = scene_number,
            consistent,
            present = current.len(),
            new = new_characters.len(),
            former = former_characters.len(),
            "character evaluation complete"
        );

        Ok(CharacterReport {
            scene_number,
            consulted: ctx.range,
            current_scene_characters: current,
            new_characters,
            former_characters,
            profiles,
            is_consistent: consistent,
            verdict_line: line,
            explanation,
            recommendations,
            internal_thoughts: thoughts,
        })
    }

    async fn profile(
        &self,
        ctx: &EvaluationContext<'_>,
        name: &str,
    ) -> AgentResult<CharacterProfile> {
        let appearances = ctx.memory.appearances(name);
        let evidence = &appearances[appearances.len().saturating_sub(PROFILE_EVIDENCE_SCENES)..];
        let text = self
            .llm
            .ask_text(
                CallSite::new(AgentRole::Character, ctx.scene_number, "character profile"),
                &prompts::character_profile(name, evidence, ctx.description),
                self.llm.creative(),
            )
            .await?;
        Ok(CharacterProfile::grounded(name, evidence, &text))
    }
}

/// Characters of the window in order of first appearance, with the scenes
/// they appeared in.
fn window_characters(window: &[SceneRecord]) -> Vec<FormerCharacter> {
    let mut seen: Vec<FormerCharacter> = Vec::new();
    for record in window {
        for name in &record.characters {
            match seen.iter_mut().find(|f| &f.name == name) {
                Some(entry) => entry.scenes.push(record.scene_number),
                None => seen.push(FormerCharacter {
                    name: name.clone(),
                    scenes: vec![record.scene_number],
                }),
            }
        }
    }
    seen
}

fn parse_characters(reply: &str) -> Result<Vec<String>, ParseError> {
    reply
        .lines()
        .find_map(|line| parse::strip_key(line, "Characters:"))
        .map(parse::parse_name_list)
        .ok_or_else(|| ParseError::MissingSection {
            section: "Characters".to_string(),
        })
}

fn parse_interactions(reply: &str) -> Result<Vec<String>, ParseError> {
    let items = parse::section_items(reply, INTERACTIONS_HEADER, &HEADERS)
        .filter(|items| !items.is_empty())
        .unwrap_or_else(|| parse::list_items(reply));
    if items.len() < INTERACTION_COUNT {
        return Err(ParseError::TooFewItems {
            section: "Interaction Recommendations".to_string(),
            expected: INTERACTION_COUNT,
            found: items.len(),
        });
    }
    Ok(items.into_iter().take(INTERACTION_COUNT).collect())
}

fn render_profiles(profiles: &[CharacterProfile]) -> String {
    if profiles.is_empty() {
        return "No characters identified.".to_string();
    }
    profiles
        .iter()
        .map(|p| format!("Character: {}\n{}", p.name, p.profile))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Most recent window scene featuring one of `present`, else the newest
/// window scene.
fn citation_anchor(window: &[SceneRecord], present: &[String]) -> Option<u32> {
    window
        .iter()
        .rev()
        .find(|record| present.iter().any(|name| record.features(name)))
        .or_else(|| window.last())
        .map(|record| record.scene_number)
}

/// Every recommendation cites a prior window scene and nothing else; with no
/// prior scenes it cites none.
fn ground_recommendation(item: String, prior_scenes: &[u32], anchor: Option<u32>) -> String {
    let Some(scene) = anchor else {
        return if cited_scenes(&item).is_empty() {
            item
        } else {
            strip_scene_citations(&item, "this scene")
        };
    };
    let item = if cited_scenes(&item).iter().any(|n| !prior_scenes.contains(n)) {
        strip_citations_outside(&item, prior_scenes, "an earlier scene")
    } else {
        item
    };
    if cited_scenes(&item).is_empty() {
        format!("{} (builds on Scene {scene})", item.trim_end_matches('.'))
    } else {
        item
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use sitcom_llm::LlmError;

    use super::*;
    use crate::prompts::is_task;
    use crate::testing::{memory_with, record, scripted};

    fn agents_config() -> AgentsConfig {
        AgentsConfig::default()
    }

    fn responder(
        characters: &'static str,
        verdict: &'static str,
    ) -> impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static {
        move |prompt: &str| {
            let reply = if is_task(prompt, prompts::CHARACTER_EXTRACTION) {
                format!("Characters: [{characters}]")
            } else if is_task(prompt, prompts::CHARACTER_PROFILE) {
                "Personality: jittery, as seen in Scene 1.\nSpeaking style: rapid.".to_string()
            } else if is_task(prompt, prompts::CHARACTER_CONSISTENCY) {
                format!("Consistency Verdict (Yes/No): {verdict}\nExplanation: Pat stays anxious.")
            } else if is_task(prompt, prompts::CHARACTER_INTERACTIONS) {
                "Interaction Recommendations:\n\
                 1. Pat hides the spare key from Lou, echoing Scene 1.\n\
                 2. Lou teases Pat about the jammed door."
                    .to_string()
            } else {
                return Err(LlmError::EmptyResponse { provider: "test".into() });
            };
            Ok(reply)
        }
    }

    #[tokio::test]
    async fn scene_two_against_scene_one_has_no_former_characters() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat", "Lou"], "Locksmith Shop", "None", "warm")]);
        let (_llm, agent_llm) = scripted(responder("Pat, Lou, Dana", "Yes"));
        let agent = CharacterAgent::new(agent_llm, &agents_config());

        let report = agent
            .evaluate(&memory, 2, "Pat, Lou and their new landlord Dana argue over rent.")
            .await?;

        assert_eq!(report.consulted, SceneRange { start: 1, end: 1 });
        assert!(report.former_characters.is_empty());
        assert_eq!(report.new_characters, vec!["Dana"]);
        assert_eq!(report.current_scene_characters, vec!["Pat", "Lou", "Dana"]);
        assert!(report.is_consistent);
        assert_eq!(report.recommendations.len(), INTERACTION_COUNT);
        assert!(report.internal_thoughts[0].starts_with("Think: scene 2"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_memory_has_no_former_characters() -> Result<()> {
        let memory = memory_with(Vec::new());
        let (_llm, agent_llm) = scripted(responder("Pat", "Yes"));
        let agent = CharacterAgent::new(agent_llm, &agents_config());

        let report = agent.evaluate(&memory, 2, "Pat opens the shop alone.").await?;

        assert!(report.former_characters.is_empty());
        assert_eq!(report.new_characters, vec!["Pat"]);
        assert_eq!(report.consulted.describe(), "scene 1");
        assert!(report.profiles[0].profile.contains(MISSING_EVIDENCE_NOTE));
        Ok(())
    }

    #[tokio::test]
    async fn profiles_without_prior_appearances_cite_no_scenes() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat"], "Locksmith Shop", "None", "warm")]);
        let (_llm, agent_llm) = scripted(responder("Pat, Dana", "Yes"));
        let agent = CharacterAgent::new(agent_llm, &agents_config());

        let report = agent.evaluate(&memory, 2, "Dana visits Pat.").await?;

        let dana = report.profiles.iter().find(|p| p.name == "Dana").unwrap();
        assert!(dana.source_summaries.is_empty());
        assert!(cited_scenes(&dana.profile).is_empty());
        assert!(dana.profile.contains(MISSING_EVIDENCE_NOTE));

        let pat = report.profiles.iter().find(|p| p.name == "Pat").unwrap();
        assert_eq!(pat.source_scenes, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn former_characters_carry_their_scenes() -> Result<()> {
        let memory = memory_with(vec![
            record(1, &["Pat", "Lou"], "Locksmith Shop", "None", "warm"),
            record(2, &["Pat", "Rhea"], "Locksmith Shop", "None", "warm"),
            record(3, &["Pat", "Lou"], "Diner", "None", "tense"),
        ]);
        let (_llm, agent_llm) = scripted(responder("Pat", "No, Pat is suddenly calm"));
        let agent = CharacterAgent::new(agent_llm, &agents_config());

        let report = agent.evaluate(&memory, 4, "Pat sits alone, serene.").await?;

        assert_eq!(report.consulted, SceneRange { start: 1, end: 3 });
        assert_eq!(
            report.former_characters,
            vec![
                FormerCharacter { name: "Lou".into(), scenes: vec![1, 3] },
                FormerCharacter { name: "Rhea".into(), scenes: vec![2] },
            ]
        );
        assert!(!report.is_consistent);
        assert!(!report.bundle().is_consistent);
        // The second suggestion cited nothing and is anchored to Pat's latest scene.
        assert!(report.recommendations[1].ends_with("(builds on Scene 3)"));
        Ok(())
    }

    #[tokio::test]
    async fn interactions_answer_the_consistency_critique() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat", "Lou"], "Locksmith Shop", "None", "warm")]);
        for (verdict, critiqued) in [("No", true), ("Yes", false)] {
            let (llm, agent_llm) = scripted(responder("Pat, Lou", verdict));
            let agent = CharacterAgent::new(agent_llm, &agents_config());

            agent.evaluate(&memory, 2, "Pat and Lou reopen the shop.").await?;

            let prompt = llm
                .calls()
                .into_iter()
                .map(|call| call.prompt)
                .find(|prompt| is_task(prompt, prompts::CHARACTER_INTERACTIONS))
                .unwrap_or_default();
            assert_eq!(prompt.contains("Critique:\nPat stays anxious."), critiqued);
            assert_eq!(prompt.contains("must resolve this critique"), critiqued);
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_extraction_is_fatal_for_the_scene() {
        let memory = memory_with(Vec::new());
        let llm = Arc::new(sitcom_llm::ScriptedLlm::new(Vec::new()));
        let agent_llm = AgentLlm::new(
            llm.clone(),
            sitcom_llm::RetryPolicy::default(),
            sitcom_config::SamplingConfig::default(),
        );
        let agent = CharacterAgent::new(agent_llm, &agents_config());

        let err = agent.evaluate(&memory, 2, "Pat opens up.").await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.role(), AgentRole::Character);
        assert_eq!(err.scene_number(), 2);
        assert_eq!(llm.call_count(), 3);
    }

    #[test]
    fn grounding_adds_or_strips_citations() {
        assert_eq!(
            ground_recommendation("Pat apologizes.".into(), &[2, 3], Some(3)),
            "Pat apologizes (builds on Scene 3)"
        );
        assert_eq!(
            ground_recommendation("As in Scene 2, Pat apologizes.".into(), &[2, 3], Some(3)),
            "As in Scene 2, Pat apologizes."
        );
        assert_eq!(
            ground_recommendation("As in Scene 7, Pat apologizes.".into(), &[], None),
            "As in this scene, Pat apologizes."
        );
    }

    #[test]
    fn citations_outside_the_window_are_replaced() {
        let grounded = ground_recommendation("As in Scene 9, Pat apologizes.".into(), &[1, 2, 3], Some(3));
        assert_eq!(cited_scenes(&grounded), vec![3]);
        assert_eq!(grounded, "As in an earlier scene, Pat apologizes (builds on Scene 3)");

        let mixed = ground_recommendation("Echo Scene 2 and Scene 8.".into(), &[1, 2, 3], Some(3));
        assert_eq!(cited_scenes(&mixed), vec![2]);
    }

    #[test]
    fn profiles_only_cite_their_source_scenes() {
        let scene_one = record(1, &["Pat", "Lou"], "Locksmith Shop", "None", "warm");
        let profile = CharacterProfile::grounded(
            "Pat",
            &[&scene_one],
            "In Scene 7, Pat betrays Lou. Scene 1 shows Pat's pride.",
        );
        assert_eq!(profile.source_scenes, vec![1]);
        assert_eq!(cited_scenes(&profile.profile), vec![1]);
        assert!(profile.profile.starts_with("In an earlier scene, Pat betrays Lou."));
    }
}
