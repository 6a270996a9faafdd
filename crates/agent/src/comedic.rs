//! Comedic continuity: tone against the prior scenes, and running jokes that
//! have stopped being funny.

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

pub const MIN_ENHANCEMENTS: usize = 2;
pub const MAX_ENHANCEMENTS: usize = 4;

const HEADERS: [&str; 4] = ["Detected Tone:", "Explanation:", "Overuse Check:", "Suggestions:"];

/// Result of the tone/overuse review for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ToneFindings {
    tone_consistent: bool,
    verdict_line: String,
    detected_tone: Option<String>,
    explanation: String,
    overuse: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComedicReport {
    pub scene_number: u32,
    pub consulted: SceneRange,
    /// Recurring-joke tags of the window, one per scene that has one.
    pub prior_jokes: Vec<String>,
    pub tone_consistent: bool,
    pub detected_tone: Option<String>,
    pub verdict_line: String,
    pub explanation: String,
    /// Overused jokes; empty when nothing is overused.
    pub overused_jokes: Vec<String>,
    pub recommendations: Vec<String>,
    pub internal_thoughts: Vec<String>,
}

impl ComedicReport {
    pub fn has_overuse(&self) -> bool {
        !self.overused_jokes.is_empty()
    }

    /// Tone decides the verdict; overuse travels in the explanation.
    pub fn bundle(&self) -> AgentRecommendationBundle {
        let mut explanation = self.explanation.clone();
        if self.has_overuse() {
            if !explanation.is_empty() {
                explanation.push('\n');
            }
            explanation.push_str(&format!("Overused jokes: {}", self.overused_jokes.join(", ")));
        }
        AgentRecommendationBundle::new(
            AgentRole::Comedic,
            self.tone_consistent,
            explanation,
            &self.recommendations,
        )
    }
}

#[derive(Clone)]
pub struct ComedicAgent {
    llm: AgentLlm,
    lookback: usize,
    first_scene_lookback: usize,
}

impl ComedicAgent {
    pub fn new(llm: AgentLlm, config: &AgentsConfig) -> Self {
        Self {
            llm,
            lookback: config.comedic_lookback.max(1),
            first_scene_lookback: config.first_scene_lookback.max(1),
        }
    }

    pub async fn evaluate(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
    ) -> AgentResult<ComedicReport> {
        let num_scenes = lookback_for(scene_number, self.lookback, self.first_scene_lookback);
        self.evaluate_with(memory, scene_number, description, num_scenes).await
    }

    #[instrument(skip(self, memory, description), fields(agent = "comedic"))]
    pub async fn evaluate_with(
        &self,
        memory: &SceneMemory,
        scene_number: u32,
        description: &str,
        num_scenes: usize,
    ) -> AgentResult<ComedicReport> {
        let role = AgentRole::Comedic;
        let ctx = EvaluationContext::new(role, memory, scene_number, description, num_scenes)?;
        let site = |step| CallSite::new(role, scene_number, step);
        let mut thoughts = vec![format!(
            "Think: scene {scene_number}, consulting {}",
            ctx.range.describe()
        )];

        let prior_jokes: Vec<String> = ctx
            .window
            .iter()
            .filter(|r| r.has_recurring_joke())
            .map(|r| r.recurring_joke.clone())
            .collect();
        let local_overuse = overused_jokes(ctx.window, ctx.description);
        thoughts.push(format!(
            "Act: {} summaries, jokes [{}]",
            ctx.window.len(),
            prior_jokes.join(", ")
        ));

        let findings = self
            .llm
            .ask(
                site("tone review"),
                &prompts::comedic_consistency(ctx.window, ctx.description),
                self.llm.analysis(),
                parse_findings,
            )
            .await?;
        let overused = merge_overuse(local_overuse, &findings.overuse);
        thoughts.push(format!(
            "Observe: tone {}; overuse [{}]",
            if findings.tone_consistent { "consistent" } else { "inconsistent" },
            overused.join(", ")
        ));

        let critique = if overused.is_empty() {
            findings.explanation.clone()
        } else {
            format!("{}\nOverused jokes: {}", findings.explanation, overused.join(", "))
        };
        let recommendations = self
            .llm
            .ask(
                site("humor enhancements"),
                &prompts::humor_enhancements(
                    ctx.window,
                    ctx.description,
                    findings.tone_consistent && overused.is_empty(),
                    &critique,
                    &overused,
                ),
                self.llm.creative(),
                |reply| {
                    let items = parse::section_items(reply, "Suggestions:", &HEADERS)
                        .filter(|items| items.len() >= MIN_ENHANCEMENTS)
                        .unwrap_or_else(|| parse::list_items(reply));
                    if items.len() < MIN_ENHANCEMENTS {
                        return Err(ParseError::TooFewItems {
                            section: "Suggestions".to_string(),
                            expected: MIN_ENHANCEMENTS,
                            found: items.len(),
                        });
                    }
                    Ok(items.into_iter().take(MAX_ENHANCEMENTS).collect::<Vec<_>>())
                },
            )
            .await?;
        thoughts.push(format!("Recommend: {} enhancement(s)", recommendations.len()));

        info!(
            scene = scene_number,
            tone_consistent = findings.tone_consistent,
            overused = overused.len(),
            "comedic evaluation complete"
        );

        Ok(ComedicReport {
            scene_number,
            consulted: ctx.range,
            prior_jokes,
            tone_consistent: findings.tone_consistent,
            detected_tone: findings.detected_tone,
            verdict_line: findings.verdict_line,
            explanation: findings.explanation,
            overused_jokes: overused,
            recommendations,
            internal_thoughts: thoughts,
        })
    }
}

fn parse_findings(reply: &str) -> Result<ToneFindings, ParseError> {
    let verdict = parse::parse_verdict(reply)?;
    let overuse = reply
        .lines()
        .find_map(|line| parse::strip_key(line, "Overuse Check:"))
        .map(parse::parse_name_list)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| !is_no_overuse(name))
        .collect();
    Ok(ToneFindings {
        tone_consistent: verdict.consistent,
        verdict_line: verdict.line,
        detected_tone: parse::labeled_value(reply, "Detected Tone:"),
        explanation: parse::explanation(reply, &HEADERS),
        overuse,
    })
}

fn is_no_overuse(value: &str) -> bool {
    let lowered = value.to_lowercase();
    is_none(&lowered) || lowered.starts_with("no ") || lowered.starts_with("nothing")
}

/// Jokes the window has worn out.
///
/// A tag is overused when it appears in every record of a window of two or
/// more scenes that all share one emotional tone, or when it appears in at
/// least two windowed scenes and the candidate description reuses it.
pub fn overused_jokes(window: &[SceneRecord], description: &str) -> Vec<String> {
    let description = description.to_lowercase();
    let uniform_tone = window
        .first()
        .map(|first| {
            window
                .iter()
                .all(|r| r.emotional_tone.eq_ignore_ascii_case(&first.emotional_tone))
        })
        .unwrap_or(false);

    let mut tags: Vec<(&str, usize)> = Vec::new();
    for record in window.iter().filter(|r| r.has_recurring_joke()) {
        let tag = record.recurring_joke.trim();
        match tags.iter_mut().find(|(t, _)| t.eq_ignore_ascii_case(tag)) {
            Some((_, count)) => *count += 1,
            None => tags.push((tag, 1)),
        }
    }

    tags.into_iter()
        .filter(|&(tag, count)| {
            let worn_out = window.len() >= 2 && count == window.len() && uniform_tone;
            let reused = count >= 2 && description.contains(&tag.to_lowercase());
            worn_out || reused
        })
        .map(|(tag, _)| tag.to_string())
        .collect()
}

fn merge_overuse(mut local: Vec<String>, reported: &[String]) -> Vec<String> {
    for name in reported {
        if !local.iter().any(|known| known.eq_ignore_ascii_case(name)) {
            local.push(name.clone());
        }
    }
    local
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use sitcom_llm::LlmError;

    use super::*;
    use crate::prompts::is_task;
    use crate::testing::{memory_with, record, scripted};

    const PUN: &str = "pun-about-locks";

    fn reply_for(prompt: &str, review: &str) -> Result<String, LlmError> {
        if is_task(prompt, prompts::COMEDIC_CONSISTENCY) {
            Ok(review.to_string())
        } else if is_task(prompt, prompts::HUMOR_ENHANCEMENTS) {
            Ok("Suggestions:\n- Flip the lock pun so Lou groans first\n- Give Dana a deadpan counter\n- Let the alarm interrupt the punchline".to_string())
        } else {
            Err(LlmError::EmptyResponse { provider: "test".into() })
        }
    }

    #[tokio::test]
    async fn repeated_joke_reused_verbatim_is_named() -> Result<()> {
        let memory = memory_with(vec![
            record(1, &["Pat"], "Locksmith Shop", PUN, "playful"),
            record(2, &["Pat"], "Locksmith Shop", PUN, "playful"),
            record(3, &["Pat"], "Locksmith Shop", PUN, "playful"),
        ]);
        // The model misses the overuse; the local check still catches it.
        let (llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "Tone Consistent (Yes/No): Yes\nDetected Tone: playful\nExplanation: Light banter continues.\nOveruse Check: None",
            )
        });
        let agent = ComedicAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent
            .evaluate(&memory, 4, "Pat makes the pun-about-locks again while Lou rolls his eyes.")
            .await?;

        assert!(report.tone_consistent);
        assert_eq!(report.overused_jokes, vec![PUN]);
        assert_eq!(report.detected_tone.as_deref(), Some("playful"));
        assert_eq!(report.recommendations.len(), 3);
        assert!(report.bundle().explanation.contains("Overused jokes: pun-about-locks"));

        let enhancement_prompt = &llm.calls()[1].prompt;
        assert!(enhancement_prompt.contains("Do not reuse these overused jokes as-is: pun-about-locks"));
        Ok(())
    }

    #[tokio::test]
    async fn tone_and_overuse_are_independent() -> Result<()> {
        let memory = memory_with(vec![
            record(1, &["Pat"], "Locksmith Shop", "None", "warm"),
            record(2, &["Pat"], "Locksmith Shop", "key-jingle", "warm"),
        ]);
        let (_llm, agent_llm) = scripted(|prompt| {
            reply_for(
                prompt,
                "Tone Consistent (Yes/No): No\nDetected Tone: grim\nExplanation: The scene turns bleak.\nOveruse Check: key-jingle",
            )
        });
        let agent = ComedicAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent.evaluate(&memory, 3, "Pat mourns a broken key.").await?;

        assert!(!report.tone_consistent);
        assert_eq!(report.overused_jokes, vec!["key-jingle"]);
        assert_eq!(report.prior_jokes, vec!["key-jingle"]);
        assert_eq!(report.explanation, "The scene turns bleak.");
        Ok(())
    }

    #[tokio::test]
    async fn enhancements_answer_the_tone_critique() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat"], "Locksmith Shop", "None", "warm")]);
        for (verdict, critiqued) in [("No", true), ("Yes", false)] {
            let review = format!(
                "Tone Consistent (Yes/No): {verdict}\nDetected Tone: grim\nExplanation: The scene turns bleak.\nOveruse Check: None"
            );
            let (llm, agent_llm) = scripted(move |prompt| reply_for(prompt, &review));
            let agent = ComedicAgent::new(agent_llm, &AgentsConfig::default());

            agent.evaluate(&memory, 2, "Pat mourns a broken key.").await?;

            let prompt = llm
                .calls()
                .into_iter()
                .map(|call| call.prompt)
                .find(|prompt| is_task(prompt, prompts::HUMOR_ENHANCEMENTS))
                .unwrap_or_default();
            assert_eq!(prompt.contains("Critique:\nThe scene turns bleak."), critiqued);
            assert_eq!(prompt.contains("flagged as inconsistent"), critiqued);
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn too_few_enhancements_are_retried() -> Result<()> {
        let memory = memory_with(vec![record(1, &["Pat"], "Locksmith Shop", "None", "warm")]);
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let (llm, agent_llm) = scripted(move |prompt| {
            if is_task(prompt, prompts::HUMOR_ENHANCEMENTS)
                && attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0
            {
                return Ok("Suggestions:\n- just one".to_string());
            }
            reply_for(prompt, "Yes\nExplanation: fine\nOveruse Check: None")
        });
        let agent = ComedicAgent::new(agent_llm, &AgentsConfig::default());

        let report = agent.evaluate(&memory, 2, "Pat hums.").await?;

        assert_eq!(report.recommendations.len(), 3);
        assert!(report.overused_jokes.is_empty());
        assert_eq!(llm.call_count(), 3);
        Ok(())
    }

    #[test]
    fn overuse_rules() {
        let varied = vec![
            record(1, &[], "Shop", PUN, "playful"),
            record(2, &[], "Shop", PUN, "melancholy"),
        ];
        // Tone varies and the candidate does not reuse the joke.
        assert!(overused_jokes(&varied, "A quiet scene.").is_empty());
        // Reuse of a twice-told joke is overuse regardless of tone.
        assert_eq!(overused_jokes(&varied, "Another PUN-ABOUT-LOCKS."), vec![PUN]);

        let flat = vec![
            record(1, &[], "Shop", PUN, "playful"),
            record(2, &[], "Shop", PUN, "Playful"),
        ];
        assert_eq!(overused_jokes(&flat, "A quiet scene."), vec![PUN]);

        let single = vec![record(1, &[], "Shop", PUN, "playful")];
        assert!(overused_jokes(&single, "pun-about-locks").is_empty());
    }
}
