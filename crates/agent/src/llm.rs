use std::sync::Arc;

use sitcom_config::SamplingConfig;
use sitcom_llm::{LlmClient, LlmError, RetryPolicy, Sampling, retry_with_backoff};
use tracing::debug;

use crate::error::{AgentError, AgentResult, ParseError};
use crate::role::AgentRole;

/// Identifies one model call for logs and error context.
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub role: AgentRole,
    pub scene_number: u32,
    pub step: &'static str,
}

impl CallSite {
    pub fn new(role: AgentRole, scene_number: u32, step: &'static str) -> Self {
        Self {
            role,
            scene_number,
            step,
        }
    }
}

/// Shared model access for agents: one client, one retry policy and the
/// sampling presets, cheap to clone into each agent.
#[derive(Clone)]
pub struct AgentLlm {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    sampling: SamplingConfig,
}

impl AgentLlm {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy, sampling: SamplingConfig) -> Self {
        Self {
            client,
            retry,
            sampling,
        }
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn analysis(&self) -> Sampling {
        self.sampling.analysis.into()
    }

    pub fn creative(&self) -> Sampling {
        self.sampling.creative.into()
    }

    /// Complete `prompt` and run the reply through `parse`.
    ///
    /// A reply the parser rejects counts as a malformed response and is
    /// retried under the same policy as an empty one.
    pub async fn ask<T, P>(
        &self,
        site: CallSite,
        prompt: &str,
        sampling: Sampling,
        parse: P,
    ) -> AgentResult<T>
    where
        P: Fn(&str) -> Result<T, ParseError>,
    {
        let client = self.client.as_ref();
        let parse = &parse;
        let label = format!("{}: {}", site.role, site.step);
        debug!(agent = %site.role, scene = site.scene_number, step = site.step, "model call");

        retry_with_backoff(&self.retry, &label, || async move {
            let reply = client.complete(prompt, sampling).await?;
            parse(&reply).map_err(|err| LlmError::Malformed {
                provider: client.provider().to_string(),
                reason: err.to_string(),
            })
        })
        .await
        .map_err(|source| AgentError::Generation {
            role: site.role,
            scene_number: site.scene_number,
            step: site.step,
            source,
        })
    }

    /// [`AgentLlm::ask`] for free-form text; only emptiness is rejected.
    pub async fn ask_text(
        &self,
        site: CallSite,
        prompt: &str,
        sampling: Sampling,
    ) -> AgentResult<String> {
        self.ask(site, prompt, sampling, |reply| {
            let reply = reply.trim();
            if reply.is_empty() {
                Err(ParseError::Empty)
            } else {
                Ok(reply.to_string())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sitcom_llm::ScriptedLlm;
    use tokio::time::Instant;

    use super::*;
    use crate::parse::parse_verdict;

    #[tokio::test(start_paused = true)]
    async fn malformed_replies_are_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("The scene is fine.".into()),
            Ok("Verdict: Yes".into()),
        ]));
        let agent_llm = AgentLlm::new(llm.clone(), RetryPolicy::default(), SamplingConfig::default());
        let start = Instant::now();

        let verdict = agent_llm
            .ask(
                CallSite::new(AgentRole::Character, 2, "consistency check"),
                "check",
                agent_llm.analysis(),
                parse_verdict,
            )
            .await
            .unwrap();

        assert!(verdict.consistent);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_carries_agent_and_scene() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent_llm = AgentLlm::new(llm.clone(), RetryPolicy::default(), SamplingConfig::default());

        let err = agent_llm
            .ask_text(
                CallSite::new(AgentRole::Comedic, 5, "recommend"),
                "punch it up",
                agent_llm.creative(),
            )
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(err.role(), AgentRole::Comedic);
        assert_eq!(err.scene_number(), 5);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[0].sampling, Sampling::new(0.7, 0.9));
    }
}
