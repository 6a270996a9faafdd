//! Offline completion backend driven by canned replies.
//!
//! Used by the test suites of every crate above this one, and handy for
//! exercising the pipeline without network access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LlmError, LlmResult};
use crate::{LlmClient, Sampling};

type Responder = Box<dyn Fn(&str) -> LlmResult<String> + Send + Sync>;

/// One recorded `complete` call.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub prompt: String,
    pub sampling: Sampling,
}

/// Replays queued replies in order, then falls back to a responder closure.
///
/// When both are exhausted every call yields [`LlmError::EmptyResponse`].
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<LlmResult<String>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<LlmResult<String>>) -> Self {
        Self {
            queue: Mutex::new(replies.into()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every prompt through `responder`, which can route on content.
    pub fn with_responder(
        responder: impl Fn(&str) -> LlmResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls seen so far, oldest first.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, sampling: Sampling) -> LlmResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                prompt: prompt.to_string(),
                sampling,
            });
        }

        let queued = self.queue.lock().ok().and_then(|mut queue| queue.pop_front());
        if let Some(reply) = queued {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(prompt),
            None => Err(LlmError::EmptyResponse {
                provider: self.provider().to_string(),
            }),
        }
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_then_empty() {
        let llm = ScriptedLlm::new(vec![
            Err(LlmError::EmptyResponse {
                provider: "scripted".into(),
            }),
            Ok("Title: \"Lockout\"".into()),
        ]);
        let sampling = Sampling::new(0.7, 0.9);

        assert!(llm.complete("a", sampling).await.is_err());
        assert_eq!(llm.complete("b", sampling).await.unwrap(), "Title: \"Lockout\"");
        assert!(matches!(
            llm.complete("c", sampling).await,
            Err(LlmError::EmptyResponse { .. })
        ));
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[1].prompt, "b");
    }

    #[tokio::test]
    async fn responder_routes_on_prompt() {
        let llm = ScriptedLlm::with_responder(|prompt| {
            if prompt.contains("location") {
                Ok("Environment: Moon Base".into())
            } else {
                Ok("Characters: Pat".into())
            }
        });
        let sampling = Sampling::new(0.0, 1.0);
        assert_eq!(
            llm.complete("which location?", sampling).await.unwrap(),
            "Environment: Moon Base"
        );
        assert_eq!(
            llm.complete("who is here?", sampling).await.unwrap(),
            "Characters: Pat"
        );
    }
}
