//! Errors raised by completion and embedding backends.

/// Everything that can go wrong between the pipeline and a model provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider answered but the completion carried no text.
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },

    /// Connection, TLS or timeout failure.
    #[error("request to {provider} failed: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status from the provider.
    #[error("{provider} error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("could not decode {provider} response: {reason}")]
    Decode { provider: String, reason: String },

    /// The completion did not follow the requested response format.
    #[error("malformed {provider} response: {reason}")]
    Malformed { provider: String, reason: String },

    /// Missing API key, bad base URL and similar setup defects.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every attempt of a retried call failed.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether a fresh attempt of the same request has a chance to succeed.
    ///
    /// Empty or malformed responses, network failures, rate limiting and
    /// server-side errors are transient.  Configuration problems and client
    /// errors such as a rejected API key are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmptyResponse { .. }
            | Self::Network { .. }
            | Self::Decode { .. }
            | Self::Malformed { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Configuration(_) | Self::ExhaustedRetries { .. } => false,
        }
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_server_errors_are_transient() {
        let empty = LlmError::EmptyResponse {
            provider: "openai".into(),
        };
        assert!(empty.is_transient());

        let overloaded = LlmError::Api {
            provider: "openai".into(),
            status: 503,
            body: "overloaded".into(),
        };
        assert!(overloaded.is_transient());

        let throttled = LlmError::Api {
            provider: "openai".into(),
            status: 429,
            body: String::new(),
        };
        assert!(throttled.is_transient());
    }

    #[test]
    fn auth_and_config_errors_fail_fast() {
        let unauthorized = LlmError::Api {
            provider: "openai".into(),
            status: 401,
            body: "bad key".into(),
        };
        assert!(!unauthorized.is_transient());
        assert!(!LlmError::Configuration("missing key".into()).is_transient());
    }

    #[test]
    fn exhausted_retries_reports_last_failure() {
        let err = LlmError::ExhaustedRetries {
            operation: "comedic analysis".into(),
            attempts: 3,
            last: Box::new(LlmError::EmptyResponse {
                provider: "ollama".into(),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("comedic analysis failed after 3 attempts"));
        assert!(rendered.contains("ollama returned an empty response"));
    }
}
