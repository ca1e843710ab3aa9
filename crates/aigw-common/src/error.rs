use crate::ProviderId;

/// Uniform error surfaced by every provider adapter, the router and the
/// orchestrator. Carries enough structure for the orchestrator to decide
/// whether to retry or fail over without inspecting a message string.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed for provider {provider}")]
    Authentication { provider: ProviderId },

    #[error("rate limited by provider {provider}, resets at {reset_unix_ms}")]
    RateLimit {
        provider: ProviderId,
        reset_unix_ms: i64,
    },

    #[error("quota exhausted for provider {provider}")]
    Quota { provider: ProviderId },

    #[error("network error talking to provider {provider}: {message}")]
    Network {
        provider: ProviderId,
        message: String,
    },

    #[error("provider {provider} timed out after {elapsed_ms}ms")]
    Timeout {
        provider: ProviderId,
        elapsed_ms: u64,
    },

    #[error("model {model_id} is not available on provider {provider}")]
    ModelNotAvailable {
        provider: ProviderId,
        model_id: String,
    },

    #[error("circuit open for provider {provider}")]
    CircuitOpen { provider: ProviderId },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("{code}: {message}")]
    Generic {
        code: &'static str,
        message: String,
        retryable: bool,
        #[source]
        cause: Option<Box<GatewayError>>,
    },
}

impl GatewayError {
    /// Machine-readable code, stable across releases, used in logs and by
    /// callers that branch on failure class without matching variants.
    pub fn code(&self) -> &str {
        match self {
            GatewayError::Authentication { .. } => "AUTHENTICATION",
            GatewayError::RateLimit { .. } => "RATE_LIMIT",
            GatewayError::Quota { .. } => "QUOTA",
            GatewayError::Network { .. } => "NETWORK",
            GatewayError::Timeout { .. } => "TIMEOUT",
            GatewayError::ModelNotAvailable { .. } => "MODEL_NOT_AVAILABLE",
            GatewayError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            GatewayError::InvalidRequest { .. } => "INVALID_REQUEST",
            GatewayError::Generic { code, .. } => code,
        }
    }

    /// Whether the orchestrator should retry the same logical request
    /// (possibly against a different provider) after this error.
    pub fn retryable(&self) -> bool {
        match self {
            GatewayError::RateLimit { .. }
            | GatewayError::Network { .. }
            | GatewayError::Timeout { .. } => true,
            GatewayError::Generic { retryable, .. } => *retryable,
            GatewayError::Authentication { .. }
            | GatewayError::Quota { .. }
            | GatewayError::ModelNotAvailable { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::InvalidRequest { .. } => false,
        }
    }

    /// The provider this error originated from, when one is known. Generic
    /// terminal errors such as `ALL_ATTEMPTS_FAILED` do not name a single
    /// provider and return `None`.
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            GatewayError::Authentication { provider }
            | GatewayError::RateLimit { provider, .. }
            | GatewayError::Quota { provider }
            | GatewayError::Network { provider, .. }
            | GatewayError::Timeout { provider, .. }
            | GatewayError::ModelNotAvailable { provider, .. }
            | GatewayError::CircuitOpen { provider } => Some(*provider),
            GatewayError::InvalidRequest { .. } | GatewayError::Generic { .. } => None,
        }
    }

    pub fn no_providers_available() -> Self {
        GatewayError::Generic {
            code: "NO_PROVIDERS_AVAILABLE",
            message: "no provider satisfies the routing criteria".to_string(),
            retryable: false,
            cause: None,
        }
    }

    pub fn all_attempts_failed(cause: GatewayError) -> Self {
        GatewayError::Generic {
            code: "ALL_ATTEMPTS_FAILED",
            message: format!("all attempts failed, last error: {cause}"),
            retryable: false,
            cause: Some(Box::new(cause)),
        }
    }

    pub fn shutdown() -> Self {
        GatewayError::Generic {
            code: "SHUTDOWN",
            message: "gateway is shutting down".to_string(),
            retryable: false,
            cause: None,
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        GatewayError::InvalidRequest {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_matches_taxonomy() {
        assert!(
            GatewayError::Network {
                provider: ProviderId::Gemini,
                message: "boom".into()
            }
            .retryable()
        );
        assert!(!GatewayError::Authentication {
            provider: ProviderId::Gemini
        }
        .retryable());
        assert!(!GatewayError::no_providers_available().retryable());
    }

    #[test]
    fn all_attempts_failed_wraps_cause() {
        let cause = GatewayError::Timeout {
            provider: ProviderId::DeepSeek,
            elapsed_ms: 1200,
        };
        let wrapped = GatewayError::all_attempts_failed(cause);
        assert_eq!(wrapped.code(), "ALL_ATTEMPTS_FAILED");
        assert!(!wrapped.retryable());
    }
}
