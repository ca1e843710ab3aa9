use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aigw_common::{GatewayError, ProviderId};

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn build_client(connect_timeout: Duration, request_timeout: Duration) -> wreq::Client {
    wreq::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .expect("building a wreq client with only timeout options never fails")
}

pub fn map_transport_error(provider: ProviderId, err: wreq::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::Timeout {
            provider,
            elapsed_ms: 0,
        };
    }
    GatewayError::Network {
        provider,
        message: err.to_string(),
    }
}

pub fn map_status(provider: ProviderId, status: u16, body: &str) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Authentication { provider },
        404 => GatewayError::ModelNotAvailable {
            provider,
            model_id: "unknown".to_string(),
        },
        429 => GatewayError::RateLimit {
            provider,
            reset_unix_ms: now_unix_ms() + 60_000,
        },
        400..=499 => GatewayError::InvalidRequest {
            reason: format!("provider {provider} rejected request ({status}): {body}"),
        },
        _ => GatewayError::Network {
            provider,
            message: format!("upstream status {status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_reset_is_roughly_sixty_seconds_out() {
        let before = now_unix_ms();
        let err = map_status(ProviderId::Gemini, 429, "");
        let GatewayError::RateLimit { reset_unix_ms, .. } = err else {
            panic!("expected RateLimit");
        };
        assert!(reset_unix_ms >= before + 59_000);
        assert!(reset_unix_ms <= before + 61_000);
    }
}
