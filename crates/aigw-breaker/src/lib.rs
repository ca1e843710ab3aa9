//! Per-provider circuit breaker: closed/open/half-open state machine with a
//! failure-count threshold and a recovery timer, plus a hard per-call
//! timeout race independent of whatever deadline the caller's future
//! already carries.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use aigw_common::{GatewayError, ProviderId};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitMode {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct State {
    mode: CircuitMode,
    next_attempt_at: Option<Instant>,
}

/// A single provider's breaker. Owned by the orchestrator, one per provider.
pub struct CircuitBreaker {
    provider: ProviderId,
    config: BreakerConfig,
    state: RwLock<State>,
    failure_count: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: BreakerConfig) -> Self {
        Self {
            provider,
            config,
            state: RwLock::new(State {
                mode: CircuitMode::Closed,
                next_attempt_at: None,
            }),
            failure_count: AtomicU32::new(0),
        }
    }

    pub fn mode(&self) -> CircuitMode {
        self.check_recovery();
        self.state.read().mode
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Transitions Open -> HalfOpen once the recovery timer has elapsed, so
    /// that a subsequent read of `mode()` sees the trial state rather than a
    /// stale Open.
    fn check_recovery(&self) {
        let mut state = self.state.write();
        if state.mode == CircuitMode::Open {
            if let Some(next) = state.next_attempt_at {
                if Instant::now() >= next {
                    state.mode = CircuitMode::HalfOpen;
                }
            }
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut state = self.state.write();
        if state.mode != CircuitMode::Closed {
            tracing::info!(
                event = "circuit_closed",
                provider = %self.provider,
                "circuit breaker closed after successful call"
            );
        }
        state.mode = CircuitMode::Closed;
        state.next_attempt_at = None;
    }

    fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.write();
        if state.mode == CircuitMode::HalfOpen || failures >= self.config.failure_threshold {
            state.mode = CircuitMode::Open;
            state.next_attempt_at = Some(Instant::now() + self.config.recovery_timeout);
            tracing::warn!(
                event = "circuit_opened",
                provider = %self.provider,
                failures,
                recovery_secs = self.config.recovery_timeout.as_secs(),
                "circuit breaker opened after {failures} consecutive failures"
            );
        }
    }

    pub fn reset(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut state = self.state.write();
        state.mode = CircuitMode::Closed;
        state.next_attempt_at = None;
    }

    /// Runs `f` if the circuit admits a call, racing it against
    /// `config.call_timeout`. Fails fast with `CircuitOpen` without running
    /// `f` at all when the circuit is open and the recovery timer has not
    /// yet elapsed.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.check_recovery();
        if self.state.read().mode == CircuitMode::Open {
            return Err(GatewayError::CircuitOpen {
                provider: self.provider,
            });
        }

        let result = tokio::time::timeout(self.config.call_timeout, f()).await;
        match result {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(GatewayError::Timeout {
                    provider: self.provider,
                    elapsed_ms: self.config.call_timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            ProviderId::Gemini,
            BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
                call_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_and_recovers() {
        tokio::time::pause();
        let cb = breaker(2, Duration::from_millis(1000));

        for _ in 0..2 {
            let _ = cb
                .execute(|| async {
                    Err::<(), _>(GatewayError::Network {
                        provider: ProviderId::Gemini,
                        message: "boom".into(),
                    })
                })
                .await;
        }
        assert_eq!(cb.mode(), CircuitMode::Open);

        let fast_fail = cb.execute(|| async { Ok::<_, GatewayError>(()) }).await;
        assert!(matches!(fast_fail, Err(GatewayError::CircuitOpen { .. })));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cb.mode(), CircuitMode::HalfOpen);

        let trial = cb.execute(|| async { Ok::<_, GatewayError>(42) }).await;
        assert_eq!(trial.unwrap(), 42);
        assert_eq!(cb.mode(), CircuitMode::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        tokio::time::pause();
        let cb = breaker(1, Duration::from_millis(500));
        let _ = cb
            .execute(|| async {
                Err::<(), _>(GatewayError::Network {
                    provider: ProviderId::Gemini,
                    message: "boom".into(),
                })
            })
            .await;
        assert_eq!(cb.mode(), CircuitMode::Open);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(cb.mode(), CircuitMode::HalfOpen);

        let _ = cb
            .execute(|| async {
                Err::<(), _>(GatewayError::Network {
                    provider: ProviderId::Gemini,
                    message: "still broken".into(),
                })
            })
            .await;
        assert_eq!(cb.mode(), CircuitMode::Open);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        tokio::time::pause();
        let cb = CircuitBreaker::new(
            ProviderId::Gemini,
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(30),
                call_timeout: Duration::from_millis(10),
            },
        );
        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, GatewayError>(())
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
        assert_eq!(cb.mode(), CircuitMode::Open);
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        tokio::time::pause();
        let cb = breaker(1, Duration::from_secs(30));
        let _ = cb
            .execute(|| async {
                Err::<(), _>(GatewayError::Network {
                    provider: ProviderId::Gemini,
                    message: "boom".into(),
                })
            })
            .await;
        assert_eq!(cb.mode(), CircuitMode::Open);
        cb.reset();
        assert_eq!(cb.mode(), CircuitMode::Closed);
        assert_eq!(cb.failure_count(), 0);
    }
}
