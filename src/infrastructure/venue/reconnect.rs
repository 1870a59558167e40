use crate::config::VenueConfig;
use crate::domain::errors::EngineError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Exponential backoff parameters for one venue connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: 2.0,
            max_attempts: 5,
        }
    }
}

impl From<&VenueConfig> for ReconnectPolicy {
    fn from(config: &VenueConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.reconnect_initial_ms),
            max_delay: Duration::from_millis(config.reconnect_max_ms),
            backoff: config.reconnect_backoff,
            max_attempts: config.reconnect_max_attempts,
        }
    }
}

/// Mutable backoff state: the delay multiplies on every failure up to the
/// cap, the attempt counter stops the loop, and a successful connection
/// resets both.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current_delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current_delay = policy.initial_delay;
        Self {
            policy,
            current_delay,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay to wait before the next attempt, or `None` once the attempt
    /// budget is spent. Each call advances the schedule.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.current_delay;
        let next = self.current_delay.as_secs_f64() * self.policy.backoff;
        self.current_delay = Duration::from_secs_f64(next).min(self.policy.max_delay);
        Some(delay)
    }

    /// A successful connection restores the initial schedule.
    pub fn reset(&mut self) {
        self.current_delay = self.policy.initial_delay;
        self.attempts = 0;
    }

    /// Sleeps through one backoff delay, returning early with
    /// `ShutdownRequested` the moment the shutdown flag flips. `Ok(false)`
    /// means the attempt budget is exhausted.
    pub async fn wait(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, EngineError> {
        let Some(delay) = self.next_delay() else {
            return Ok(false);
        };
        debug!(
            "Backoff: waiting {:?} before attempt {}",
            delay, self.attempts
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(true),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    Err(EngineError::ShutdownRequested)
                } else {
                    Ok(true)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: 2.0,
            max_attempts: 5,
        }
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let mut backoff = Backoff::new(policy());
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            max_attempts: 100,
            ..policy()
        });
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            last = backoff.next_delay().unwrap();
        }
        assert_eq!(last, Duration::from_secs(30));
    }

    #[test]
    fn test_success_resets_schedule() {
        let mut backoff = Backoff::new(policy());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_attempt_budget_exhausts() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            max_attempts: 2,
            ..policy()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let mut backoff = Backoff::new(ReconnectPolicy {
            initial_delay: Duration::from_secs(3600),
            ..policy()
        });

        let waiter = tokio::spawn(async move { backoff.wait(&mut rx).await });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(EngineError::ShutdownRequested)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_completes_after_delay() {
        let (_tx, mut rx) = watch::channel(false);
        let mut backoff = Backoff::new(policy());
        // Paused clock auto-advances when the runtime idles
        let waited = backoff.wait(&mut rx).await.unwrap();
        assert!(waited);
    }
}
