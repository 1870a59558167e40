use rand::Rng;
use std::time::Duration;

/// Network latency model for simulated order routing.
pub trait LatencyModel: Send + Sync {
    /// Duration to wait before a fill confirmation comes back.
    fn next_latency(&self) -> Duration;
}

/// Base latency with random jitter, standing in for network round trip plus
/// venue processing time.
#[derive(Debug, Clone)]
pub struct NetworkLatency {
    base_ms: u64,
    jitter_ms: u64,
}

impl NetworkLatency {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }
}

impl LatencyModel for NetworkLatency {
    fn next_latency(&self) -> Duration {
        let mut rng = rand::rng();
        let jitter = rng.random_range(-(self.jitter_ms as i64)..=(self.jitter_ms as i64));
        let ms = (self.base_ms as i64 + jitter).max(0) as u64;
        Duration::from_millis(ms)
    }
}

/// Instant confirmation, for tests and pure logic verification.
pub struct ZeroLatency;

impl LatencyModel for ZeroLatency {
    fn next_latency(&self) -> Duration {
        Duration::from_millis(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_latency_stays_in_range() {
        let model = NetworkLatency::new(50, 10);
        for _ in 0..100 {
            let latency = model.next_latency().as_millis() as u64;
            assert!(
                (40..=60).contains(&latency),
                "latency {latency} out of bounds [40, 60]"
            );
        }
    }

    #[test]
    fn test_zero_latency() {
        assert_eq!(ZeroLatency.next_latency(), Duration::ZERO);
    }
}
