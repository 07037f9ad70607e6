use std::time::Duration;

/// Reconnect delay growing linearly with the number of consecutive failures.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    cap: Duration,
    attempts: u32,
}

impl LinearBackoff {
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempts: 0,
        }
    }

    /// Delay used by the bridge between Discord login attempts.
    #[must_use]
    pub const fn bridge() -> Self {
        Self::new(Duration::from_millis(5000), Duration::from_millis(60_000))
    }

    /// Delay used by the page agent between WebSocket connection attempts.
    #[must_use]
    pub const fn agent() -> Self {
        Self::new(Duration::from_millis(5000), Duration::from_millis(30_000))
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.base.saturating_mul(self.attempts).min(self.cap)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays(mut backoff: LinearBackoff, n: usize) -> Vec<u128> {
        (0..n).map(|_| backoff.next_delay().as_millis()).collect()
    }

    #[test]
    fn bridge_sequence() {
        assert_eq!(
            delays(LinearBackoff::bridge(), 14),
            vec![
                5000, 10000, 15000, 20000, 25000, 30000, 35000, 40000, 45000, 50000, 55000, 60000,
                60000, 60000
            ]
        );
    }

    #[test]
    fn agent_sequence() {
        assert_eq!(
            delays(LinearBackoff::agent(), 8),
            vec![5000, 10000, 15000, 20000, 25000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = LinearBackoff::bridge();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }
}
