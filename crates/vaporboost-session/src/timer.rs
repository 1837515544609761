//! Online-time accounting that survives pause/resume cycles exactly.

use std::time::Duration;

use tokio::time::Instant;

/// Accumulates time spent online.
///
/// Completed intervals are folded into `accumulated`; only the current
/// interval is measured from a start instant.
#[derive(Debug, Clone, Default)]
pub struct OnlineTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl OnlineTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: None,
        }
    }

    /// Start or resume counting. No-op if already running.
    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Stop counting, keeping what has accumulated.
    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Fold the running interval into the accumulated total.
    pub fn checkpoint(&mut self) {
        if let Some(since) = self.running_since {
            let now = Instant::now();
            self.accumulated += now.saturating_duration_since(since);
            self.running_since = Some(now);
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Total online time, including the running interval.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_is_exact() {
        let mut timer = OnlineTimer::new();
        timer.resume();
        tokio::time::advance(Duration::from_secs(90)).await;
        timer.pause();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(timer.elapsed(), Duration::from_secs(90));

        timer.resume();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(timer.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_keeps_total() {
        let mut timer = OnlineTimer::new();
        timer.resume();
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(1_500)).await;
            timer.checkpoint();
        }
        assert_eq!(timer.elapsed(), Duration::from_secs(15));
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_twice_does_not_restart() {
        let mut timer = OnlineTimer::new();
        timer.resume();
        tokio::time::advance(Duration::from_secs(5)).await;
        timer.resume();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(timer.elapsed(), Duration::from_secs(10));
    }
}
