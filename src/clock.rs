//! Time source used for cool-downs and cache freshness

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Source of "now" and of non-blocking delays
///
/// The rate-limit guard sleeps through it and the query cache reads it to
/// age entries, so tests can swap in a clock that never actually waits.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspends the calling task for `duration` without blocking others
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
///
/// Honours paused time (`tokio::time::pause`), so it also works in tests
/// that advance time manually.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Clock whose sleeps return immediately and only move a virtual offset
    pub struct ManualClock {
        start: Instant,
        offset: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }

        /// Every duration passed to `sleep`, in call order
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }
}
