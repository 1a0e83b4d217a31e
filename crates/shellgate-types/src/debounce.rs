//! Trailing-edge debounce timer
//!
//! Coalesces a burst of values into the most recent one, released after the
//! configured quiet period. Meant to be polled from a `tokio::select!` loop:
//! `fired()` is cancel-safe, so dropping it in favour of another branch never
//! loses the pending value.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending value and restart the quiet period
    pub fn schedule(&mut self, value: T) {
        self.pending = Some((value, Instant::now() + self.delay));
    }

    /// Drop the pending value without releasing it
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    /// Resolve with the pending value once its quiet period has elapsed.
    /// Never resolves while nothing is scheduled.
    pub async fn fired(&mut self) -> T {
        let deadline = match &self.pending {
            Some((_, deadline)) => *deadline,
            None => return pending::<T>().await,
        };
        sleep_until(deadline).await;
        match self.pending.take() {
            Some((value, _)) => value,
            None => pending::<T>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(140));
        for n in 0..10 {
            debouncer.schedule(n);
            advance(Duration::from_millis(10)).await;
        }
        let start = Instant::now();
        assert_eq!(debouncer.fired().await, 9);
        // Fires 140ms after the last schedule, which was 10ms ago
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(130) && waited < Duration::from_millis(140));
        assert!(!debouncer.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_scheduled_never_fires() {
        let mut debouncer: Debouncer<u8> = Debouncer::new(Duration::from_millis(5));
        assert!(timeout(Duration::from_secs(60), debouncer.fired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.schedule("snapshot");
        assert_eq!(debouncer.pending(), Some(&"snapshot"));
        assert_eq!(debouncer.cancel(), Some("snapshot"));
        assert!(timeout(Duration::from_secs(5), debouncer.fired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_poll_keeps_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule(1);
        assert!(timeout(Duration::from_millis(50), debouncer.fired()).await.is_err());
        assert!(debouncer.is_scheduled());
        assert_eq!(debouncer.fired().await, 1);
    }
}
