//! Rate limiting for outbound editor notifications.
//!
//! [`Throttle`] fires the first value immediately, then at most once per
//! interval. Values offered inside the interval replace each other and the
//! latest one fires when the interval ends (trailing edge), so the far end
//! always converges on the final text.
//!
//! [`ThrottledSender`] drives a `Throttle` from a background task. Offering a
//! value never blocks; the sink runs on the task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Leading- and trailing-edge throttle over values of type `T`.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: None,
        }
    }

    /// Offer a value at `now`. Returns it back if it should fire right away;
    /// otherwise it is held as the pending trailing value.
    pub fn offer(&mut self, now: Instant, value: T) -> Option<T> {
        let open = self
            .last_fired
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if open {
            self.last_fired = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// When the pending value becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        match (&self.pending, self.last_fired) {
            (Some(_), Some(last)) => Some(last + self.interval),
            _ => None,
        }
    }

    /// Take the pending value if its deadline has passed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        let due = self.deadline().is_some_and(|deadline| now >= deadline);
        if !due {
            return None;
        }
        self.last_fired = Some(now);
        self.pending.take()
    }

    /// Returns `true` while a trailing value is held.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Handle to a background task that throttles values into a sink.
///
/// Dropping the handle (or calling [`stop`](Self::stop)) discards any pending
/// trailing value.
#[derive(Debug)]
pub struct ThrottledSender<T> {
    tx: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> ThrottledSender<T> {
    /// Spawn the throttle task. `sink` is called with every value that fires.
    pub fn spawn<F>(interval: Duration, sink: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(throttle_loop(Throttle::new(interval), rx, sink));
        Self { tx, task }
    }

    /// Offer a value without blocking.
    pub fn offer(&self, value: T) {
        if self.tx.send(value).is_err() {
            debug!("throttle task stopped; value discarded");
        }
    }

    /// Stop the task, discarding any pending value.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<T> Drop for ThrottledSender<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn throttle_loop<T, F>(mut throttle: Throttle<T>, mut rx: mpsc::UnboundedReceiver<T>, mut sink: F)
where
    F: FnMut(T),
{
    loop {
        // Evaluated even when the branch is disabled, so it must not panic.
        let deadline = throttle.deadline().unwrap_or_else(Instant::now);
        tokio::select! {
            value = rx.recv() => match value {
                Some(value) => {
                    if let Some(value) = throttle.offer(Instant::now(), value) {
                        sink(value);
                    }
                }
                None => break,
            },
            () = tokio::time::sleep_until(deadline), if throttle.has_pending() => {
                if let Some(value) = throttle.take_due(Instant::now()) {
                    sink(value);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const INTERVAL: Duration = Duration::from_millis(300);

    #[test]
    fn first_value_fires_immediately() {
        let now = Instant::now();
        let mut throttle = Throttle::new(INTERVAL);
        assert_eq!(throttle.offer(now, 1), Some(1));
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn values_inside_interval_coalesce_to_latest() {
        let start = Instant::now();
        let mut throttle = Throttle::new(INTERVAL);
        throttle.offer(start, "a");
        assert_eq!(throttle.offer(start + Duration::from_millis(10), "b"), None);
        assert_eq!(throttle.offer(start + Duration::from_millis(20), "c"), None);
        assert_eq!(throttle.deadline(), Some(start + INTERVAL));

        assert_eq!(throttle.take_due(start + Duration::from_millis(299)), None);
        assert_eq!(throttle.take_due(start + INTERVAL), Some("c"));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn value_after_interval_fires_and_clears_pending() {
        let start = Instant::now();
        let mut throttle = Throttle::new(INTERVAL);
        throttle.offer(start, 1);
        throttle.offer(start + Duration::from_millis(5), 2);
        assert_eq!(throttle.offer(start + INTERVAL, 3), Some(3));
        assert!(!throttle.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn task_sends_leading_and_trailing_values() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let sender = ThrottledSender::spawn(INTERVAL, move |v: u32| sink.lock().unwrap().push(v));

        for v in 1..=5 {
            sender.offer(v);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*sent.lock().unwrap(), vec![1]);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(*sent.lock().unwrap(), vec![1, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_pending_value() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let sender = ThrottledSender::spawn(INTERVAL, move |v: u32| sink.lock().unwrap().push(v));

        sender.offer(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        sender.offer(2);
        tokio::time::sleep(Duration::from_millis(1)).await;
        sender.stop();

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(*sent.lock().unwrap(), vec![1]);
    }
}
