//! Debounced resync timer
//!
//! A cancellable delayed task. Arming while a previous arm is still pending
//! replaces it, so a burst of gap signals collapses into one resync.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Re-armable, cancellable delayed task
#[derive(Debug)]
pub struct ResyncTimer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ResyncTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Arm the timer, aborting any pending arm. `on_fire` runs after the delay.
    ///
    /// Returns true if a pending arm was replaced.
    pub fn arm<F>(&self, on_fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            on_fire.await;
        });

        match self.pending.lock().replace(handle) {
            Some(previous) => {
                let was_pending = !previous.is_finished();
                previous.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Cancel a pending arm. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether an arm is waiting to fire (or is firing)
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ResyncTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let timer = ResyncTimer::new(Duration::from_secs(2));

        let counter = fired.clone();
        timer.arm(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_pending());

        sleep(Duration::from_millis(1900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_collapses_into_single_fire() {
        let fired = Arc::new(AtomicU32::new(0));
        let timer = ResyncTimer::new(Duration::from_secs(2));

        for _ in 0..5 {
            let counter = fired.clone();
            timer.arm(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(500)).await;
        }

        sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicU32::new(0));
        let timer = ResyncTimer::new(Duration::from_secs(1));

        let counter = fired.clone();
        timer.arm(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
