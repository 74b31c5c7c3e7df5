//! Trailing-edge debounce on top of tokio timers.
//!
//! Each `schedule` call restarts the settle window. Only the action from the
//! last call made before the window elapses is run. Actions are synchronous
//! so that once the timer fires they cannot be interrupted halfway; an action
//! that needs to do IO spawns its own task.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Runs `action` after the settle delay unless another call supersedes it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drops the pending action, if any.
    pub fn cancel(&self) {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |text: &str| -> Box<dyn FnOnce() + Send> {
            let sink = Arc::clone(&sink);
            let text = text.to_string();
            Box::new(move || sink.lock().unwrap().push(text))
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_only_last_action() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (log, make) = recorder();

        debouncer.schedule(make("i"));
        sleep(Duration::from_millis(100)).await;
        debouncer.schedule(make("in"));
        sleep(Duration::from_millis(100)).await;
        debouncer.schedule(make("inv"));

        sleep(Duration::from_millis(499)).await;
        assert!(log.lock().unwrap().is_empty());

        sleep(Duration::from_millis(10)).await;
        assert_eq!(*log.lock().unwrap(), vec!["inv".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_each_run() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (log, make) = recorder();

        debouncer.schedule(make("a"));
        sleep(Duration::from_millis(600)).await;
        debouncer.schedule(make("b"));
        sleep(Duration::from_millis(600)).await;

        assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_discard_pending() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let (log, make) = recorder();

        debouncer.schedule(make("cancelled"));
        debouncer.cancel();
        sleep(Duration::from_millis(600)).await;

        debouncer.schedule(make("dropped"));
        drop(debouncer);
        sleep(Duration::from_millis(600)).await;

        assert!(log.lock().unwrap().is_empty());
    }
}
