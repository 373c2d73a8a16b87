use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default quiet period before a text edit is submitted.
pub const EDIT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Default quiet period before a search query is applied.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

/// Default cooldown after a complete/reopen/delete action.
pub const ACTION_THROTTLE: Duration = Duration::from_millis(800);

/// Runs only the last of a burst of calls, once `delay` has passed with no
/// newer call.
///
/// Every call takes a ticket from a shared generation counter; a waiting call
/// runs only if its ticket is still the newest when its timer fires. Work
/// that has already started is never interrupted.
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedule `task`, superseding any call still waiting out its delay.
    /// The handle resolves to whether `task` actually ran.
    pub fn call<F>(&self, task: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != ticket {
                return false;
            }
            task.await;
            true
        })
    }

    /// Drop whatever call is waiting.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs the first call immediately and ignores the rest until `window` has
/// elapsed.
pub struct Throttle {
    window: Duration,
    open_at: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            open_at: Mutex::new(None),
        }
    }

    /// Claim the slot if the previous window has closed.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut open_at = self.open_at.lock().unwrap_or_else(PoisonError::into_inner);
        match *open_at {
            Some(at) if now < at => false,
            _ => {
                *open_at = Some(now + self.window);
                true
            }
        }
    }

    /// Spawn `task` if the slot is free; otherwise drop it.
    pub fn call<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.try_acquire() {
            Some(tokio::spawn(task))
        } else {
            log::debug!("Throttled action dropped");
            None
        }
    }

    /// Reopen the slot immediately.
    pub fn reset(&self) {
        *self.open_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let record = move |value: u32| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(value);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (seen, record)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_keeps_only_the_last_call() {
        let debouncer = Debouncer::new(EDIT_DEBOUNCE);
        let (seen, record) = recorder();

        let mut handles = Vec::new();
        for value in 1..=5 {
            handles.push(debouncer.call(record(value)));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let ran: Vec<bool> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(ran, vec![false, false, false, false, true]);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_the_quiet_period() {
        let debouncer = Debouncer::new(EDIT_DEBOUNCE);
        let (seen, record) = recorder();

        let _pending = debouncer.call(record(1));
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_each_run_once() {
        let debouncer = Debouncer::new(EDIT_DEBOUNCE);
        let (seen, record) = recorder();

        debouncer.call(record(1));
        debouncer.call(record(2));
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.call(record(3));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_discard_pending_calls() {
        let (seen, record) = recorder();

        let debouncer = Debouncer::new(EDIT_DEBOUNCE);
        let handle = debouncer.call(record(1));
        debouncer.cancel();
        assert!(!handle.await.unwrap());

        let debouncer = Debouncer::new(EDIT_DEBOUNCE);
        let handle = debouncer.call(record(2));
        drop(debouncer);
        assert!(!handle.await.unwrap());

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_runs_first_call_of_window() {
        let throttle = Throttle::new(ACTION_THROTTLE);
        let runs = Arc::new(AtomicUsize::new(0));

        let mut spawned = Vec::new();
        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            if let Some(h) = throttle.call(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }) {
                spawned.push(h);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(spawned.len(), 1);
        for h in spawned {
            h.await.unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_reopens_after_window() {
        let throttle = Throttle::new(ACTION_THROTTLE);
        assert!(throttle.try_acquire());
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!throttle.try_acquire());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(throttle.try_acquire());

        throttle.reset();
        assert!(throttle.try_acquire());
    }
}
