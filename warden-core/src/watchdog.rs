//! Idle watchdog
//!
//! One timer task per active session. Every inbound frame calls
//! [`ActivityHandle::touch`], which pushes the deadline out by the idle
//! timeout. When the deadline passes the `on_idle` callback runs once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cheap handle for recording inbound activity
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    notify: Arc<Notify>,
    last: Arc<Mutex<DateTime<Utc>>>,
}

impl ActivityHandle {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            last: Arc::new(Mutex::new(Utc::now())),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
        self.notify.notify_one();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-session inactivity timer; cancelled on drop
#[derive(Debug)]
pub struct IdleWatchdog {
    timeout: Duration,
    activity: ActivityHandle,
    cancel: CancellationToken,
}

impl IdleWatchdog {
    /// Start the timer. `on_idle` runs at most once, and never after `cancel`.
    pub fn spawn<F>(timeout: Duration, on_idle: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let activity = ActivityHandle::new();
        let cancel = CancellationToken::new();

        let notify = Arc::clone(&activity.notify);
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut deadline = Instant::now() + timeout;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = notify.notified() => {
                        deadline = Instant::now() + timeout;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        if !token.is_cancelled() {
                            on_idle();
                        }
                        return;
                    }
                }
            }
        });

        Self {
            timeout,
            activity,
            cancel,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn activity(&self) -> ActivityHandle {
        self.activity.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
