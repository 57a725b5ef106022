//! Idle session monitor.
//!
//! ```text
//! Active --(warn_after idle)--> Warned --(expire_after idle)--> Expired
//!    ^                            |
//!    +-------- activity ----------+
//! ```
//!
//! `Expired` is terminal until [`SessionMonitor::reset`]. Entering it runs
//! the [`ExpiryHandler`] exactly once and then broadcasts
//! [`SessionEvent::Expired`]. Idle time is measured with
//! [`tokio::time::Instant`], so paused-clock tests can drive it with
//! `tokio::time::advance`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::Result;
use crate::scheduler::{TaskId, TimerScheduler};

pub const DEFAULT_WARN_AFTER: Duration = Duration::from_secs(25 * 60);
pub const DEFAULT_EXPIRE_AFTER: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

const EVENT_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Idle thresholds and the check period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub warn_after: Duration,
    pub expire_after: Duration,
    pub tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warn_after: DEFAULT_WARN_AFTER,
            expire_after: DEFAULT_EXPIRE_AFTER,
            tick: DEFAULT_TICK,
        }
    }
}

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Pointer,
    Key,
    Scroll,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Warned,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session will expire after `remaining` more idle time.
    Warning { remaining: Duration },
    /// Sensitive data has been wiped. The UI should reload and call
    /// [`SessionMonitor::reset`].
    Expired,
    /// Activity arrived after a warning.
    Resumed,
}

/// Work to run once when the session expires.
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
    async fn on_expire(&self);
}

struct ActivityState {
    last_activity: Instant,
    warned: bool,
    expired: bool,
}

impl ActivityState {
    fn fresh() -> Self {
        Self {
            last_activity: Instant::now(),
            warned: false,
            expired: false,
        }
    }

    fn state(&self) -> SessionState {
        if self.expired {
            SessionState::Expired
        } else if self.warned {
            SessionState::Warned
        } else {
            SessionState::Active
        }
    }
}

/// What a tick decided while holding the state lock.
enum TickAction {
    None,
    Warn(Duration),
    Expire,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct SessionMonitor {
    config: SessionConfig,
    handler: Arc<dyn ExpiryHandler>,
    state: Mutex<ActivityState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionMonitor {
    pub fn new(config: SessionConfig, handler: Arc<dyn ExpiryHandler>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            handler,
            state: Mutex::new(ActivityState::fresh()),
            events,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    /// Idle time since the last recorded activity.
    pub fn idle(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Record a user interaction. Ignored (returns `false`) once expired.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        let resumed = {
            let mut state = self.lock();
            if state.expired {
                tracing::debug!(?kind, "activity ignored on expired session");
                return false;
            }
            state.last_activity = Instant::now();
            std::mem::replace(&mut state.warned, false)
        };

        if resumed {
            tracing::info!(?kind, "session resumed after idle warning");
            self.emit(SessionEvent::Resumed);
        }
        true
    }

    /// Evaluate idle time against the thresholds.
    ///
    /// Called by the scheduler every `tick`; safe to call directly.
    pub async fn tick(&self) -> SessionState {
        let action = {
            let mut state = self.lock();
            if state.expired {
                return SessionState::Expired;
            }
            let idle = state.last_activity.elapsed();
            if idle >= self.config.expire_after {
                state.expired = true;
                TickAction::Expire
            } else if idle >= self.config.warn_after && !state.warned {
                state.warned = true;
                TickAction::Warn(self.config.expire_after - idle)
            } else {
                TickAction::None
            }
        };

        match action {
            TickAction::None => {}
            TickAction::Warn(remaining) => {
                tracing::warn!(remaining_secs = remaining.as_secs(), "session idle, expiring soon");
                self.emit(SessionEvent::Warning { remaining });
            }
            TickAction::Expire => {
                tracing::warn!(
                    idle_secs = self.config.expire_after.as_secs(),
                    "session expired, wiping sensitive data"
                );
                self.handler.on_expire().await;
                self.emit(SessionEvent::Expired);
            }
        }

        self.state()
    }

    /// Start a fresh session: clears the expired flag and the warning.
    pub fn reset(&self) {
        *self.lock() = ActivityState::fresh();
        tracing::info!("session reset");
    }

    /// Run [`tick`](Self::tick) on `scheduler` every `config.tick`.
    pub fn start(self: &Arc<Self>, scheduler: &TimerScheduler) -> Result<TaskId> {
        let monitor = Arc::clone(self);
        scheduler.schedule_repeating("session-monitor", self.config.tick, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.tick().await;
            }
        })
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
