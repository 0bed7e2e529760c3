//! User activity tracking and the inactivity timeout.
//!
//! The UI layer publishes interaction events on an [`ActivityFeed`]. Each
//! inactivity timer registers one listener on the feed and removes it when
//! it fires or is cancelled.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::handle::TimerHandle;

/// Default quiet period before a session is signed out.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    PointerDown,
    KeyPress,
    Scroll,
    TouchStart,
}

impl ActivityEvent {
    pub const ALL: [ActivityEvent; 4] = [
        ActivityEvent::PointerDown,
        ActivityEvent::KeyPress,
        ActivityEvent::Scroll,
        ActivityEvent::TouchStart,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointerDown => "pointer_down",
            Self::KeyPress => "key_press",
            Self::Scroll => "scroll",
            Self::TouchStart => "touch_start",
        }
    }
}

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an event name outside the tracked set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActivityEvent(pub String);

impl fmt::Display for UnknownActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown activity event '{}'", self.0)
    }
}

impl std::error::Error for UnknownActivityEvent {}

impl FromStr for ActivityEvent {
    type Err = UnknownActivityEvent;

    /// Accepts both snake_case names and DOM event names (`keydown`, `touchstart`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pointer_down" | "pointerdown" | "mousedown" => Ok(Self::PointerDown),
            "key_press" | "keypress" | "keydown" => Ok(Self::KeyPress),
            "scroll" => Ok(Self::Scroll),
            "touch_start" | "touchstart" => Ok(Self::TouchStart),
            _ => Err(UnknownActivityEvent(s.to_string())),
        }
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<ActivityEvent>>,
}

/// Fan-out of user-activity events to the timers listening for them.
#[derive(Clone, Default)]
pub struct ActivityFeed {
    listeners: Arc<Mutex<Listeners>>,
}

impl ActivityFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes an interaction to every listener.
    pub fn record(&self, event: ActivityEvent) {
        self.lock()
            .senders
            .retain(|_, sender| sender.send(event).is_ok());
    }

    /// Registers a listener. It is removed when dropped.
    #[must_use]
    pub fn listen(&self) -> ActivityListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.senders.insert(id, tx);

        ActivityListener {
            id,
            events: rx,
            feed: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().senders.len()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ActivityFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityFeed")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// One registration on an [`ActivityFeed`].
pub struct ActivityListener {
    id: u64,
    events: mpsc::UnboundedReceiver<ActivityEvent>,
    feed: Weak<Mutex<Listeners>>,
}

impl ActivityListener {
    /// Waits for the next event. `None` once the listener is removed.
    pub async fn recv(&mut self) -> Option<ActivityEvent> {
        self.events.recv().await
    }

    fn remover(&self) -> impl FnOnce() + Send + 'static {
        let id = self.id;
        let feed = self.feed.clone();
        move || remove_listener(&feed, id)
    }
}

impl Drop for ActivityListener {
    fn drop(&mut self) {
        remove_listener(&self.feed, self.id);
    }
}

fn remove_listener(feed: &Weak<Mutex<Listeners>>, id: u64) {
    if let Some(listeners) = feed.upgrade() {
        listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .remove(&id);
    }
}

/// Arms an inactivity timer on `feed`.
///
/// The timer tracks the time of the last recorded event. When `timeout` has
/// elapsed since then, the listener is removed and `on_timeout` runs once.
/// Cancelling the returned handle removes the listener immediately.
pub fn schedule_inactivity_timeout<F, Fut>(
    feed: &ActivityFeed,
    timeout: Duration,
    on_timeout: F,
) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = TimerHandle::new();
    let mut listener = feed.listen();
    handle.on_cancel(listener.remover());
    let timer = handle.clone();

    let task = tokio::spawn(async move {
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                () = sleep_until(last_activity + timeout) => {
                    if timer.is_cancelled() {
                        return;
                    }
                    if last_activity.elapsed() >= timeout {
                        break;
                    }
                }
                Some(event) = listener.recv() => {
                    debug!(%event, "activity recorded");
                    last_activity = Instant::now();
                }
            }
        }

        drop(listener);
        if timer.is_cancelled() {
            return;
        }
        info!(timeout_secs = timeout.as_secs(), "inactivity timeout reached");
        on_timeout().await;
    });

    handle.attach(task.abort_handle());
    handle
}
