//! Structured error reporting.
//!
//! # Responsibilities
//! - Keep the most recent notifications in a bounded FIFO (oldest evicted)
//! - Broadcast each notification to live subscribers at emission time
//! - Hand out filtered copies of the buffer for observability consumers
//!
//! # Design Decisions
//! - Subscribers never see history, only events logged after they subscribe
//! - Listeners are called after the buffer lock is released, so a listener
//!   may log again without deadlocking
//! - A panicking listener is contained and logged; the remaining listeners
//!   still run and `log` returns normally

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default number of notifications retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Level::Info),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

/// A single notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: Uuid,
    pub level: Level,
    pub message: String,
    /// Rendered error chain of the cause, outermost first.
    pub cause: Option<String>,
    pub context: Map<String, Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl ErrorEvent {
    fn new(
        level: Level,
        message: String,
        cause: Option<&(dyn std::error::Error + 'static)>,
        context: Map<String, Value>,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            id: Uuid::new_v4(),
            level,
            message,
            cause: cause.map(render_chain),
            context,
            timestamp_ms,
        }
    }

    /// String value of a context entry, if present.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

fn render_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}

type Listener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Listener)>>,
}

/// Handle returned by [`ErrorReporter::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to revoke it.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Revoke the listener. No-op if the reporter is gone.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Bounded notification buffer with subscribers.
pub struct ErrorReporter {
    capacity: usize,
    buffer: Mutex<VecDeque<ErrorEvent>>,
    listeners: Arc<Listeners>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Reporter retaining at most `capacity` notifications (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            listeners: Arc::new(Listeners {
                next_id: AtomicU64::new(0),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<ErrorEvent>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a notification and broadcast it.
    pub fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        cause: Option<&(dyn std::error::Error + 'static)>,
        context: Map<String, Value>,
    ) -> ErrorEvent {
        let event = ErrorEvent::new(level, message.into(), cause, context);

        {
            let mut buffer = self.buffer();
            while buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        self.notify(&event);
        event
    }

    pub fn info(&self, message: impl Into<String>, context: Map<String, Value>) -> ErrorEvent {
        self.log(Level::Info, message, None, context)
    }

    pub fn warning(&self, message: impl Into<String>, context: Map<String, Value>) -> ErrorEvent {
        self.log(Level::Warning, message, None, context)
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        cause: Option<&(dyn std::error::Error + 'static)>,
        context: Map<String, Value>,
    ) -> ErrorEvent {
        self.log(Level::Error, message, cause, context)
    }

    pub fn critical(
        &self,
        message: impl Into<String>,
        cause: Option<&(dyn std::error::Error + 'static)>,
        context: Map<String, Value>,
    ) -> ErrorEvent {
        self.log(Level::Critical, message, cause, context)
    }

    fn notify(&self, event: &ErrorEvent) {
        let snapshot: Vec<(u64, Listener)> = self
            .listeners
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(subscriber = id, event_id = %event.id, "Notification subscriber panicked");
            }
        }
    }

    /// Register a listener for future notifications.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copy of the stored notifications, oldest first, optionally filtered
    /// to one level.
    pub fn notifications(&self, level: Option<Level>) -> Vec<ErrorEvent> {
        self.buffer()
            .iter()
            .filter(|event| level.map_or(true, |wanted| event.level == wanted))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// Empty the buffer. Subscribers stay registered.
    pub fn clear(&self) {
        self.buffer().clear();
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("capacity", &self.capacity)
            .field("stored", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Build a context map from key/value pairs.
pub fn context<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
