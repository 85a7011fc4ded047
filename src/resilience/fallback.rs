//! Per-dependency substitute values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

type Producer = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// A registered fallback producer.
#[derive(Clone)]
pub struct Fallback {
    producer: Producer,
    type_name: &'static str,
}

impl Fallback {
    /// Wrap a typed producer.
    pub fn new<T, F>(producer: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(move || Box::new(producer()) as Box<dyn Any + Send>),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Produce a value, or `None` if the producer returns a different type.
    pub fn produce<T: 'static>(&self) -> Option<T> {
        (self.producer)().downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").field("type", &self.type_name).finish()
    }
}

/// Shared fallback registry. Last registration for a name wins.
#[derive(Debug, Default)]
pub struct FallbackRegistry {
    entries: DashMap<String, Fallback>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, F>(&self, name: &str, producer: F)
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_fallback(name, Fallback::new(producer));
    }

    pub fn register_fallback(&self, name: &str, fallback: Fallback) {
        tracing::debug!(dependency = %name, value_type = fallback.type_name(), "Registering fallback");
        self.entries.insert(name.to_string(), fallback);
    }

    pub fn get(&self, name: &str) -> Option<Fallback> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
