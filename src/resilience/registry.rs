//! Name → circuit breaker arena.
//!
//! # Design Decisions
//! - Get-or-create is atomic per name (`DashMap::entry`), so concurrent first
//!   use of a name yields a single breaker
//! - The first caller's configuration wins; later configs are ignored
//! - Entries are never evicted; names are expected to be few and static

use std::sync::Arc;

use dashmap::DashMap;

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitSnapshot};

/// Shared registry of breakers keyed by dependency name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the breaker for `name`, building it with `create` on first use.
    pub fn get_or_create<F>(&self, name: &str, create: F) -> Arc<CircuitBreaker>
    where
        F: FnOnce() -> CircuitBreaker,
    {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(dependency = %name, "Creating circuit breaker");
                Arc::new(create())
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot of the named breaker, `None` if the name was never used.
    pub fn snapshot(&self, name: &str) -> Option<CircuitSnapshot> {
        self.get(name).map(|breaker| breaker.snapshot())
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut all: Vec<CircuitSnapshot> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Reset the named breaker. Returns false for unknown names.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
