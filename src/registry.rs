//! Registered function lookup.
//!
//! Function discovery and registration belong to the host; the health engine
//! only needs to know how many functions are being served.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Read access to the host's function registry.
pub trait FunctionRegistry: Send + Sync {
    /// IDs of every registered function.
    fn function_ids(&self) -> Vec<String>;

    fn function_count(&self) -> usize {
        self.function_ids().len()
    }
}

/// A registered function.
#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    pub id: String,
    pub registered_at: DateTime<Utc>,
}

/// Thread-safe in-memory registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFunctionRegistry {
    inner: Arc<DashMap<String, RegisteredFunction>>,
}

impl InMemoryFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding `ids`.
    pub fn with_functions<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for id in ids {
            registry.register(id);
        }
        registry
    }

    /// Register a function. Returns false if the id was already present.
    pub fn register(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.inner.contains_key(&id) {
            return false;
        }
        tracing::debug!(function_id = %id, "Function registered");
        self.inner.insert(
            id.clone(),
            RegisteredFunction {
                id,
                registered_at: Utc::now(),
            },
        );
        true
    }

    pub fn unregister(&self, id: &str) -> Option<RegisteredFunction> {
        self.inner.remove(id).map(|(_, function)| function)
    }

    pub fn get(&self, id: &str) -> Option<RegisteredFunction> {
        self.inner.get(id).map(|entry| entry.value().clone())
    }
}

impl FunctionRegistry for InMemoryFunctionRegistry {
    fn function_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    fn function_count(&self) -> usize {
        self.inner.len()
    }
}
