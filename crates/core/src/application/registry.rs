// Handler registry - (queue, job_type) -> factory

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::port::handler::HandlerFactory;

/// Read-mostly mapping from queue name to per-type handler factories.
///
/// Lookups happen on every dispatch and hold the read lock only long enough
/// to clone the factory `Arc`. Registration replaces on duplicate and is
/// permitted after the engine is running; subsequent dispatches observe it.
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<HashMap<String, HashMap<String, Arc<HandlerFactory>>>>,
}

impl HandlerRegistry {
    pub fn register(&self, queue: &str, job_type: &str, factory: HandlerFactory) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(queue.to_string())
            .or_default()
            .insert(job_type.to_string(), Arc::new(factory));
    }

    pub fn lookup(&self, queue: &str, job_type: &str) -> Option<Arc<HandlerFactory>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(queue)?.get(job_type).cloned()
    }

    /// Registered job type names per queue.
    pub fn job_types(&self) -> HashMap<String, Vec<String>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .map(|(queue, types)| (queue.clone(), types.keys().cloned().collect()))
            .collect()
    }
}
