//! Lookup-or-load cache for auxiliary models, keyed by device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SynthesisError;

pub struct ModelCache<T: ?Sized> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Default for ModelCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> ModelCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model cached for `device`, calling `load` on a miss.
    /// A failed load is not cached. The lock is not held while `load` runs, so
    /// two racing misses for one device may both load; the first insert wins.
    pub fn get_or_load<F>(&self, device: &str, load: F) -> Result<Arc<T>, SynthesisError>
    where
        F: FnOnce(&str) -> Result<Arc<T>, SynthesisError>,
    {
        if let Some(model) = self.lock().get(device) {
            return Ok(Arc::clone(model));
        }
        let model = load(device)?;
        let cached = Arc::clone(
            self.lock()
                .entry(device.to_string())
                .or_insert_with(|| Arc::clone(&model)),
        );
        if Arc::ptr_eq(&cached, &model) {
            tracing::info!(device, "auxiliary model loaded");
        }
        Ok(cached)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, device: &str) -> bool {
        self.lock().contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
