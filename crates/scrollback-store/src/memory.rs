use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use scrollback_core::{ConversationKey, ReadPosition};

use super::{ReadPositionStore, StoreError};

/// In-memory read-position store for testing and simulation
///
/// State is wrapped in `Arc<Mutex<>>` so clones share it. Uses
/// `lock().expect()`, which panics if the mutex is poisoned; acceptable for
/// test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<ConversationKey, ReadPosition>>>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with a stored position.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }

    /// Whether nothing is stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("Mutex poisoned").is_empty()
    }
}

impl ReadPositionStore for MemoryStore {
    #[allow(clippy::expect_used)]
    fn load(&self, key: &ConversationKey) -> Result<Option<ReadPosition>, StoreError> {
        Ok(self.inner.lock().expect("Mutex poisoned").get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn save(&self, key: &ConversationKey, position: &ReadPosition) -> Result<(), StoreError> {
        self.inner.lock().expect("Mutex poisoned").insert(key.clone(), position.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, key: &ConversationKey) -> Result<(), StoreError> {
        self.inner.lock().expect("Mutex poisoned").remove(key);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn list(&self) -> Result<Vec<(ConversationKey, ReadPosition)>, StoreError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.iter().map(|(key, position)| (key.clone(), position.clone())).collect())
    }
}
