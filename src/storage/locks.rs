// src/storage/locks.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::entity::Entity;

pub type EntityLock = Arc<tokio::sync::Mutex<()>>;

/// One async mutex per entity, created on first request and kept for the
/// registry's lifetime. Archive and cleanup work for an entity runs while
/// holding its lock.
#[derive(Debug, Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<Entity, EntityLock>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `entity`, inserting it if absent. Lookup and insert
    /// happen under one map guard, so concurrent first callers share a lock.
    pub fn acquire(&self, entity: &Entity) -> EntityLock {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(entity.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
