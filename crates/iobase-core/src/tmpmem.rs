//! Temporary-memory registry
//!
//! A [`TmpMem`] holds type-erased shared ownership of whatever backs a
//! set of byte views. Entries are append-only: nothing is released until
//! the registry itself (and every clone of it) is dropped.

use std::any::Any;
use std::sync::Arc;

type Held = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct TmpMem {
    held: Vec<Held>,
}

impl TmpMem {
    pub const fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Share ownership of an existing handle.
    pub fn memorize<T>(&mut self, handle: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.held.push(handle);
    }

    /// Take ownership of `value`; its `Drop` runs when the last clone of
    /// this registry goes away.
    pub fn memorize_value<T>(&mut self, value: T) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        let handle = Arc::new(value);
        self.held.push(handle.clone());
        handle
    }

    /// Take ownership of a heap buffer.
    pub fn memorize_vec(&mut self, bytes: Vec<u8>) -> Arc<Vec<u8>> {
        self.memorize_value(bytes)
    }

    /// Share everything `other` holds.
    pub fn merge(&mut self, other: &TmpMem) {
        self.held.extend(other.held.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl std::fmt::Debug for TmpMem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmpMem").field("held", &self.held.len()).finish()
    }
}
