//! Open-handle bookkeeping.
//!
//! Handles are opaque to the host (every RPC is path-addressed); the table
//! exists so release can be answered locally and so a handle opened on a
//! path keeps naming that path for its lifetime.

use std::collections::HashMap;

use parking_lot::Mutex;

struct HandleInner {
    next: u64,
    paths: HashMap<u64, String>,
}

/// Maps open file handles to workspace paths. Handles are allocated
/// monotonically from 1 and never reused within a session.
pub struct HandleTable {
    inner: Mutex<HandleInner>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HandleInner {
                next: 1,
                paths: HashMap::new(),
            }),
        }
    }

    pub fn alloc(&self, path: impl Into<String>) -> u64 {
        let mut inner = self.inner.lock();
        let fh = inner.next;
        inner.next += 1;
        inner.paths.insert(fh, path.into());
        fh
    }

    pub fn free(&self, fh: u64) {
        self.inner.lock().paths.remove(&fh);
    }

    pub fn path(&self, fh: u64) -> Option<String> {
        self.inner.lock().paths.get(&fh).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_monotonic_and_never_reused() {
        let table = HandleTable::new();
        let a = table.alloc("/a");
        let b = table.alloc("/b");
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        table.free(a);
        let c = table.alloc("/c");
        assert_eq!(c, 3, "freed ids must not be reused");
    }

    #[test]
    fn path_lives_between_alloc_and_free() {
        let table = HandleTable::new();
        let fh = table.alloc("/src/main.rs");
        assert_eq!(table.path(fh).as_deref(), Some("/src/main.rs"));

        table.free(fh);
        assert_eq!(table.path(fh), None);
        assert!(table.is_empty());
    }
}
