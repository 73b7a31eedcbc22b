// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Shared listener registry with set semantics and snapshot iteration.

use std::sync::{Arc, Mutex};

/// A thread-safe set of listeners, keyed by `Arc` identity.
///
/// Iteration happens over a snapshot, so callbacks are free to add or remove
/// listeners without deadlocking, and registration changes never mutate a
/// set that is being iterated.
pub struct ListenerSet<L: ?Sized> {
    inner: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Returns false (and does nothing) if the same
    /// listener is already registered.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut inner = self.inner.lock().expect("listener set poisoned");
        if inner.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        inner.push(listener);
        true
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut inner = self.inner.lock().expect("listener set poisoned");
        let before = inner.len();
        inner.retain(|l| !Arc::ptr_eq(l, listener));
        inner.len() != before
    }

    /// Returns the currently-registered listeners.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.inner.lock().expect("listener set poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("listener set poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
