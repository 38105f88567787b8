//! Delivery dedup over Slack event ids.
//!
//! Fixed-capacity ring: when full, the oldest id falls out. The recent
//! window therefore never empties wholesale, so a retry arriving right
//! after capacity is reached still gets recognized as a duplicate.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

pub struct ProcessedEvents {
    inner: Mutex<Inner>,
}

struct Inner {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ProcessedEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Record an id. Returns true when it was not seen before; the check
    /// and the insert happen under one lock, so two concurrent deliveries
    /// of the same id cannot both win.
    pub fn insert(&self, id: &str) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.seen.contains(id) {
            return false;
        }
        if inner.order.len() == inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.order.len(),
            Err(poisoned) => poisoned.into_inner().order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
