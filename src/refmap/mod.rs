//! Reference map — shared counters keyed by table file name.
//!
//! An alternative table-deletion strategy to the counter embedded in
//! [`Table`](crate::table::Table): callers account references here by
//! stable identifier (typically the file name) and reap zero-count
//! entries in one sweep, performing the physical deletion in the
//! callback. The engine's primary strategy is the embedded counter;
//! this map is provided for deployments that track table lifetimes
//! outside the reader, and the two must not be mixed for the same
//! table.


use std::collections::HashMap;
use std::sync::RwLock;

/// String-keyed signed reference counters behind a read/write lock.
#[derive(Default)]
pub struct RefMap {
    inner: RwLock<HashMap<String, i32>>,
}

impl RefMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `delta` to every key in `keys`, atomically over the whole
    /// set. Missing keys start from zero.
    pub fn incr<S: AsRef<str>>(&self, delta: i32, keys: impl IntoIterator<Item = S>) {
        let mut map = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in keys {
            *map.entry(key.as_ref().to_string()).or_insert(0) += delta;
        }
    }

    /// Current counter for `key`, if tracked.
    pub fn get(&self, key: &str) -> Option<i32> {
        let map = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(key).copied()
    }

    /// Remove every entry whose counter is exactly zero, invoking `reap`
    /// once per removed key. The exclusive lock is held across the whole
    /// sweep, so the callback must be side-effect-safe under it (it
    /// typically unlinks the named file).
    pub fn drain_zero(&self, mut reap: impl FnMut(&str)) {
        let mut map = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.retain(|key, count| {
            if *count == 0 {
                reap(key);
                false
            } else {
                true
            }
        });
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        let map = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
