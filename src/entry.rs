//  Copyright 2024 Foyer Project Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! C1: the intrusive entry.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::slot::Slot;

/// The eviction deque's prev/next links. Read and written only while the
/// owning cache's eviction mutex is held; see [`Entry::deque_links`].
pub(crate) struct DequeLinks<K, V, Sl> {
    pub(crate) prev: Option<Arc<Entry<K, V, Sl>>>,
    pub(crate) next: Option<Arc<Entry<K, V, Sl>>>,
    /// Whether this entry currently sits in the eviction deque.
    pub(crate) linked: bool,
}

impl<K, V, Sl> Default for DequeLinks<K, V, Sl> {
    fn default() -> Self {
        Self {
            prev: None,
            next: None,
            linked: false,
        }
    }
}

/// One cache entry. Lives as long as it is reachable from the bucket chain,
/// the eviction deque, or an in-flight [`crate::queue::Command`] — whichever
/// outlives the others.
pub(crate) struct Entry<K, V, Sl> {
    key: K,
    key_hash: u64,
    value: Sl,
    /// Next entry in the same bucket chain. Published with `Release`,
    /// read with `Acquire`, without holding the bucket's stripe lock.
    next_in_bucket: ArcSwapOption<Entry<K, V, Sl>>,
    /// Monotonic: becomes `true` exactly once, when the entry is unlinked
    /// from the table.
    removed: AtomicBool,
    deque_links: UnsafeCell<DequeLinks<K, V, Sl>>,
}

// SAFETY: `deque_links` is only ever touched while the owning cache's
// eviction mutex is held, which provides the necessary synchronization for
// sharing `Entry` across threads despite the `UnsafeCell`.
unsafe impl<K: Send, V, Sl: Send> Send for Entry<K, V, Sl> {}
unsafe impl<K: Send + Sync, V, Sl: Send + Sync> Sync for Entry<K, V, Sl> {}

impl<K, V, Sl> Entry<K, V, Sl>
where
    V: Clone,
    Sl: Slot<V>,
{
    pub(crate) fn new(key: K, key_hash: u64, value: V) -> Arc<Self> {
        Arc::new(Self {
            key,
            key_hash,
            value: Sl::new(value),
            next_in_bucket: ArcSwapOption::const_empty(),
            removed: AtomicBool::new(false),
            deque_links: UnsafeCell::new(DequeLinks::default()),
        })
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn key_hash(&self) -> u64 {
        self.key_hash
    }

    pub(crate) fn value(&self) -> V {
        self.value.load()
    }

    pub(crate) fn store_value(&self, value: V) {
        self.value.store(value);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Marks the entry unlinked from the table. Idempotent-safe to call
    /// only once in practice (the table only unlinks an entry once).
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub(crate) fn next_in_bucket(&self) -> Option<Arc<Entry<K, V, Sl>>> {
        self.next_in_bucket.load_full()
    }

    pub(crate) fn set_next_in_bucket(&self, next: Option<Arc<Entry<K, V, Sl>>>) {
        self.next_in_bucket.store(next);
    }

    /// # Safety
    /// Caller must hold the owning cache's eviction mutex.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn deque_links(&self) -> &mut DequeLinks<K, V, Sl> {
        &mut *self.deque_links.get()
    }
}

impl<K, V, Sl> PartialEq for Entry<K, V, Sl> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
