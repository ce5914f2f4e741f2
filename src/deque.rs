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

//! C4: the eviction deque and the LRU/LFU policies.
//!
//! Entirely owned by the cache's eviction mutex: every method here assumes
//! exclusive access and is marked `unsafe` to flag that precondition,
//! mirroring the `unsafe fn push/pop/access/remove` contract
//! `foyer-memory`'s `Eviction` trait uses for the same reason.

use std::sync::Arc;

use crate::entry::Entry;

/// Which eviction policy an [`EvictionDeque`] enforces. Fixed at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Evict the least-recently-used entry.
    Lru,
    /// Evict the least-frequently-used entry, approximated by repeated
    /// promotion on access.
    Lfu,
}

pub(crate) struct EvictionDeque<K, V, Sl> {
    first: Option<Arc<Entry<K, V, Sl>>>,
    last: Option<Arc<Entry<K, V, Sl>>>,
    size: usize,
    capacity: usize,
    policy: Policy,
}

impl<K, V, Sl> EvictionDeque<K, V, Sl> {
    pub(crate) fn new(capacity: usize, policy: Policy) -> Self {
        Self {
            first: None,
            last: None,
            size: 0,
            capacity,
            policy,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn capacity_hint(&self) -> usize {
        self.capacity
    }

    /// Inserts `entry` immediately after `after` (`None` means "at the
    /// front"). The shared primitive every policy transition reduces to.
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    unsafe fn insert_after(&mut self, entry: Arc<Entry<K, V, Sl>>, after: Option<Arc<Entry<K, V, Sl>>>) {
        let next = match &after {
            Some(a) => a.deque_links().next.clone(),
            None => self.first.clone(),
        };
        {
            let links = entry.deque_links();
            links.prev = after.clone();
            links.next = next.clone();
            links.linked = true;
        }
        match &after {
            Some(a) => a.deque_links().next = Some(entry.clone()),
            None => self.first = Some(entry.clone()),
        }
        match &next {
            Some(n) => n.deque_links().prev = Some(entry.clone()),
            None => self.last = Some(entry.clone()),
        }
        self.size += 1;
    }

    /// # Safety
    /// Caller holds the eviction mutex; `entry` must currently be linked.
    unsafe fn unlink(&mut self, entry: &Arc<Entry<K, V, Sl>>) {
        let (prev, next) = {
            let links = entry.deque_links();
            let prev = links.prev.take();
            let next = links.next.take();
            links.linked = false;
            (prev, next)
        };
        match &prev {
            Some(p) => p.deque_links().next = next.clone(),
            None => self.first = next.clone(),
        }
        match &next {
            Some(n) => n.deque_links().prev = prev.clone(),
            None => self.last = prev.clone(),
        }
        self.size -= 1;
    }

    fn is_first(&self, entry: &Arc<Entry<K, V, Sl>>) -> bool {
        self.first.as_ref().is_some_and(|f| Arc::ptr_eq(f, entry))
    }

    /// Reacts to an `Add` command: link the newly-inserted entry at the
    /// front.
    ///
    /// # Safety
    /// Caller holds the eviction mutex; `entry` must not already be linked.
    pub(crate) unsafe fn on_add(&mut self, entry: &Arc<Entry<K, V, Sl>>) {
        self.insert_after(entry.clone(), None);
    }

    /// Reacts to a `Read` command: LRU moves the entry to the front; LFU
    /// promotes it one step closer to the front, approximating frequency
    /// ordering by repeated promotion.
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    pub(crate) unsafe fn on_read(&mut self, entry: &Arc<Entry<K, V, Sl>>) {
        if self.is_first(entry) {
            return;
        }
        match self.policy {
            Policy::Lru => {
                self.unlink(entry);
                self.insert_after(entry.clone(), None);
            }
            Policy::Lfu => {
                let prev = entry.deque_links().prev.clone();
                let Some(prev) = prev else { return };
                let grandprev = prev.deque_links().prev.clone();
                self.unlink(entry);
                self.insert_after(entry.clone(), grandprev);
            }
        }
    }

    /// Reacts to a `Remove` command: unlink the entry, if it is still
    /// linked (it may already have been evicted).
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    pub(crate) unsafe fn on_remove(&mut self, entry: &Arc<Entry<K, V, Sl>>) {
        if entry.deque_links().linked {
            self.unlink(entry);
        }
    }

    /// Evicts entries from the back until `size <= capacity`, returning
    /// them in eviction order. The caller is responsible for also removing
    /// each from the table, re-entering the stripe lock.
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    pub(crate) unsafe fn evict_overflow(&mut self) -> Vec<Arc<Entry<K, V, Sl>>> {
        let mut evicted = Vec::new();
        while self.size > self.capacity {
            let Some(last) = self.last.clone() else { break };
            self.unlink(&last);
            evicted.push(last);
        }
        evicted
    }

    /// Unlinks every entry, walking the chain and breaking each node's
    /// `prev`/`next` pair as it goes. `prev`/`next` are both strong `Arc`s,
    /// so two-or-more linked entries form a reference cycle; just dropping
    /// `first`/`last` would leave that cycle intact and leak every entry
    /// still linked.
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    pub(crate) unsafe fn clear(&mut self) {
        let mut cur = self.first.take();
        self.last = None;
        self.size = 0;
        while let Some(entry) = cur {
            let links = entry.deque_links();
            cur = links.next.take();
            links.prev = None;
            links.linked = false;
        }
    }

    /// Snapshots up to `limit` entries in deque order (front to back, or
    /// back to front if `descending`), for [`crate::Cache::snapshot`].
    ///
    /// # Safety
    /// Caller holds the eviction mutex.
    pub(crate) unsafe fn snapshot(&self, limit: usize, descending: bool) -> Vec<Arc<Entry<K, V, Sl>>>
    where
        V: Clone,
    {
        let mut out = Vec::with_capacity(limit.min(self.size));
        let mut cur = if descending { self.last.clone() } else { self.first.clone() };
        while let Some(entry) = cur {
            if out.len() >= limit {
                break;
            }
            let next = if descending {
                entry.deque_links().prev.clone()
            } else {
                entry.deque_links().next.clone()
            };
            out.push(entry);
            cur = next;
        }
        out
    }
}

impl<K, V, Sl> Drop for EvictionDeque<K, V, Sl> {
    /// Breaks every node's `prev`/`next` cycle before the deque's own
    /// `first`/`last` drop, for the same reason [`EvictionDeque::clear`]
    /// does: ordinary `Cache` drop never routes through `clear`, so without
    /// this every entry still linked at drop time would leak.
    fn drop(&mut self) {
        let mut cur = self.first.take();
        while let Some(entry) = cur {
            // SAFETY: `&mut self` means no other reference to this deque
            // exists, so nothing else can be holding the eviction mutex.
            let links = unsafe { entry.deque_links() };
            cur = links.next.take();
            links.prev = None;
        }
    }
}
