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

//! C5: the public cache facade, mirroring the shape of
//! `foyer_memory::generic::{GenericCache, GenericCacheConfig}`.

use std::hash::BuildHasher;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::code::{DefaultHashBuilder, Key, KeyEq, Value};
use crate::deque::{EvictionDeque, Policy};
use crate::entry::Entry;
use crate::error::{CacheError, EvictionCallbackError};
use crate::listener::{dispatch_evictions, EvictionListener, NoopListener};
use crate::queue::{CommandQueue, DrainOutcome, Op};
use crate::slot::{AtomicPrimitive, AtomicSlot, CowSlot, Slot};
use crate::table::Table;

fn default_concurrency_level() -> usize {
    let procs = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    procs + (procs + 1) / 2
}

/// Debug-only view of cache internals. Not part of the public contract;
/// field meanings may change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugStats {
    pub live_entries: usize,
    pub pending_commands: usize,
    pub free_list_len: usize,
}

/// Builds a [`Cache`]. Defaults to the copy-on-write value slot, LRU
/// eviction, [`DefaultHashBuilder`], and a no-op eviction listener.
pub struct CacheBuilder<K, V, Sl = CowSlot<V>, S = DefaultHashBuilder> {
    capacity: usize,
    concurrency_level: usize,
    policy: Policy,
    hash_builder: S,
    key_eq: Option<KeyEq<K>>,
    listener: Arc<dyn EvictionListener<K, V>>,
    _slot: PhantomData<fn() -> Sl>,
}

impl<K, V> CacheBuilder<K, V, CowSlot<V>, DefaultHashBuilder>
where
    K: Key,
    V: Value,
{
    /// `capacity` is both the eviction deque's limit and the table's bucket
    /// count: one stripe per slot, so the table never rehashes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            concurrency_level: default_concurrency_level(),
            policy: Policy::Lru,
            hash_builder: DefaultHashBuilder::default(),
            key_eq: None,
            listener: Arc::new(NoopListener),
            _slot: PhantomData,
        }
    }
}

impl<K, V, Sl, S> CacheBuilder<K, V, Sl, S>
where
    K: Key,
    V: Value,
    Sl: Slot<V> + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    pub fn with_concurrency_level(mut self, concurrency_level: usize) -> Self {
        self.concurrency_level = concurrency_level;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Installs a custom key equivalence, overriding `K`'s `Eq` impl.
    pub fn with_key_eq(mut self, key_eq: KeyEq<K>) -> Self {
        self.key_eq = Some(key_eq);
        self
    }

    pub fn with_event_listener<L>(mut self, listener: L) -> Self
    where
        L: EvictionListener<K, V>,
    {
        self.listener = Arc::new(listener);
        self
    }

    pub fn with_hasher<S2>(self, hasher: S2) -> CacheBuilder<K, V, Sl, S2>
    where
        S2: BuildHasher + Send + Sync + 'static,
    {
        CacheBuilder {
            capacity: self.capacity,
            concurrency_level: self.concurrency_level,
            policy: self.policy,
            hash_builder: hasher,
            key_eq: self.key_eq,
            listener: self.listener,
            _slot: PhantomData,
        }
    }

    /// Switches to the atomic value slot, available only for
    /// [`AtomicPrimitive`] value types.
    pub fn atomic(self) -> CacheBuilder<K, V, AtomicSlot<V>, S>
    where
        V: AtomicPrimitive,
    {
        CacheBuilder {
            capacity: self.capacity,
            concurrency_level: self.concurrency_level,
            policy: self.policy,
            hash_builder: self.hash_builder,
            key_eq: self.key_eq,
            listener: self.listener,
            _slot: PhantomData,
        }
    }

    pub fn build(self) -> Result<Cache<K, V, Sl, S>, CacheError> {
        if self.capacity < 1 {
            return Err(CacheError::InvalidCapacity(self.capacity));
        }
        if self.concurrency_level < 1 {
            return Err(CacheError::InvalidConcurrencyLevel(self.concurrency_level));
        }

        Ok(Cache {
            inner: Arc::new(CacheInner {
                table: Table::new(self.capacity, self.hash_builder, self.key_eq),
                queue: CommandQueue::new(),
                eviction: Mutex::new(EvictionDeque::new(self.capacity, self.policy)),
                rate_limit_reached: AtomicBool::new(false),
                concurrency_level: self.concurrency_level,
                listener: RwLock::new(self.listener),
                metrics: crate::metrics::Metrics::default(),
            }),
        })
    }
}

struct CacheInner<K, V, Sl, S> {
    table: Table<K, V, Sl, S>,
    queue: CommandQueue<K, V, Sl>,
    eviction: Mutex<EvictionDeque<K, V, Sl>>,
    rate_limit_reached: AtomicBool,
    concurrency_level: usize,
    listener: RwLock<Arc<dyn EvictionListener<K, V>>>,
    metrics: crate::metrics::Metrics,
}

/// A concurrent, bounded key-value cache with pluggable LRU/LFU eviction.
/// Cheap to clone: internally an `Arc`.
pub struct Cache<K, V, Sl = CowSlot<V>, S = DefaultHashBuilder> {
    inner: Arc<CacheInner<K, V, Sl, S>>,
}

impl<K, V, Sl, S> Clone for Cache<K, V, Sl, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Cache<K, V, CowSlot<V>, DefaultHashBuilder>
where
    K: Key,
    V: Value,
{
    pub fn builder(capacity: usize) -> CacheBuilder<K, V, CowSlot<V>, DefaultHashBuilder> {
        CacheBuilder::new(capacity)
    }
}

impl<K, V, Sl, S> Cache<K, V, Sl, S>
where
    K: Key,
    V: Value,
    Sl: Slot<V>,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Opportunistically drains the command queue into the eviction deque,
    /// then dispatches any evicted entries to the listener with no lock
    /// held.
    fn try_drain(&self) -> Result<(), EvictionCallbackError> {
        let rate_limited = self.inner.rate_limit_reached.load(Ordering::Acquire);
        let mut guard = if rate_limited {
            self.inner.eviction.lock()
        } else {
            match self.inner.eviction.try_lock() {
                Some(guard) => guard,
                None => return Ok(()),
            }
        };

        // SAFETY: `guard` is the eviction mutex guard for this cache.
        let outcome = unsafe {
            self.inner.queue.drain(self.inner.concurrency_level, |op, entry| {
                if entry.is_removed() {
                    return;
                }
                match op {
                    Op::Add => guard.on_add(entry),
                    Op::Read => guard.on_read(entry),
                    Op::Remove => guard.on_remove(entry),
                }
            })
        };

        match outcome {
            DrainOutcome::Exhausted => self.inner.rate_limit_reached.store(false, Ordering::Release),
            DrainOutcome::BudgetExceeded => {
                self.inner.rate_limit_reached.store(true, Ordering::Release);
                tracing::trace!("command drain hit its per-call budget; more commands remain pending");
            }
        }

        let evicted = unsafe { guard.evict_overflow() };
        for entry in &evicted {
            self.inner.table.remove_entry_if_current(entry);
        }
        drop(guard);

        if evicted.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = evicted.len(), "evicting entries past capacity");
        self.inner.metrics.evict.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        let pairs: Vec<(K, V)> = evicted.iter().map(|e| (e.key().clone(), e.value())).collect();
        let listener = self.inner.listener.read().clone();
        dispatch_evictions(listener.as_ref(), pairs)
    }

    fn enqueue_and_drain(&self, op: Op, entry: Arc<Entry<K, V, Sl>>) -> Result<(), EvictionCallbackError> {
        self.inner.queue.enqueue(op, entry);
        self.try_drain()
    }

    /// Looks up `key` without ever acquiring a stripe lock.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn get(&self, key: &K) -> Result<Option<V>, EvictionCallbackError> {
        let hash = self.inner.table.hash(key);
        match self.inner.table.try_get(hash, key) {
            Some(entry) => {
                self.inner.metrics.hit.fetch_add(1, Ordering::Relaxed);
                let value = entry.value();
                self.enqueue_and_drain(Op::Read, entry)?;
                Ok(Some(value))
            }
            None => {
                self.inner.metrics.miss.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Existence check; does not affect recency/frequency ordering.
    pub fn contains(&self, key: &K) -> bool {
        let hash = self.inner.table.hash(key);
        self.inner.table.try_get(hash, key).is_some()
    }

    pub fn put_if_absent(&self, key: K, value: V) -> Result<bool, EvictionCallbackError> {
        let hash = self.inner.table.hash(&key);
        let outcome = self.inner.table.try_insert(hash, key, value, false);
        if outcome.inserted {
            self.inner.metrics.insert.fetch_add(1, Ordering::Relaxed);
            self.enqueue_and_drain(Op::Add, outcome.entry)?;
        }
        Ok(outcome.inserted)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn put_or_update(&self, key: K, value: V) -> Result<(Option<V>, bool), EvictionCallbackError> {
        let hash = self.inner.table.hash(&key);
        let outcome = self.inner.table.try_insert(hash, key, value, true);
        if outcome.inserted {
            self.inner.metrics.insert.fetch_add(1, Ordering::Relaxed);
            self.enqueue_and_drain(Op::Add, outcome.entry)?;
        } else if outcome.updated {
            self.inner.metrics.update.fetch_add(1, Ordering::Relaxed);
            self.enqueue_and_drain(Op::Read, outcome.entry)?;
        }
        Ok((outcome.prior, outcome.inserted))
    }

    /// Assignment form of [`Cache::put_or_update`] that discards the prior
    /// value and whether it inserted.
    pub fn set_index(&self, key: K, value: V) -> Result<(), EvictionCallbackError> {
        self.put_or_update(key, value).map(|_| ())
    }

    pub fn get_or_put(&self, key: K, value: V) -> Result<(V, bool), EvictionCallbackError> {
        let hash = self.inner.table.hash(&key);
        let outcome = self.inner.table.try_insert(hash, key, value, false);
        if outcome.inserted {
            self.inner.metrics.insert.fetch_add(1, Ordering::Relaxed);
            let value = outcome.entry.value();
            self.enqueue_and_drain(Op::Add, outcome.entry)?;
            Ok((value, true))
        } else {
            Ok((outcome.prior.expect("existing entry always carries a prior value"), false))
        }
    }

    pub fn update_if_equals(&self, key: &K, new: V, expected: &V) -> Result<bool, EvictionCallbackError>
    where
        V: PartialEq,
    {
        let hash = self.inner.table.hash(key);
        match self.inner.table.try_update(hash, key, new, expected) {
            Some(entry) => {
                self.inner.metrics.update.fetch_add(1, Ordering::Relaxed);
                self.enqueue_and_drain(Op::Read, entry)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Never invokes the eviction listener for the removed entry itself;
    /// an opportunistic drain triggered by this call may still evict and
    /// report an unrelated entry.
    pub fn remove(&self, key: &K) -> Result<Option<V>, EvictionCallbackError> {
        let hash = self.inner.table.hash(key);
        match self.inner.table.try_remove_any(hash, key) {
            Some(entry) => {
                self.inner.metrics.remove.fetch_add(1, Ordering::Relaxed);
                let value = entry.value();
                self.enqueue_and_drain(Op::Remove, entry)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn remove_if_equals(&self, key: &K, value: &V) -> Result<bool, EvictionCallbackError>
    where
        V: PartialEq,
    {
        let hash = self.inner.table.hash(key);
        match self.inner.table.try_remove(hash, key, value) {
            Some(entry) => {
                self.inner.metrics.remove.fetch_add(1, Ordering::Relaxed);
                self.enqueue_and_drain(Op::Remove, entry)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads the live-entry counter. Not a snapshot: may race concurrent
    /// mutators.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed at construction and equal to the table's bucket count.
    pub fn capacity(&self) -> usize {
        self.inner.eviction.lock().capacity_hint()
    }

    /// Weakly-consistent snapshot iterator over every currently-live entry.
    /// May miss concurrent inserts and re-visit entries mid-unlink, but
    /// never panics.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.inner
            .table
            .snapshot()
            .into_iter()
            .map(|entry| (entry.key().clone(), entry.value()))
    }

    /// Copies up to `limit` entries in deque order, holding the eviction
    /// mutex for the duration. Not for hot paths.
    pub fn snapshot(&self, limit: usize, descending: bool) -> Vec<(K, V)>
    where
        V: Clone,
    {
        let guard = self.inner.eviction.lock();
        // SAFETY: `guard` is this cache's eviction mutex.
        unsafe { guard.snapshot(limit, descending) }
            .into_iter()
            .map(|entry| (entry.key().clone(), entry.value()))
            .collect()
    }

    /// Unlinks every entry from the table and empties the eviction deque.
    /// Acquires the eviction mutex first, then every stripe. Never invokes
    /// the eviction listener.
    pub fn clear(&self) {
        let mut guard = self.inner.eviction.lock();
        self.inner.table.clear();
        // SAFETY: `guard` is this cache's eviction mutex.
        unsafe { guard.clear() };
    }

    /// Registers or replaces the user eviction callback.
    pub fn on_evict<L>(&self, listener: L)
    where
        L: EvictionListener<K, V>,
    {
        *self.inner.listener.write() = Arc::new(listener);
    }

    pub fn metrics(&self) -> &crate::metrics::Metrics {
        &self.inner.metrics
    }

    /// Not part of the public contract; shape may change between releases.
    pub fn debug_stats(&self) -> DebugStats {
        let _guard = self.inner.eviction.lock();
        // SAFETY: `_guard` is this cache's eviction mutex.
        let (pending_commands, free_list_len) = unsafe { self.inner.queue.debug_counts() };
        DebugStats {
            live_entries: self.inner.table.len(),
            pending_commands,
            free_list_len,
        }
    }
}
