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

//! C3: the lock-free intrusive MPSC command queue.
//!
//! Producers (any thread, any time) append a `Command` to the tail with a
//! single atomic swap followed by a release store of the predecessor's
//! `next` — the classic Michael-Scott queue append. There is exactly one
//! drainer at a time (serialized by the cache's eviction mutex), which is
//! the only thread that ever frees or recycles a `Command` node, so no
//! hazard-pointer or epoch scheme is needed for reclamation: a node is only
//! freed after some later producer has already published a write to its
//! `next` field, meaning no producer will ever touch it again.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::entry::Entry;

/// The reaction a table mutation asks the eviction deque to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Read,
    Add,
    Remove,
}

struct Command<K, V, Sl> {
    op: Option<Op>,
    entry: Option<Arc<Entry<K, V, Sl>>>,
    next: AtomicPtr<Command<K, V, Sl>>,
}

impl<K, V, Sl> Command<K, V, Sl> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            op: None,
            entry: None,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Whether a drain stopped because the chain ran dry, or because it hit its
/// per-call budget with more commands still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    Exhausted,
    BudgetExceeded,
}

pub(crate) struct CommandQueue<K, V, Sl> {
    write_head: AtomicPtr<Command<K, V, Sl>>,
    /// Only read/written while the owning cache's eviction mutex is held.
    read_head: UnsafeCell<*mut Command<K, V, Sl>>,
    free_head: AtomicPtr<Command<K, V, Sl>>,
}

// SAFETY: `read_head` is only touched by the single thread holding the
// eviction mutex at a time; all other fields are plain atomics.
unsafe impl<K: Send, V: Send, Sl: Send> Send for CommandQueue<K, V, Sl> {}
unsafe impl<K: Send, V: Send, Sl: Send> Sync for CommandQueue<K, V, Sl> {}

impl<K, V, Sl> CommandQueue<K, V, Sl> {
    pub(crate) fn new() -> Self {
        let sentinel = Command::sentinel();
        Self {
            write_head: AtomicPtr::new(sentinel),
            read_head: UnsafeCell::new(sentinel),
            free_head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn pop_free(&self) -> Option<*mut Command<K, V, Sl>> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            if head.is_null() {
                return None;
            }
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            match self
                .free_head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(head),
                Err(actual) => head = actual,
            }
        }
    }

    fn push_free(&self, node: *mut Command<K, V, Sl>) {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            unsafe { (*node).next.store(head, Ordering::Relaxed) };
            match self
                .free_head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Enqueues a command. Callable from any thread, never blocks.
    pub(crate) fn enqueue(&self, op: Op, entry: Arc<Entry<K, V, Sl>>) {
        let node = self.pop_free().unwrap_or_else(|| {
            Box::into_raw(Box::new(Command {
                op: None,
                entry: None,
                next: AtomicPtr::new(ptr::null_mut()),
            }))
        });
        unsafe {
            (*node).op = Some(op);
            (*node).entry = Some(entry);
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        }
        let prev = self.write_head.swap(node, Ordering::AcqRel);
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Drains up to `budget` commands, invoking `apply(op, entry)` for each
    /// in enqueue order.
    ///
    /// # Safety
    /// Caller must hold the owning cache's eviction mutex; this is the only
    /// synchronization protecting `read_head`.
    pub(crate) unsafe fn drain(
        &self,
        budget: usize,
        mut apply: impl FnMut(Op, &Arc<Entry<K, V, Sl>>),
    ) -> DrainOutcome {
        let mut consumed = 0usize;
        loop {
            let read = *self.read_head.get();
            let next = (*read).next.load(Ordering::Acquire);
            if next.is_null() {
                return DrainOutcome::Exhausted;
            }
            if consumed >= budget {
                return DrainOutcome::BudgetExceeded;
            }

            let op = (*next).op.take().expect("queued command always carries an op");
            let entry = (*next).entry.take().expect("queued command always carries an entry");
            apply(op, &entry);

            *self.read_head.get() = next;
            self.push_free(read);
            consumed += 1;
        }
    }

    /// Counts pending (not-yet-drained) commands and free-list nodes, for
    /// [`crate::Cache::debug_stats`]. The free-list count is best-effort:
    /// producers and the drainer may mutate it concurrently.
    ///
    /// # Safety
    /// Caller holds the owning cache's eviction mutex.
    pub(crate) unsafe fn debug_counts(&self) -> (usize, usize) {
        let mut pending = 0usize;
        let mut cur = *self.read_head.get();
        loop {
            let next = (*cur).next.load(Ordering::Acquire);
            if next.is_null() {
                break;
            }
            pending += 1;
            cur = next;
        }

        let mut free = 0usize;
        let mut node = self.free_head.load(Ordering::Relaxed);
        while !node.is_null() {
            free += 1;
            node = (*node).next.load(Ordering::Relaxed);
        }
        (pending, free)
    }
}

impl<K, V, Sl> Drop for CommandQueue<K, V, Sl> {
    fn drop(&mut self) {
        // Free whatever is left of the live chain (unconsumed commands,
        // each possibly still holding an `Arc<Entry>`), then the free list.
        unsafe {
            let mut node = *self.read_head.get();
            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed);
                drop(Box::from_raw(node));
                node = next;
            }
            let mut free = self.free_head.load(Ordering::Relaxed);
            while !free.is_null() {
                let next = (*free).next.load(Ordering::Relaxed);
                drop(Box::from_raw(free));
                free = next;
            }
        }
    }
}
