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

//! The user eviction callback, mirroring `foyer_memory::event::EventListener`.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{EvictedCallbackFailure, EvictionCallbackError};

/// Called once per evicted entry, with no internal lock held.
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    /// Invoked for one entry the eviction deque pushed out on overflow.
    /// Never called for explicit `remove`/`remove_if_equals`.
    fn on_evict(&self, key: K, value: V);
}

/// The default listener: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl<K, V> EvictionListener<K, V> for NoopListener {
    fn on_evict(&self, _key: K, _value: V) {}
}

impl<K, V, F> EvictionListener<K, V> for F
where
    F: Fn(K, V) + Send + Sync + 'static,
{
    fn on_evict(&self, key: K, value: V) {
        self(key, value)
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "eviction callback panicked with a non-string payload".to_string()
    }
}

/// Invokes `listener` for every evicted entry, aggregating failures into a
/// single error raised after the whole batch has been offered to the
/// callback.
pub(crate) fn dispatch_evictions<K, V, L>(listener: &L, evicted: Vec<(K, V)>) -> Result<(), EvictionCallbackError>
where
    L: EvictionListener<K, V> + ?Sized,
{
    let released = evicted.len();
    let mut failures = Vec::new();
    for (index, (key, value)) in evicted.into_iter().enumerate() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener.on_evict(key, value))) {
            failures.push(EvictedCallbackFailure {
                index,
                message: panic_message(&payload),
            });
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EvictionCallbackError { released, failures })
    }
}
