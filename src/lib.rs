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

//! A concurrent, bounded key-value cache with pluggable LRU/LFU eviction.
//!
//! The design splits the cache into four collaborating pieces, each driven
//! by its own synchronization strategy rather than one global lock:
//!
//! - a lock-striped chained hash table for lookups and mutations,
//! - a lock-free intrusive command queue that table operations append to
//!   without blocking,
//! - an eviction deque, drained from the command queue under a single
//!   mutex, that tracks recency/frequency order and decides what to evict,
//! - a user-supplied listener, invoked for each evicted entry with no
//!   internal lock held.
//!
//! ```
//! use striped_cache::Cache;
//!
//! let cache = Cache::<&str, u64>::builder(128).build().unwrap();
//! cache.put_if_absent("a", 1).unwrap();
//! assert_eq!(cache.get(&"a").unwrap(), Some(1));
//! ```

mod cache;
mod code;
mod deque;
mod entry;
mod error;
mod listener;
mod metrics;
mod queue;
mod slot;
mod table;

pub use cache::{Cache, CacheBuilder, DebugStats};
pub use code::{DefaultHashBuilder, Key, KeyEq, Value};
pub use deque::Policy;
pub use error::{CacheError, EvictedCallbackFailure, EvictionCallbackError};
pub use listener::{EvictionListener, NoopListener};
pub use metrics::Metrics;
pub use slot::{AtomicPrimitive, AtomicSlot, CowSlot, Slot};
