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

//! Plain atomic counters, mirroring `foyer_memory::generic`'s
//! `self.state.metrics.*.fetch_add(..)` calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters exposed through [`crate::Cache::metrics`]. Not part
/// of the operational contract: safe to read racily, intended for
/// dashboards, not for correctness decisions.
#[derive(Debug, Default)]
pub struct Metrics {
    pub(crate) hit: AtomicU64,
    pub(crate) miss: AtomicU64,
    pub(crate) insert: AtomicU64,
    pub(crate) update: AtomicU64,
    pub(crate) remove: AtomicU64,
    pub(crate) evict: AtomicU64,
}

impl Metrics {
    pub fn hit(&self) -> u64 {
        self.hit.load(Ordering::Relaxed)
    }

    pub fn miss(&self) -> u64 {
        self.miss.load(Ordering::Relaxed)
    }

    pub fn insert(&self) -> u64 {
        self.insert.load(Ordering::Relaxed)
    }

    pub fn update(&self) -> u64 {
        self.update.load(Ordering::Relaxed)
    }

    pub fn remove(&self) -> u64 {
        self.remove.load(Ordering::Relaxed)
    }

    pub fn evict(&self) -> u64 {
        self.evict.load(Ordering::Relaxed)
    }
}
