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

//! Error taxonomy: argument errors on construction, and the aggregated
//! error raised when user eviction callbacks fail.

use std::fmt;

/// Errors that can arise while building a [`crate::Cache`].
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// `capacity` was `0`.
    #[error("cache capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
    /// `concurrency_level` was `0`.
    #[error("concurrency_level must be at least 1, got {0}")]
    InvalidConcurrencyLevel(usize),
}

/// One callback failure collected during an eviction batch.
#[derive(Debug)]
pub struct EvictedCallbackFailure {
    /// Index of the evicted entry within the batch that triggered the
    /// failure. Not a key, since the callback is free to consume it.
    pub index: usize,
    /// The panic payload or error message produced by the user callback.
    pub message: String,
}

/// Raised once, after all locks are released and every evicted entry has
/// been offered to the callback, aggregating every individual failure in
/// the batch.
#[derive(Debug)]
pub struct EvictionCallbackError {
    /// Number of entries in the batch that were evicted and released
    /// despite the failures below.
    pub released: usize,
    /// Every individual callback failure observed in the batch, in
    /// eviction order.
    pub failures: Vec<EvictedCallbackFailure>,
}

impl fmt::Display for EvictionCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} eviction callback(s) failed (entries were still released)",
            self.failures.len(),
            self.released
        )
    }
}

impl std::error::Error for EvictionCallbackError {}
