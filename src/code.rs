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

//! Bounds shared by keys and values stored in the cache.

use std::hash::Hash;

/// Bound required of cache keys.
///
/// Uses [`std::hash::Hash`] and [`PartialEq`], with an optional
/// caller-supplied override installed through
/// [`crate::CacheBuilder::with_key_eq`].
pub trait Key: Hash + Eq + Clone + Send + Sync + 'static {}
impl<T> Key for T where T: Hash + Eq + Clone + Send + Sync + 'static {}

/// Bound required of cache values.
pub trait Value: Clone + Send + Sync + 'static {}
impl<T> Value for T where T: Clone + Send + Sync + 'static {}

/// Default hash builder, consistent with `foyer-memory`'s default
/// [`ahash::RandomState`].
pub type DefaultHashBuilder = ahash::RandomState;

/// A pluggable key equality, installed when the default `Eq` impl of `K`
/// isn't the desired equivalence.
pub type KeyEq<K> = fn(&K, &K) -> bool;
