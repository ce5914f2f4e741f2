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

//! The two value-slot representations.
//!
//! The choice between them is a type-level, construction-time decision: the
//! copy-on-write slot works for any `V` and is what [`crate::Cache::builder`]
//! hands you; the atomic slot is only offered for the primitive types whose
//! writes are tear-free on every target we build for, via
//! [`crate::CacheBuilder::atomic`].

use std::sync::atomic::{
    AtomicBool, AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicIsize, AtomicU16, AtomicU32, AtomicU64, AtomicU8,
    AtomicUsize, Ordering,
};

use arc_swap::ArcSwap;

/// A value slot: read by concurrent `get`s, written under a table stripe
/// lock. Implementors must guarantee readers never observe a torn write.
pub trait Slot<V>: Send + Sync {
    /// Build a freshly-initialized slot.
    fn new(value: V) -> Self;
    /// Read the current value.
    fn load(&self) -> V;
    /// Publish a new value, replacing the old one.
    fn store(&self, value: V);
}

/// Copy-on-write slot: an [`ArcSwap`] holding an immutable value holder.
/// Works for any `V`; readers dereference the handle they load, so a
/// concurrent writer's replacement is never observed half-written.
pub struct CowSlot<V>(ArcSwap<V>);

impl<V: Clone + Send + Sync + 'static> Slot<V> for CowSlot<V> {
    fn new(value: V) -> Self {
        Self(ArcSwap::from_pointee(value))
    }

    fn load(&self) -> V {
        (**self.0.load()).clone()
    }

    fn store(&self, value: V) {
        self.0.store(std::sync::Arc::new(value));
    }
}

/// Sealed marker for types whose representation fits in a single
/// lock-free-atomic word, so a write can never be observed torn.
///
/// Implemented only for fixed-width integers, `bool`, and the native-sized
/// integers — the word-sized primitives whose writes are tear-free on
/// every target we build for.
pub trait AtomicPrimitive: Copy + Send + Sync + 'static + private::Sealed {
    /// The matching `std::sync::atomic` storage cell.
    type Atomic: Send + Sync;
    /// Build the atomic cell.
    fn new_atomic(value: Self) -> Self::Atomic;
    /// Load with `Acquire` ordering.
    fn load_atomic(atomic: &Self::Atomic) -> Self;
    /// Store with `Release` ordering.
    fn store_atomic(atomic: &Self::Atomic, value: Self);
}

mod private {
    pub trait Sealed {}
}

macro_rules! atomic_primitive {
    ($ty:ty, $atomic:ty) => {
        impl private::Sealed for $ty {}
        impl AtomicPrimitive for $ty {
            type Atomic = $atomic;

            fn new_atomic(value: Self) -> Self::Atomic {
                <$atomic>::new(value)
            }

            fn load_atomic(atomic: &Self::Atomic) -> Self {
                atomic.load(Ordering::Acquire)
            }

            fn store_atomic(atomic: &Self::Atomic, value: Self) {
                atomic.store(value, Ordering::Release)
            }
        }
    };
}

atomic_primitive!(u8, AtomicU8);
atomic_primitive!(u16, AtomicU16);
atomic_primitive!(u32, AtomicU32);
atomic_primitive!(u64, AtomicU64);
atomic_primitive!(usize, AtomicUsize);
atomic_primitive!(i8, AtomicI8);
atomic_primitive!(i16, AtomicI16);
atomic_primitive!(i32, AtomicI32);
atomic_primitive!(i64, AtomicI64);
atomic_primitive!(isize, AtomicIsize);
atomic_primitive!(bool, AtomicBool);

/// Atomic slot: a plain aligned load/store, used only for
/// [`AtomicPrimitive`] values.
pub struct AtomicSlot<V: AtomicPrimitive>(V::Atomic);

impl<V: AtomicPrimitive> Slot<V> for AtomicSlot<V> {
    fn new(value: V) -> Self {
        Self(V::new_atomic(value))
    }

    fn load(&self) -> V {
        V::load_atomic(&self.0)
    }

    fn store(&self, value: V) {
        V::store_atomic(&self.0, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cow_slot_roundtrips() {
        let slot = CowSlot::new(vec![1, 2, 3]);
        assert_eq!(slot.load(), vec![1, 2, 3]);
        slot.store(vec![4, 5]);
        assert_eq!(slot.load(), vec![4, 5]);
    }

    #[test]
    fn atomic_slot_roundtrips() {
        let slot = AtomicSlot::<u64>::new(7);
        assert_eq!(slot.load(), 7);
        slot.store(9);
        assert_eq!(slot.load(), 9);
    }

    #[test]
    fn atomic_slot_supports_bool() {
        let slot = AtomicSlot::<bool>::new(false);
        assert!(!slot.load());
        slot.store(true);
        assert!(slot.load());
    }
}
