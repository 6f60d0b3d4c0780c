// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Word-sized atomic operations with acquire-release ordering.
//!
//! Targets whose ISA has the needed read-modify-write forms lower these
//! to `core::sync::atomic`. The ARM port runs them in a critical
//! section instead: masked interrupts on single core, plus a dedicated
//! hardware spinlock on `smp` (ARMv6-M has no exclusives, and the
//! multi-word [`fetch_and_increment`] could not use them anyway).

use crate::support::DisableInterruptGuard;

#[cfg(feature = "smp")]
use osprey_arch::sio;

/// Hardware spinlock reserved for the atomics fallback path.
#[cfg(feature = "smp")]
pub const ATOMIC_SPINLOCK_ID: usize = sio::NUM_SPINLOCKS - 2;

struct AtomicSection {
    _irq: DisableInterruptGuard,
}

impl AtomicSection {
    #[inline]
    fn enter() -> Self {
        let irq = DisableInterruptGuard::new();
        #[cfg(feature = "smp")]
        sio::spinlock_lock(ATOMIC_SPINLOCK_ID);
        Self { _irq: irq }
    }
}

impl Drop for AtomicSection {
    #[inline]
    fn drop(&mut self) {
        #[cfg(feature = "smp")]
        sio::spinlock_unlock(ATOMIC_SPINLOCK_ID);
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        /// Stores `v`, returns the previous value.
        ///
        /// # Safety
        /// `p` must be valid, aligned and word-sized shared state.
        pub unsafe fn swap(p: *mut i32, v: i32) -> i32 {
            let _s = AtomicSection::enter();
            let old = p.read_volatile();
            p.write_volatile(v);
            old
        }

        /// # Safety
        /// See [`swap`].
        pub unsafe fn add(p: *mut i32, k: i32) {
            let _s = AtomicSection::enter();
            p.write_volatile(p.read_volatile().wrapping_add(k));
        }

        /// Adds `k`, returns the previous value.
        ///
        /// # Safety
        /// See [`swap`].
        pub unsafe fn add_exchange(p: *mut i32, k: i32) -> i32 {
            let _s = AtomicSection::enter();
            let old = p.read_volatile();
            p.write_volatile(old.wrapping_add(k));
            old
        }

        /// Stores `new` only if the current value is `expected`; always
        /// returns the value observed before the store.
        ///
        /// # Safety
        /// See [`swap`].
        pub unsafe fn compare_and_swap(p: *mut i32, expected: i32, new: i32) -> i32 {
            let _s = AtomicSection::enter();
            let old = p.read_volatile();
            if old == expected {
                p.write_volatile(new);
            }
            old
        }
    } else {
        use core::sync::atomic::{AtomicI32, Ordering};

        /// Stores `v`, returns the previous value.
        ///
        /// # Safety
        /// `p` must be valid, aligned and word-sized shared state.
        pub unsafe fn swap(p: *mut i32, v: i32) -> i32 {
            AtomicI32::from_ptr(p).swap(v, Ordering::AcqRel)
        }

        /// # Safety
        /// See [`swap`].
        pub unsafe fn add(p: *mut i32, k: i32) {
            AtomicI32::from_ptr(p).fetch_add(k, Ordering::AcqRel);
        }

        /// Adds `k`, returns the previous value.
        ///
        /// # Safety
        /// See [`swap`].
        pub unsafe fn add_exchange(p: *mut i32, k: i32) -> i32 {
            AtomicI32::from_ptr(p).fetch_add(k, Ordering::AcqRel)
        }

        /// Stores `new` only if the current value is `expected`; always
        /// returns the value observed before the store.
        ///
        /// # Safety
        /// See [`swap`].
        pub unsafe fn compare_and_swap(p: *mut i32, expected: i32, new: i32) -> i32 {
            match AtomicI32::from_ptr(p).compare_exchange(
                expected,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(old) => old,
                Err(old) => old,
            }
        }
    }
}

/// Loads a pointer from `*pp`; if non-null, adds `k` to the word at
/// `word_offset` inside the pointed-to object and returns the pointer
/// read. Returns null without touching anything when `*pp` is null.
/// Used for intrusive reference counts that must be adjusted together
/// with the pointer load.
///
/// # Safety
/// `pp` must be valid; a non-null `*pp` must point to an object with a
/// writable `i32` at `word_offset` words from its base.
pub unsafe fn fetch_and_increment(pp: *const *mut u8, word_offset: usize, k: i32) -> *mut u8 {
    let _s = AtomicSection::enter();
    let p = pp.read_volatile();
    if p.is_null() {
        return core::ptr::null_mut();
    }
    let field = (p as *mut i32).add(word_offset);
    field.write_volatile(field.read_volatile().wrapping_add(k));
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_returns_old() {
        let mut v = 5i32;
        let old = unsafe { swap(&mut v, 9) };
        assert_eq!(old, 5);
        assert_eq!(v, 9);
    }

    #[test]
    fn add_and_add_exchange() {
        let mut v = 10i32;
        unsafe { add(&mut v, 3) };
        assert_eq!(v, 13);
        let old = unsafe { add_exchange(&mut v, -13) };
        assert_eq!(old, 13);
        assert_eq!(v, 0);
    }

    #[test]
    fn compare_and_swap_is_conditional() {
        let mut v = 1i32;
        assert_eq!(unsafe { compare_and_swap(&mut v, 1, 2) }, 1);
        assert_eq!(v, 2);
        assert_eq!(unsafe { compare_and_swap(&mut v, 1, 3) }, 2);
        assert_eq!(v, 2);
    }

    #[test]
    fn fetch_and_increment_refcount() {
        #[repr(C)]
        struct Obj {
            header: i32,
            refs: i32,
        }
        let mut obj = Obj { header: 0, refs: 1 };
        let mut p: *mut u8 = &mut obj as *mut _ as *mut u8;
        let got = unsafe { fetch_and_increment(&p, 1, 1) };
        assert_eq!(got, p);
        assert_eq!(obj.refs, 2);

        p = core::ptr::null_mut();
        let got = unsafe { fetch_and_increment(&p, 1, 1) };
        assert!(got.is_null());
        assert_eq!(obj.refs, 2);
    }
}
