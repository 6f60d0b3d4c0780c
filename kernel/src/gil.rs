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

//! Global interrupt lock: the critical section mutually excluding every
//! interrupt handler on every core.
//!
//! Single core, masking local interrupts already excludes all handlers,
//! so [`irq_lock`]/[`irq_unlock`] compile to nothing. With `smp`, a
//! reserved hardware spinlock extends the exclusion to the other core;
//! a per-core depth counter makes re-acquisition on the same core safe.

use crate::support::DisableInterruptGuard;

#[cfg(feature = "smp")]
mod smp {
    use crate::{config::NUM_CORES, types::AtomicUint};
    use core::sync::atomic::Ordering;
    use osprey_arch::{self as arch, sio};

    /// Hardware spinlock reserved for the GIL. Drivers must not touch it.
    pub const GIL_SPINLOCK_ID: usize = sio::NUM_SPINLOCKS - 1;

    static GIL_DEPTH: [AtomicUint; NUM_CORES] = [const { AtomicUint::new(0) }; NUM_CORES];

    /// Callable from an interrupt handler or with interrupts disabled.
    pub fn irq_lock() {
        let core = arch::current_cpu_id();
        if GIL_DEPTH[core].fetch_add(1, Ordering::Acquire) == 0 {
            sio::spinlock_lock(GIL_SPINLOCK_ID);
        }
    }

    pub fn irq_unlock() {
        let core = arch::current_cpu_id();
        let old = GIL_DEPTH[core].fetch_sub(1, Ordering::Release);
        assert_ne!(old, 0, "irq_unlock without matching irq_lock");
        if old == 1 {
            sio::spinlock_unlock(GIL_SPINLOCK_ID);
        }
    }
}

#[cfg(feature = "smp")]
pub use smp::{irq_lock, irq_unlock, GIL_SPINLOCK_ID};

/// Acquire from an interrupt handler or with interrupts already
/// disabled. No-op on single-core builds.
#[cfg(not(feature = "smp"))]
#[inline]
pub fn irq_lock() {}

/// Release counterpart of [`irq_lock`].
#[cfg(not(feature = "smp"))]
#[inline]
pub fn irq_unlock() {}

/// Thread-context GIL scope: masks local interrupts, then takes the
/// cross-core lock. Release order is the reverse.
pub struct GilGuard {
    irq: Option<DisableInterruptGuard>,
}

impl GilGuard {
    pub fn new() -> Self {
        let irq = DisableInterruptGuard::new();
        irq_lock();
        Self { irq: Some(irq) }
    }
}

impl Default for GilGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GilGuard {
    fn drop(&mut self) {
        irq_unlock();
        drop(self.irq.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_arch as arch;

    #[test]
    fn guard_masks_and_restores() {
        assert!(arch::local_irq_enabled());
        {
            let _g = GilGuard::new();
            assert!(!arch::local_irq_enabled());
        }
        assert!(arch::local_irq_enabled());
    }

    #[test]
    fn nested_guards_unwind_in_order() {
        let a = GilGuard::new();
        let b = GilGuard::new();
        assert!(!arch::local_irq_enabled());
        drop(b);
        assert!(!arch::local_irq_enabled());
        drop(a);
        assert!(arch::local_irq_enabled());
    }
}
