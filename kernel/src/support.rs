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

//! Scoped critical-section helpers. Every guard releases on all exit
//! paths of the enclosing scope.

use crate::{config::NUM_CORES, scheduler, thread::ThreadNode, types::AtomicUint};
use core::sync::atomic::Ordering;
use osprey_arch as arch;

/// Save/restore interrupt mask. Nests safely because the previous mask
/// state travels in the guard.
#[derive(Debug)]
pub(crate) struct DisableInterruptGuard {
    old: usize,
}

impl DisableInterruptGuard {
    #[inline]
    pub fn new() -> Self {
        Self {
            old: arch::disable_local_irq_save(),
        }
    }
}

impl Drop for DisableInterruptGuard {
    #[inline]
    fn drop(&mut self) {
        arch::enable_local_irq_restore(self.old);
    }
}

static INTERRUPT_NEST: [AtomicUint; NUM_CORES] = [const { AtomicUint::new(0) }; NUM_CORES];

/// Counted interrupt disable. The first call on a core masks, the
/// matching last [`enable_interrupts`] unmasks.
pub fn disable_interrupts() {
    arch::disable_local_irq();
    INTERRUPT_NEST[arch::current_cpu_id()].fetch_add(1, Ordering::Relaxed);
}

pub fn enable_interrupts() {
    let old = INTERRUPT_NEST[arch::current_cpu_id()].fetch_sub(1, Ordering::Relaxed);
    assert_ne!(old, 0, "enable_interrupts without matching disable");
    if old == 1 {
        arch::enable_local_irq();
    }
}

/// RAII form of the counted disable/enable pair.
pub struct InterruptGuard;

impl InterruptGuard {
    #[inline]
    pub fn new() -> Self {
        disable_interrupts();
        Self
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    #[inline]
    fn drop(&mut self) {
        enable_interrupts();
    }
}

/// Non-nesting mask with the lowest possible overhead. The caller must
/// not already hold interrupts disabled.
pub struct FastInterruptGuard;

impl FastInterruptGuard {
    #[inline]
    pub fn new() -> Self {
        arch::disable_local_irq();
        Self
    }
}

impl Drop for FastInterruptGuard {
    #[inline]
    fn drop(&mut self) {
        arch::enable_local_irq();
    }
}

/// Keeps the scheduler from taking the CPU away while held. Interrupts
/// still run; only the reschedule at their epilogue is suppressed.
pub struct PauseKernelGuard {
    t: ThreadNode,
}

impl PauseKernelGuard {
    pub fn new() -> Self {
        let t = scheduler::current_thread();
        t.disable_preempt();
        Self { t }
    }
}

impl Drop for PauseKernelGuard {
    fn drop(&mut self) {
        if self.t.enable_preempt() {
            // A reschedule may have been skipped while paused.
            scheduler::yield_me_now_or_later();
        }
    }
}

static DEEP_SLEEP_LOCKS: AtomicUint = AtomicUint::new(0);

/// While any of these is alive the idle thread stays out of deep sleep,
/// so wakeup latency is bounded by the normal interrupt path.
pub struct DeepSleepGuard;

impl DeepSleepGuard {
    #[inline]
    pub fn new() -> Self {
        DEEP_SLEEP_LOCKS.fetch_add(1, Ordering::Acquire);
        Self
    }
}

impl Drop for DeepSleepGuard {
    #[inline]
    fn drop(&mut self) {
        let old = DEEP_SLEEP_LOCKS.fetch_sub(1, Ordering::Release);
        assert_ne!(old, 0);
    }
}

#[inline]
pub fn deep_sleep_allowed() -> bool {
    DEEP_SLEEP_LOCKS.load(Ordering::Acquire) == 0
}

#[inline]
pub const fn align_down_size(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

#[inline]
pub const fn align_up_size(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_disable_is_identity() {
        assert!(arch::local_irq_enabled());
        disable_interrupts();
        disable_interrupts();
        assert!(!arch::local_irq_enabled());
        enable_interrupts();
        // Still masked: outermost level not yet released.
        assert!(!arch::local_irq_enabled());
        enable_interrupts();
        assert!(arch::local_irq_enabled());
    }

    #[test]
    fn fast_disable_is_identity_when_not_nested() {
        assert!(arch::local_irq_enabled());
        {
            let _g = FastInterruptGuard::new();
            assert!(!arch::local_irq_enabled());
        }
        assert!(arch::local_irq_enabled());
    }

    #[test]
    fn deep_sleep_refcount() {
        assert!(deep_sleep_allowed());
        let a = DeepSleepGuard::new();
        let b = DeepSleepGuard::new();
        assert!(!deep_sleep_allowed());
        drop(a);
        assert!(!deep_sleep_allowed());
        drop(b);
        assert!(deep_sleep_allowed());
    }

    #[test]
    fn guards_restore_on_every_exit_path() {
        assert!(arch::local_irq_enabled());
        let caught = std::panic::catch_unwind(|| {
            let _g = DisableInterruptGuard::new();
            panic!("leave the scope abnormally");
        });
        assert!(caught.is_err());
        assert!(arch::local_irq_enabled());
    }
}
