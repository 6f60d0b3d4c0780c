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

use crate::support::DisableInterruptGuard;
use core::{
    ops::{Deref, DerefMut},
    sync::atomic::{compiler_fence, Ordering},
};
use spin::{Mutex, MutexGuard};

/// The kernel's one low-level lock: a spinlock that can compose the
/// local interrupt mask into its guard. Everything the scheduler and
/// the synchronization primitives share is protected by one of these,
/// taken with [`SpinLock::irqsave_lock`] so the critical section
/// excludes local interrupt handlers and, through the spin part, the
/// other core.
#[derive(Debug)]
pub struct SpinLock<T: ?Sized> {
    lock: Mutex<T>,
}

// Field order matters: the mutex guard must drop before interrupts are
// restored. See the destructors section of the language reference.
#[derive(Debug)]
pub struct SpinLockGuard<'a, T: ?Sized> {
    mutex_guard: MutexGuard<'a, T>,
    irq_guard: Option<DisableInterruptGuard>,
}

impl<'a, T: 'a + ?Sized> Deref for SpinLockGuard<'a, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        self.mutex_guard.deref()
    }
}

impl<'a, T: 'a + ?Sized> DerefMut for SpinLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.mutex_guard.deref_mut()
    }
}

impl<T> SpinLock<T> {
    pub const fn const_new(val: T) -> Self {
        Self {
            lock: Mutex::new(val),
        }
    }

    pub const fn new(val: T) -> Self {
        Self::const_new(val)
    }
}

impl<T: ?Sized> SpinLock<T> {
    pub fn try_irqsave_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let irq_guard = DisableInterruptGuard::new();
        compiler_fence(Ordering::SeqCst);
        let mut guard = self.try_lock()?;
        assert!(guard.irq_guard.is_none());
        guard.irq_guard = Some(irq_guard);
        Some(guard)
    }

    pub fn irqsave_lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            let Some(guard) = self.try_irqsave_lock() else {
                core::hint::spin_loop();
                continue;
            };
            return guard;
        }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let mutex_guard = self.lock.try_lock()?;
        Some(SpinLockGuard {
            irq_guard: None,
            mutex_guard,
        })
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            let Some(guard) = self.try_lock() else {
                core::hint::spin_loop();
                continue;
            };
            return guard;
        }
    }
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_arch as arch;

    #[test]
    fn irqsave_guard_restores_mask() {
        let lock = SpinLock::new(0u32);
        assert!(arch::local_irq_enabled());
        {
            let mut w = lock.irqsave_lock();
            *w += 1;
            assert!(!arch::local_irq_enabled());
            // Nested locks of other objects keep the mask.
            let other = SpinLock::new(());
            let _inner = other.irqsave_lock();
            assert!(!arch::local_irq_enabled());
        }
        assert!(arch::local_irq_enabled());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::new(());
        let g = lock.try_lock();
        assert!(g.is_some());
        assert!(lock.try_lock().is_none());
        assert!(lock.try_irqsave_lock().is_none());
        assert!(arch::local_irq_enabled());
        drop(g);
        assert!(lock.try_lock().is_some());
    }
}
