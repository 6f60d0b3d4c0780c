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

//! PRIMASK-based interrupt masking and the vector-table building blocks.

use core::{
    arch::asm,
    sync::atomic::{compiler_fence, Ordering},
};
use cortex_m::interrupt::InterruptNumber;

/// Masks interrupts and returns the previous PRIMASK value for
/// [`enable_local_irq_restore`]. This pair nests safely.
#[inline]
pub fn disable_local_irq_save() -> usize {
    let r: u32;
    // SAFETY: plain special-register read.
    unsafe { asm!("mrs {}, PRIMASK", out(reg) r, options(nomem, nostack, preserves_flags)) };
    cortex_m::interrupt::disable();
    // cortex-m 0.7.7's disable() carries no fence; make sure preceding
    // accesses are not sunk below the mask point.
    compiler_fence(Ordering::SeqCst);
    r as usize
}

#[inline]
pub fn enable_local_irq_restore(state: usize) {
    compiler_fence(Ordering::SeqCst);
    // SAFETY: restoring a PRIMASK value previously read on this core.
    unsafe {
        asm!("msr PRIMASK, {}", in(reg) state);
    }
}

/// Non-nesting mask. The matching [`enable_local_irq`] unconditionally
/// unmasks, so the caller must not already hold interrupts disabled.
#[inline]
pub fn disable_local_irq() {
    cortex_m::interrupt::disable();
    compiler_fence(Ordering::SeqCst);
}

#[inline]
pub fn enable_local_irq() {
    compiler_fence(Ordering::SeqCst);
    // SAFETY: leaving a critical section entered with disable_local_irq.
    unsafe { cortex_m::interrupt::enable() };
}

#[inline]
pub fn local_irq_enabled() -> bool {
    let r: u32;
    // SAFETY: plain special-register read.
    unsafe { asm!("mrs {}, PRIMASK", out(reg) r, options(nomem, nostack, preserves_flags)) };
    r & 1 == 0
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct IrqNumber(u16);

impl IrqNumber {
    #[inline]
    pub const fn new(number: u16) -> Self {
        Self(number)
    }
}

impl From<IrqNumber> for usize {
    fn from(irq: IrqNumber) -> Self {
        usize::from(irq.0)
    }
}

// SAFETY: the wrapped id is handed to the NVIC verbatim.
unsafe impl InterruptNumber for IrqNumber {
    #[inline]
    fn number(self) -> u16 {
        self.0
    }
}

#[inline]
pub fn enable_irq(irq: IrqNumber) {
    // SAFETY: unmasking is only reached after a handler is registered.
    unsafe { cortex_m::peripheral::NVIC::unmask(irq) };
}

#[inline]
pub fn disable_irq(irq: IrqNumber) {
    cortex_m::peripheral::NVIC::mask(irq);
}

/// One entry of the peripheral interrupt vector table.
#[doc(hidden)]
#[derive(Copy, Clone)]
#[repr(C)]
pub union Vector {
    pub handler: unsafe extern "C" fn(),
    pub reserved: usize,
}

/// Largest peripheral vector count across supported cores (ARMv6-M caps
/// at 32; the kernel's table is sized by kconfig, bounded by this).
pub const IRQ_TABLE_CAPACITY: usize = 32;

pub type InterruptTable = [Vector; IRQ_TABLE_CAPACITY];
