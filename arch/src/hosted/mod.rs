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

//! Hosted backend: enough of the port interface to compile and unit-test
//! the kernel's data paths on a normal OS. Interrupt masking is a
//! per-thread flag, the cycle counter is the process monotonic clock,
//! and context switching aborts; tests exercise everything up to the
//! switch, never across it.

pub mod sio;

use core::sync::atomic::{fence, AtomicBool, Ordering};
use std::{cell::Cell, sync::OnceLock, time::Instant};

std::thread_local! {
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

static PENDING_SWITCH: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn disable_local_irq_save() -> usize {
    IRQ_ENABLED.with(|f| f.replace(false)) as usize
}

#[inline]
pub fn enable_local_irq_restore(state: usize) {
    IRQ_ENABLED.with(|f| f.set(state != 0));
}

#[inline]
pub fn disable_local_irq() {
    IRQ_ENABLED.with(|f| f.set(false));
}

#[inline]
pub fn enable_local_irq() {
    IRQ_ENABLED.with(|f| f.set(true));
}

#[inline]
pub fn local_irq_enabled() -> bool {
    IRQ_ENABLED.with(|f| f.get())
}

#[inline]
pub fn memory_barrier() {
    fence(Ordering::SeqCst);
}

#[inline]
pub fn current_sp() -> usize {
    let probe = 0u8;
    &probe as *const _ as usize
}

#[inline]
pub fn current_cpu_id() -> usize {
    0
}

#[inline]
pub fn pend_switch_context() {
    PENDING_SWITCH.store(true, Ordering::Release);
}

/// Reads and clears the latched reschedule request.
#[inline]
pub fn switch_pending() -> bool {
    PENDING_SWITCH.swap(false, Ordering::AcqRel)
}

#[inline]
pub fn wait_for_interrupt() {
    std::thread::yield_now();
}

#[inline]
pub fn deep_sleep() {
    std::thread::yield_now();
}

#[inline]
pub fn vector_table_base() -> u32 {
    0
}

pub fn sys_reset() -> ! {
    panic!("system reset requested");
}

pub fn cycle_counter_init() {
    let _ = epoch();
}

fn epoch() -> &'static Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now)
}

/// Raw wrapping cycle counter; one cycle is one nanosecond here. The
/// truncation to 32 bits is deliberate so the kernel clock's extension
/// logic runs the same code path as on hardware.
#[inline]
pub fn cycle_count() -> u32 {
    epoch().elapsed().as_nanos() as u32
}

/// # Safety
/// Never returns control; only the boot path may call it.
pub unsafe extern "C" fn start_schedule(_entry: extern "C" fn() -> !) -> ! {
    unimplemented!("the hosted backend cannot enter the schedule loop");
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

#[inline]
pub fn enable_irq(_irq: IrqNumber) {}

#[inline]
pub fn disable_irq(_irq: IrqNumber) {}

#[doc(hidden)]
#[derive(Copy, Clone)]
#[repr(C)]
pub union Vector {
    pub handler: unsafe extern "C" fn(),
    pub reserved: usize,
}

pub const IRQ_TABLE_CAPACITY: usize = 32;

pub type InterruptTable = [Vector; IRQ_TABLE_CAPACITY];

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub arg0: usize,
    pub arg1: usize,
    pub pc: usize,
}

pub const CONTEXT_WORDS: usize = core::mem::size_of::<Context>() / core::mem::size_of::<usize>();
pub const STACK_ALIGN: usize = 8;
pub const EXTRA_STACK_RESERVE: usize = 0;

impl Context {
    pub fn init(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    #[inline]
    pub fn set_return_address(&mut self, addr: usize) -> &mut Self {
        self.pc = addr;
        self
    }

    #[inline]
    pub fn set_arg(&mut self, n: usize, val: usize) -> &mut Self {
        match n {
            0 => self.arg0 = val,
            1 => self.arg1 = val,
            _ => unreachable!("entry functions take at most two args"),
        }
        self
    }
}
