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

//! ARM Cortex-M backend.

mod context;
mod handlers;
mod interrupt;
#[cfg(feature = "smp")]
pub mod sio;

pub use context::{Context, CONTEXT_WORDS, EXTRA_STACK_RESERVE, STACK_ALIGN};
pub use interrupt::{
    disable_irq, disable_local_irq, disable_local_irq_save, enable_irq, enable_local_irq,
    enable_local_irq_restore, local_irq_enabled, InterruptTable, IrqNumber, Vector,
    IRQ_TABLE_CAPACITY,
};

use core::arch::asm;

#[inline]
pub fn memory_barrier() {
    cortex_m::asm::dsb();
}

#[inline]
pub fn current_sp() -> usize {
    let sp: u32;
    // SAFETY: plain register read.
    unsafe { asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    sp as usize
}

#[inline]
pub fn current_cpu_id() -> usize {
    #[cfg(feature = "smp")]
    {
        sio::cpu_id()
    }
    #[cfg(not(feature = "smp"))]
    {
        0
    }
}

/// Latches a reschedule request. The switch happens when the innermost
/// interrupt returns to thread context, or immediately if none is active.
#[inline]
pub fn pend_switch_context() {
    cortex_m::peripheral::SCB::set_pendsv();
    memory_barrier();
}

#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

/// Lowest-power wait this port offers. Boards with a real deep-sleep
/// state hook it behind SCR.SLEEPDEEP before calling.
#[inline]
pub fn deep_sleep() {
    cortex_m::asm::wfi();
}

/// Base address of the active vector table.
#[inline]
pub fn vector_table_base() -> u32 {
    const SCB_VTOR: *const u32 = 0xE000_ED08 as *const u32;
    unsafe { SCB_VTOR.read_volatile() }
}

#[inline]
pub fn sys_reset() -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

const DWT_CTRL: *mut u32 = 0xE000_1000 as *mut u32;
const DWT_CYCCNT: *mut u32 = 0xE000_1004 as *mut u32;
const DEMCR: *mut u32 = 0xE000_EDFC as *mut u32;

/// Starts the free-running 32-bit cycle counter. ARMv6-M ports without a
/// DWT must route `cycle_count` to a board timer instead.
pub fn cycle_counter_init() {
    unsafe {
        DEMCR.write_volatile(DEMCR.read_volatile() | (1 << 24)); // TRCENA
        DWT_CYCCNT.write_volatile(0);
        DWT_CTRL.write_volatile(DWT_CTRL.read_volatile() | 1); // CYCCNTENA
    }
}

/// Raw wrapping cycle counter. The kernel clock extends it to 64 bits.
#[inline]
pub fn cycle_count() -> u32 {
    unsafe { DWT_CYCCNT.read_volatile() }
}

pub use handlers::start_schedule;
