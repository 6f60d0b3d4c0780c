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

//! Dual-core bring-up and cross-core calls over the SIO mailbox FIFO.
//!
//! Wire protocol: a zero word is a bare nudge (re-evaluate the
//! scheduler at the next epilogue); a non-zero word is a function
//! pointer, followed by one argument word. Posted functions run in the
//! receiving core's interrupt context under the GIL.

use crate::{gil, irq, scheduler};
use core::ffi::c_void;
use osprey_arch::{self as arch, sio};
use osprey_kconfig::IPI_IRQ;

const IPI_NUDGE: u32 = 0;

/// One step of the bootrom handshake: the idling core echoes every
/// word back.
fn handshake_send(v: u32) -> bool {
    sio::fifo_write_blocking(v);
    sio::fifo_read_blocking() == v
}

fn ipi_handler() {
    gil::irq_lock();
    sio::fifo_clear_errors();
    while let Some(word) = sio::fifo_read() {
        if word == IPI_NUDGE {
            arch::pend_switch_context();
            continue;
        }
        // A posted call: the sender pushed the argument right behind
        // the function pointer.
        let arg = sio::fifo_read_blocking() as usize as *mut c_void;
        // SAFETY: only call_on_core enqueues, and it sends a fn(ptr).
        let f: fn(*mut c_void) = unsafe { core::mem::transmute(word as usize) };
        f(arg);
    }
    gil::irq_unlock();
}

/// Pokes the other core so its next interrupt epilogue re-evaluates
/// the Running thread. Cheap and idempotent: if the FIFO is full the
/// other core has pending traffic that wakes it anyway.
pub(crate) fn nudge_other_core() {
    if sio::fifo_ready() {
        sio::fifo_write_blocking(IPI_NUDGE);
    }
}

/// Runs `f(arg)` on `core` in interrupt context under the GIL. Returns
/// without waiting for completion, except that a call targeted at the
/// calling core runs inline.
pub fn call_on_core(core: usize, f: fn(*mut c_void), arg: *mut c_void) {
    if core == arch::current_cpu_id() {
        let _gil = gil::GilGuard::new();
        f(arg);
        return;
    }
    sio::fifo_write_blocking(f as usize as u32);
    sio::fifo_write_blocking(arg as usize as u32);
}

/// Entry stub the second core lands on after the handshake: it fetches
/// its main function and argument from the FIFO, claims its IPI
/// interrupt, then runs.
extern "C" fn core1_entry() -> ! {
    let f: extern "C" fn(*mut c_void) =
        unsafe { core::mem::transmute(sio::fifo_read_blocking() as usize) };
    let arg = sio::fifo_read_blocking() as usize as *mut c_void;
    irq::register_irq_fn(IPI_IRQ[1], ipi_handler);
    sio::fifo_clear_errors();
    arch::enable_irq(arch::IrqNumber::new(IPI_IRQ[1] as u16));
    f(arg);
    panic!("secondary core main returned");
}

/// Boots the secondary core: drains the mailbox, walks the bootrom
/// handshake (0, 0, 1, vector table, stack, entry), then posts the
/// core's main function and argument for [`core1_entry`] to pick up.
/// Must run with the GIL held, before any shared kernel state is
/// handed to the other core.
pub fn init_smp(stack_top: usize, main: extern "C" fn(*mut c_void), arg: *mut c_void) {
    loop {
        sio::fifo_drain();
        if !handshake_send(0) {
            continue;
        }
        sio::fifo_drain();
        if !handshake_send(0) {
            continue;
        }
        if handshake_send(1) {
            break;
        }
    }
    if !handshake_send(arch::vector_table_base())
        || !handshake_send(stack_top as u32)
        || !handshake_send(core1_entry as usize as u32)
    {
        crate::error::fatal_error(crate::error::FatalKind::SmpHandshake);
    }
    // Consumed by core1_entry once the core is out of the bootrom.
    sio::fifo_write_blocking(main as usize as u32);
    sio::fifo_write_blocking(arg as usize as u32);
    irq::register_irq_fn(IPI_IRQ[0], ipi_handler);
    sio::fifo_clear_errors();
    arch::enable_irq(arch::IrqNumber::new(IPI_IRQ[0] as u16));
    log::debug!("secondary core released, main at {:p}", main as *const ());
    scheduler::yield_me_now_or_later();
}
