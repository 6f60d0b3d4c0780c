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

//! Reschedule and scheduler-entry assembly. Every context switch in the
//! kernel goes through PendSV: cooperative suspension pends it and lets
//! the exception epilogue do the save/restore, so there is exactly one
//! saved-frame shape (see `context.rs`).

use core::arch::naked_asm;

extern "C" {
    /// Kernel hook: receives the outgoing stack pointer after the full
    /// frame is saved, returns the stack pointer to resume. Runs with
    /// interrupts masked.
    fn osprey_switch_context_in_irq(old_sp: usize) -> usize;
}

/// Pendable service call: stores the software-saved half of the frame
/// below the hardware-stacked one, asks the scheduler for the next
/// stack, and unwinds symmetrically.
///
/// Exception is triggered by `pend_switch_context()`.
#[link_section = ".text.vector_handlers"]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV_Handler() {
    naked_asm!(
        "cpsid   i",
        "mrs     r0, psp",
        "mov     r2, lr",
        "mrs     r3, control",
        "stmdb   r0!, {{r2-r11}}",
        "bl      {hook}",
        "ldmia   r0!, {{r2-r11}}",
        "msr     control, r3",
        "isb",
        "mov     lr, r2",
        "msr     psp, r0",
        "cpsie   i",
        "bx      lr",
        hook = sym osprey_switch_context_in_irq,
    )
}

/// Moves thread-mode execution onto the process stack and jumps to the
/// schedule loop. Called once per core at the end of boot; never
/// returns.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn start_schedule(_entry: extern "C" fn() -> !) -> ! {
    naked_asm!(
        "mrs     r1, msp",
        "msr     psp, r1",
        "movs    r2, #2",
        "msr     control, r2",
        "isb",
        "bx      r0",
    )
}
