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

//! Architecture port layer. The kernel sees one flat module of CPU
//! primitives; the backend is picked by target:
//!
//! - `arm_cortex_m`: bare-metal ARMv6-M/ARMv7-M/ARMv8-M. Interrupt
//!   masking through PRIMASK, rescheduling through PendSV, the cycle
//!   counter from DWT or SysTick, and (with the `smp` feature) the SIO
//!   hardware spinlocks and inter-core FIFO of RP2040-class parts.
//! - `hosted`: any target with an operating system. Masking and the
//!   cycle counter are emulated so the kernel's data paths can be unit
//!   tested; context switching is not available and aborts if reached.
//!
//! The kernel supplies `osprey_switch_context_in_irq` as the C-ABI hook
//! the reschedule interrupt calls between saving and restoring context.

#![cfg_attr(target_os = "none", no_std)]

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        mod arm_cortex_m;
        pub use arm_cortex_m::*;
    } else {
        mod hosted;
        pub use hosted::*;
    }
}
