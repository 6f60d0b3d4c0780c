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

//! osprey: a preemptive, priority-based RTOS kernel core for 32-bit
//! MCUs. The crate is a library: boards call [`boot::start`] with their
//! main entry after low-level clock/RAM bring-up, and wire the vector
//! table to [`irq`]'s trampolines.

#![cfg_attr(target_os = "none", no_std)]

pub extern crate alloc;
pub use osprey_arch;
pub use osprey_kconfig;

pub mod allocator;
pub mod atomic;
pub mod boot;
pub mod config;
pub mod console;
pub mod error;
pub mod gil;
pub mod idle;
pub mod irq;
pub mod logger;
pub mod scheduler;
#[cfg(feature = "smp")]
pub mod smp;
pub mod support;
pub mod sync;
#[cfg(test)]
mod testing;
pub mod thread;
pub mod time;
pub mod types;

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    use osprey_arch as arch;
    arch::disable_local_irq();
    kprintln!("{}", info);

    #[cfg(debug_assertions)]
    loop {
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
    #[cfg(not(debug_assertions))]
    arch::sys_reset()
}
