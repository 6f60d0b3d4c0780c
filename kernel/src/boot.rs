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

//! Boot tail. Boards call [`start`] from their reset path once RAM and
//! clocks are usable: it stands the kernel up, spawns the main thread
//! and turns the boot stack into core 0's idle loop. The board is also
//! expected to route its vector table through `irq::IRQ_TRAMPOLINES`
//! and its tick interrupt to `time::handle_tick_increment`.

use crate::{config, logger, scheduler, thread, time};
use log::debug;
use osprey_arch as arch;

#[cfg(target_os = "none")]
extern "C" {
    static mut __heap_start: u8;
    static mut __heap_end: u8;
}

#[cfg(target_os = "none")]
fn init_heap() {
    use core::ptr::addr_of_mut;
    // SAFETY: the linker script reserves this region for the heap.
    unsafe {
        let start = addr_of_mut!(__heap_start);
        let size = addr_of_mut!(__heap_end) as usize - start as usize;
        crate::allocator::init_heap(start, size);
    }
}

#[cfg(not(target_os = "none"))]
fn init_heap() {}

/// Brings the kernel up and never returns. `main` runs as the first
/// thread at the default priority.
pub fn start(main: extern "C" fn()) -> ! {
    init_heap();
    logger::init();
    time::clock_init();
    scheduler::init();
    debug!("kernel core up, spawning main");
    let t = thread::Builder::new(thread::Entry::C(main))
        .set_priority(config::MAIN_THREAD_PRIORITY)
        .set_stack_size(config::MAIN_THREAD_STACK_SIZE)
        .start();
    assert!(t.is_some(), "main thread allocation failed");
    // SAFETY: one-way trip into the schedule loop.
    unsafe { arch::start_schedule(scheduler::schedule) }
}
