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

//! Compile-time kernel configuration. Every knob here is a constant:
//! there is no runtime configuration surface. The `smp` feature is the
//! only switch that changes the shape of the kernel.

#![no_std]

pub const NUM_CORES: usize = get_num_cores();

const fn get_num_cores() -> usize {
    if cfg!(feature = "smp") {
        2
    } else {
        1
    }
}

/// Number of scheduling priority levels. Priorities run 0..NUM_PRIORITIES,
/// numerically higher means more urgent.
pub const NUM_PRIORITIES: usize = 32;

/// Priority of the per-core idle threads. Nothing may be scheduled below
/// them.
pub const IDLE_THREAD_PRIORITY: u8 = 0;

pub const MAIN_THREAD_PRIORITY: u8 = (NUM_PRIORITIES / 2) as u8;

/// Periodic slice tick used for round-robin rotation among equal
/// priorities. Timed wakeups are programmed as one-shot deadlines and do
/// not depend on this rate.
pub const TICKS_PER_SECOND: usize = 1000;

/// Ticks a thread may run before yielding to an equal-priority peer.
pub const ROBIN_SLICE_TICKS: usize = 10;

/// Core clock feeding the cycle counter on bare-metal boards.
pub const SYSTEM_CLOCK_HZ: u64 = 150_000_000;

/// Length of the interrupt dispatch table. Dense ids 0..IRQ_TABLE_LEN.
pub const IRQ_TABLE_LEN: usize = 32;

/// Interrupt ids of the per-core mailbox (IPI) interrupts, SIO
/// FIFO numbering on RP2040-class parts.
pub const IPI_IRQ: [usize; 2] = [15, 16];

pub const ALIGN_SIZE: usize = 8;

pub const DEFAULT_STACK_SIZE: usize = 4096;
pub const SYSTEM_THREAD_STACK_SIZE: usize = 4096;
pub const IDLE_THREAD_STACK_SIZE: usize = 2048;
pub const MAIN_THREAD_STACK_SIZE: usize = 8192;
