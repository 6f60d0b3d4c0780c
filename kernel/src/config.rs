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

pub use osprey_kconfig::{
    ALIGN_SIZE, DEFAULT_STACK_SIZE, IDLE_THREAD_PRIORITY, IDLE_THREAD_STACK_SIZE, IRQ_TABLE_LEN,
    MAIN_THREAD_PRIORITY, MAIN_THREAD_STACK_SIZE, NUM_CORES, NUM_PRIORITIES, ROBIN_SLICE_TICKS,
    SYSTEM_THREAD_STACK_SIZE, TICKS_PER_SECOND,
};

use crate::types::ThreadPriority;

pub const MAX_THREAD_PRIORITY: ThreadPriority = (NUM_PRIORITIES - 1) as ThreadPriority;

/// Rate of the counter behind the monotonic clock. The hosted backend
/// counts nanoseconds directly.
pub const CYCLES_PER_SEC: u64 = if cfg!(target_os = "none") {
    osprey_kconfig::SYSTEM_CLOCK_HZ
} else {
    1_000_000_000
};

pub const NSEC_PER_SEC: u64 = 1_000_000_000;

pub const NSEC_PER_TICK: i64 = (NSEC_PER_SEC as usize / TICKS_PER_SECOND) as i64;
