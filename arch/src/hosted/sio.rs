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

//! Emulated SIO block: atomics stand in for the hardware spinlocks and a
//! loopback queue for the inter-core FIFO, so SMP code paths compile and
//! their bookkeeping can be tested single-core.

use core::sync::atomic::{AtomicBool, Ordering};
use std::{collections::VecDeque, sync::Mutex};

pub const NUM_SPINLOCKS: usize = 32;

static SPINLOCKS: [AtomicBool; NUM_SPINLOCKS] =
    [const { AtomicBool::new(false) }; NUM_SPINLOCKS];

static FIFO: Mutex<VecDeque<u32>> = Mutex::new(VecDeque::new());

#[inline]
pub fn cpu_id() -> usize {
    0
}

#[inline]
pub fn spinlock_try_lock(n: usize) -> bool {
    SPINLOCKS[n]
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
}

#[inline]
pub fn spinlock_lock(n: usize) {
    while !spinlock_try_lock(n) {
        core::hint::spin_loop();
    }
}

#[inline]
pub fn spinlock_unlock(n: usize) {
    SPINLOCKS[n].store(false, Ordering::Release);
}

#[inline]
pub fn fifo_ready() -> bool {
    true
}

#[inline]
pub fn fifo_valid() -> bool {
    !FIFO.lock().unwrap().is_empty()
}

#[inline]
pub fn fifo_clear_errors() {}

pub fn fifo_drain() {
    FIFO.lock().unwrap().clear();
}

pub fn fifo_write_blocking(v: u32) {
    FIFO.lock().unwrap().push_back(v);
}

pub fn fifo_read_blocking() -> u32 {
    loop {
        if let Some(v) = FIFO.lock().unwrap().pop_front() {
            return v;
        }
        std::thread::yield_now();
    }
}

pub fn fifo_read() -> Option<u32> {
    FIFO.lock().unwrap().pop_front()
}
