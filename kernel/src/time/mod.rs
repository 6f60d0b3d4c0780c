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

//! Monotonic time. A free-running 32-bit cycle counter is widened to 64
//! bits in software; [`now`] converts to nanoseconds and is callable
//! from thread or interrupt context, with interrupts enabled or not.

use crate::{
    config::{CYCLES_PER_SEC, NSEC_PER_SEC, NSEC_PER_TICK},
    scheduler,
    sync::spinlock::SpinLock,
};
use core::sync::atomic::{AtomicUsize, Ordering};
use osprey_arch as arch;

/// Absolute-deadline sentinel for waits that never expire.
pub const WAITING_FOREVER: i64 = i64::MAX;

#[derive(Debug, Default)]
struct ClockState {
    hi: u32,
    last_lo: u32,
}

// The widening works by observation: every read compares the raw
// counter with the previously seen value and carries into the high
// word on wrap-around. The periodic tick reads the clock, so at least
// one observation is guaranteed per counter period.
impl ClockState {
    fn extend(&mut self, lo: u32) -> u64 {
        if lo < self.last_lo {
            self.hi += 1;
        }
        self.last_lo = lo;
        ((self.hi as u64) << 32) | lo as u64
    }
}

static CLOCK: SpinLock<ClockState> = SpinLock::new(ClockState { hi: 0, last_lo: 0 });

static TICKS: AtomicUsize = AtomicUsize::new(0);

pub fn clock_init() {
    arch::cycle_counter_init();
}

/// Cycles since boot, widened to 64 bits.
pub fn now_cycles() -> u64 {
    let mut state = CLOCK.irqsave_lock();
    let lo = arch::cycle_count();
    state.extend(lo)
}

#[inline]
fn cycles_to_ns(cycles: u64) -> i64 {
    (cycles as u128 * NSEC_PER_SEC as u128 / CYCLES_PER_SEC as u128) as i64
}

#[inline]
fn ns_to_cycles(ns: i64) -> u64 {
    (ns as u128 * CYCLES_PER_SEC as u128 / NSEC_PER_SEC as u128) as u64
}

/// Nanoseconds since boot.
pub fn now() -> i64 {
    cycles_to_ns(now_cycles())
}

/// Spin-waits `ns` nanoseconds against the monotonic clock. Safe with
/// interrupts disabled; used by drivers for short hardware settle
/// times.
pub fn busy_delay_ns(ns: i64) {
    let end = now_cycles() + ns_to_cycles(ns);
    while now_cycles() < end {
        core::hint::spin_loop();
    }
}

pub fn busy_delay_us(us: i64) {
    busy_delay_ns(us * 1_000);
}

pub fn busy_delay_ms(ms: i64) {
    busy_delay_ns(ms * 1_000_000);
}

pub fn get_sys_ticks() -> usize {
    TICKS.load(Ordering::Relaxed)
}

/// Periodic tick entry: rotates equal-priority threads and releases
/// expired sleepers. Boards wire their tick interrupt (SysTick on
/// Cortex-M) here.
pub extern "C" fn handle_tick_increment() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    scheduler::handle_tick(now());
}

pub fn tick_to_ns(ticks: usize) -> i64 {
    ticks as i64 * NSEC_PER_TICK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_carries_on_wraparound() {
        let mut s = ClockState::default();
        assert_eq!(s.extend(100), 100);
        assert_eq!(s.extend(0xffff_fff0), 0xffff_fff0);
        // The raw counter wrapped; the high word must carry.
        assert_eq!(s.extend(5), 0x1_0000_0005);
        assert_eq!(s.extend(5), 0x1_0000_0005);
        assert_eq!(s.extend(4), 0x2_0000_0004);
    }

    #[test]
    fn now_is_monotonic() {
        let mut last = now();
        for _ in 0..1000 {
            let t = now();
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn busy_delay_us_lower_bound() {
        for &us in &[100i64, 500, 2000] {
            let start = now();
            busy_delay_us(us);
            let delta = now() - start;
            assert!(delta >= us * 1_000, "slept {} ns for {} us", delta, us);
            // Generous upper bound: the host scheduler adds jitter the
            // real target does not have.
            assert!(delta < us * 1_000 + 50_000_000);
        }
    }

    #[test]
    fn busy_delay_works_with_interrupts_masked() {
        let _g = crate::support::FastInterruptGuard::new();
        let start = now();
        busy_delay_us(200);
        assert!(now() - start >= 200_000);
    }
}
