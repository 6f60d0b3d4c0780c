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

use super::{
    spinlock::SpinLock,
    wait_queue::{WaitEntry, WaitQueue},
};
use crate::{
    error::TimeoutResult,
    irq, scheduler, thread,
    time,
    types::{Arc, Int},
};
use core::cell::Cell;

/// Counting semaphore. The spinlock around the wait queue protects the
/// counter too, which is what rules out lost wakeups: a `signal` that
/// sees no waiter increments the count, and a `wait` that sees a zero
/// count parks, in the same serialized critical section.
#[derive(Debug)]
pub struct Semaphore {
    counter: Cell<Int>,
    pending: SpinLock<WaitQueue>,
}

unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn const_new(counter: Int) -> Self {
        debug_assert!(counter >= 0);
        Self {
            counter: Cell::new(counter),
            pending: SpinLock::new(WaitQueue::const_new()),
        }
    }

    pub const fn new(counter: Int) -> Self {
        Self::const_new(counter)
    }

    pub fn init(&self) -> bool {
        self.pending.irqsave_lock().init()
    }

    pub fn create(counter: Int) -> Arc<Self> {
        let s = Arc::new(Self::new(counter));
        s.init();
        s
    }

    /// The stored count. Threads parked on the queue imply zero.
    pub fn count(&self) -> Int {
        let _w = self.pending.irqsave_lock();
        self.counter.get()
    }

    /// Non-blocking take.
    pub fn try_wait(&self) -> bool {
        let _w = self.pending.irqsave_lock();
        let old = self.counter.get();
        if old <= 0 {
            return false;
        }
        self.counter.set(old - 1);
        true
    }

    fn acquire(&self, deadline: Option<i64>) -> TimeoutResult {
        assert!(!irq::is_in_irq());
        loop {
            let mut w = self.pending.irqsave_lock();
            let old = self.counter.get();
            if old > 0 {
                self.counter.set(old - 1);
                return TimeoutResult::NoTimeout;
            }
            if let Some(d) = deadline {
                if time::now() >= d {
                    return TimeoutResult::Timeout;
                }
            }
            let entry = WaitEntry::new(scheduler::current_thread());
            w.push_back(entry.clone());
            scheduler::park_current(w, thread::WAITING, deadline);
            let mut w = self.pending.irqsave_lock();
            if entry.taken() {
                // A signal dequeued us and handed the token over
                // directly; the count was never incremented.
                return TimeoutResult::NoTimeout;
            }
            if entry.is_queued() {
                w.remove(&entry);
            }
        }
    }

    /// Takes one token, blocking as long as it takes.
    pub fn wait(&self) {
        let r = self.acquire(None);
        debug_assert!(!r.timed_out());
    }

    /// Takes one token or gives up at `deadline` (monotonic ns). A
    /// deadline already in the past reports Timeout without parking.
    pub fn timed_wait(&self, deadline: i64) -> TimeoutResult {
        self.acquire(Some(deadline))
    }

    /// Releases one token: hands it to the first waiter if there is
    /// one, otherwise increments the count.
    pub fn signal(&self) {
        let mut w = self.pending.irqsave_lock();
        match w.pop_front() {
            None => {
                self.counter.set(self.counter.get() + 1);
            }
            Some(entry) => {
                entry.mark_taken();
                // The exchange fails if the waiter's timeout fired in
                // parallel; it is Ready either way and will observe the
                // taken mark, so the token is not lost.
                let _ = scheduler::queue_ready_thread(thread::WAITING, entry.thread.clone());
            }
        }
        drop(w);
        scheduler::yield_me_now_or_later();
    }

    /// Interrupt-context release. Same semantics as [`signal`]; the
    /// reschedule it requests runs at the interrupt epilogue.
    pub fn irq_signal(&self) {
        self.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn count_and_try_wait() {
        testing::with_kernel(|| {
            let sem = Semaphore::create(2);
            assert_eq!(sem.count(), 2);
            assert!(sem.try_wait());
            assert!(sem.try_wait());
            assert_eq!(sem.count(), 0);
            assert!(!sem.try_wait());
            assert_eq!(sem.count(), 0);
            sem.signal();
            assert_eq!(sem.count(), 1);
        });
    }

    #[test]
    fn wait_consumes_available_tokens_without_parking() {
        testing::with_kernel(|| {
            let sem = Semaphore::create(3);
            sem.wait();
            sem.wait();
            assert_eq!(sem.count(), 1);
            assert_eq!(sem.timed_wait(time::now() + 1_000_000), TimeoutResult::NoTimeout);
            assert_eq!(sem.count(), 0);
        });
    }

    #[test]
    fn timed_wait_on_elapsed_deadline_does_not_park() {
        testing::with_kernel(|| {
            let sem = Semaphore::create(0);
            assert_eq!(sem.timed_wait(time::now()), TimeoutResult::Timeout);
            assert_eq!(sem.timed_wait(time::now() - 5), TimeoutResult::Timeout);
            assert_eq!(sem.count(), 0);
        });
    }

    #[test]
    fn timed_wait_expires_after_the_deadline() {
        testing::with_kernel(|| {
            let sem = Semaphore::create(0);
            let deadline = time::now() + 2_000_000; // 2 ms
            assert_eq!(sem.timed_wait(deadline), TimeoutResult::Timeout);
            assert!(time::now() >= deadline);
        });
    }

    #[test]
    fn signal_then_wait_round_trip() {
        testing::with_kernel(|| {
            let sem = Semaphore::create(0);
            for _ in 0..5 {
                sem.signal();
            }
            assert_eq!(sem.count(), 5);
            for _ in 0..5 {
                sem.wait();
            }
            assert_eq!(sem.count(), 0);
        });
    }

    #[test]
    fn producer_consumer_counts_balance() {
        // The single-threaded projection of the two-semaphore
        // producer/consumer exchange: counts end where they started and
        // the try_wait pair observes (true, false) at the empty point.
        testing::with_kernel(|| {
            let producer = Semaphore::create(5);
            let consumer = Semaphore::create(5);
            for _ in 0..5 {
                producer.wait();
            }
            for _ in 0..4 {
                consumer.wait();
            }
            assert!(consumer.try_wait());
            assert!(!consumer.try_wait());
            for _ in 0..10 {
                producer.signal();
                consumer.signal();
            }
            for _ in 0..10 {
                producer.wait();
                consumer.wait();
            }
            // Signals and waits balance: each side is back where the
            // prologue left it.
            assert_eq!(producer.count(), 0);
            assert_eq!(consumer.count(), 0);
            for _ in 0..5 {
                producer.signal();
                consumer.signal();
            }
            assert_eq!(producer.count(), 5);
            assert_eq!(consumer.count(), 5);
        });
    }
}
