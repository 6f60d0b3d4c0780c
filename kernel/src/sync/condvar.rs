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
    mutex::Mutex,
    spinlock::SpinLock,
    wait_queue::{WaitEntry, WaitQueue},
};
use crate::{
    error::TimeoutResult,
    irq, scheduler, thread,
    types::Arc,
};

/// Condition variable with FIFO wakeup order. It is not tied to one
/// mutex; the mutex to release and re-acquire travels with each wait.
/// The mutex is released fully (whatever its nesting depth) and the
/// depth restored after re-acquisition.
#[derive(Debug)]
pub struct Condvar {
    pending: SpinLock<WaitQueue>,
}

unsafe impl Sync for Condvar {}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            pending: SpinLock::new(WaitQueue::const_new()),
        }
    }

    pub fn init(&self) -> bool {
        self.pending.irqsave_lock().init()
    }

    pub fn create() -> Arc<Self> {
        let c = Arc::new(Self::new());
        c.init();
        c
    }

    fn wait_inner(&self, mutex: &Mutex, deadline: Option<i64>) -> TimeoutResult {
        assert!(!irq::is_in_irq());
        let me = scheduler::current_thread();
        let mut w = self.pending.irqsave_lock();
        let entry = WaitEntry::new(me.clone());
        w.push_back(entry.clone());
        // Parking and the mutex release are under the condvar lock, so
        // a signal between them is impossible: a signaller serialized
        // behind this critical section finds our entry queued.
        let depth = mutex.release_all();
        scheduler::park_current(w, thread::WAIT_CONDVAR, deadline);
        {
            let mut w = self.pending.irqsave_lock();
            if entry.is_queued() {
                w.remove(&entry);
            }
        }
        mutex.lock();
        mutex.restore_nesting(depth);
        if entry.taken() {
            TimeoutResult::NoTimeout
        } else {
            TimeoutResult::Timeout
        }
    }

    /// Releases `mutex`, parks until signalled, re-acquires `mutex`.
    /// The caller re-checks its predicate afterwards; wakeups may be
    /// spurious. The caller must own `mutex`.
    pub fn wait(&self, mutex: &Mutex) {
        let _ = self.wait_inner(mutex, None);
    }

    /// Like [`Condvar::wait`] with an absolute deadline. The mutex is
    /// re-acquired on both outcomes.
    pub fn timed_wait(&self, mutex: &Mutex, deadline: i64) -> TimeoutResult {
        self.wait_inner(mutex, Some(deadline))
    }

    /// Wakes the longest-waiting thread; it re-acquires the mutex on
    /// its own once scheduled.
    pub fn signal(&self) {
        let mut w = self.pending.irqsave_lock();
        if let Some(entry) = w.pop_front() {
            entry.mark_taken();
            let _ = scheduler::queue_ready_thread(thread::WAIT_CONDVAR, entry.thread.clone());
        }
        drop(w);
        scheduler::yield_me_now_or_later();
    }

    /// Wakes every waiter, in FIFO order.
    pub fn broadcast(&self) {
        let mut w = self.pending.irqsave_lock();
        while let Some(entry) = w.pop_front() {
            entry.mark_taken();
            let _ = scheduler::queue_ready_thread(thread::WAIT_CONDVAR, entry.thread.clone());
        }
        drop(w);
        scheduler::yield_me_now_or_later();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sync::mutex::MutexKind, testing, time};

    #[test]
    fn timed_wait_reports_timeout_and_reacquires() {
        testing::with_kernel(|| {
            let cv = Condvar::create();
            let m = Mutex::create(MutexKind::Fast);
            m.lock();
            let r = cv.timed_wait(&m, time::now() + 1_000_000);
            assert_eq!(r, TimeoutResult::Timeout);
            // The mutex came back locked by us.
            assert_eq!(m.nesting(), 1);
            m.unlock();
        });
    }

    #[test]
    fn timed_wait_restores_recursive_depth() {
        testing::with_kernel(|| {
            let cv = Condvar::create();
            let m = Mutex::create(MutexKind::Recursive);
            m.lock();
            m.lock();
            m.lock();
            assert_eq!(m.nesting(), 3);
            let r = cv.timed_wait(&m, time::now() + 500_000);
            assert_eq!(r, TimeoutResult::Timeout);
            assert_eq!(m.nesting(), 3);
            m.unlock();
            m.unlock();
            m.unlock();
            assert_eq!(m.nesting(), 0);
        });
    }

    #[test]
    fn signal_on_empty_condvar_is_lost_by_design() {
        testing::with_kernel(|| {
            let cv = Condvar::create();
            let m = Mutex::create(MutexKind::Fast);
            cv.signal();
            cv.broadcast();
            m.lock();
            // The earlier signals must not satisfy this wait.
            let r = cv.timed_wait(&m, time::now() + 500_000);
            assert_eq!(r, TimeoutResult::Timeout);
            m.unlock();
        });
    }
}
