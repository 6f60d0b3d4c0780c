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

//! The ready table: one FIFO per priority level plus a bitmap of
//! non-empty levels. Numerically higher priority is more urgent, so the
//! next thread comes from the highest set bit.

use crate::{
    config::{MAX_THREAD_PRIORITY, NUM_PRIORITIES},
    sync::spinlock::SpinLock,
    thread::{self, OffsetOfSchedNode, Thread, ThreadNode},
    types::{ArcList, ThreadPriority, Uint},
};

type ReadyQueue = ArcList<Thread, OffsetOfSchedNode>;
type ReadyBits = u32;

#[derive(Debug)]
struct ReadyTable {
    active: ReadyBits,
    queues: [ReadyQueue; NUM_PRIORITIES],
}

// Protected by the spinlock around it.
unsafe impl Send for ReadyTable {}

impl ReadyTable {
    const fn const_new() -> Self {
        Self {
            active: 0,
            queues: [const { ReadyQueue::const_new() }; NUM_PRIORITIES],
        }
    }

    #[inline]
    fn set_active(&mut self, prio: ThreadPriority) {
        self.active |= 1 << prio;
    }

    #[inline]
    fn clear_active(&mut self, prio: ThreadPriority) {
        self.active &= !(1 << prio);
    }

    #[inline]
    fn highest_active(&self) -> Option<ThreadPriority> {
        if self.active == 0 {
            return None;
        }
        Some((ReadyBits::BITS - 1 - self.active.leading_zeros()) as ThreadPriority)
    }
}

static READY_TABLE: SpinLock<ReadyTable> = SpinLock::new(ReadyTable::const_new());

#[allow(clippy::assertions_on_constants)]
pub(crate) fn init() {
    assert!(ReadyBits::BITS as usize >= NUM_PRIORITIES);
    let mut tbl = READY_TABLE.irqsave_lock();
    for q in tbl.queues.iter_mut() {
        q.init();
    }
}

/// Makes `t` Ready if it is still in `old_state`. The exchange is what
/// arbitrates between racing wakers (timeout vs. signal): exactly one
/// of them enqueues the thread.
pub fn queue_ready_thread(old_state: Uint, t: ThreadNode) -> bool {
    assert_ne!(old_state, thread::READY);
    if !t.transfer_state(old_state, thread::READY) {
        return false;
    }
    let prio = t.priority();
    assert!(prio <= MAX_THREAD_PRIORITY);
    let mut tbl = READY_TABLE.irqsave_lock();
    tbl.queues[prio as usize].push_back(t);
    tbl.set_active(prio);
    true
}

/// Highest priority with a runnable thread, if any.
pub fn peek_highest() -> Option<ThreadPriority> {
    READY_TABLE.irqsave_lock().highest_active()
}

/// Pops the next thread to run, provided the best available priority
/// satisfies `accept`. One critical section, so the answer cannot go
/// stale between policy check and pop.
pub(crate) fn next_if(accept: impl Fn(ThreadPriority) -> bool) -> Option<ThreadNode> {
    let mut tbl = READY_TABLE.irqsave_lock();
    loop {
        let prio = tbl.highest_active()?;
        if !accept(prio) {
            return None;
        }
        let q = &mut tbl.queues[prio as usize];
        let Some(t) = q.pop_front() else {
            tbl.clear_active(prio);
            continue;
        };
        if q.is_empty() {
            tbl.clear_active(prio);
        }
        #[cfg(feature = "smp")]
        if t.is_on_cpu() {
            // Its context is not saved yet; leave it for the next
            // epilogue rather than running one thread on two cores.
            tbl.queues[prio as usize].push_back(t);
            tbl.set_active(prio);
            return None;
        }
        return Some(t);
    }
}

pub fn next_ready_thread() -> Option<ThreadNode> {
    next_if(|_| true)
}

/// Unlinks a Ready thread, e.g. before it is re-queued at a new
/// priority. Tolerates the thread having left the table already.
pub fn remove_from_ready(t: &ThreadNode) -> bool {
    let mut tbl = READY_TABLE.irqsave_lock();
    let prio = t.priority();
    if tbl.queues[prio as usize].remove(t) {
        if tbl.queues[prio as usize].is_empty() {
            tbl.clear_active(prio);
        }
        return true;
    }
    // Priority may have been changed while the thread sat queued; scan.
    for p in 0..NUM_PRIORITIES {
        if tbl.queues[p].remove(t) {
            if tbl.queues[p].is_empty() {
                tbl.clear_active(p as ThreadPriority);
            }
            return true;
        }
    }
    false
}

/// Moves a Ready thread to a new effective priority in one table
/// critical section.
pub(crate) fn requeue_ready_with_priority(t: &ThreadNode, p: ThreadPriority) {
    let mut tbl = READY_TABLE.irqsave_lock();
    let mut linked = false;
    for q in 0..NUM_PRIORITIES {
        if tbl.queues[q].remove(t) {
            if tbl.queues[q].is_empty() {
                tbl.clear_active(q as ThreadPriority);
            }
            linked = true;
            break;
        }
    }
    t.set_effective_priority(p);
    if linked {
        tbl.queues[p as usize].push_back(t.clone());
        tbl.set_active(p);
    }
}
