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

//! Timed wakeups: threads ordered by ascending absolute deadline. The
//! tick pops every expired entry; a thread woken early (signal,
//! explicit wakeup) unlinks itself on resume.

use crate::{
    sync::spinlock::SpinLock,
    thread::{self, OffsetOfTimerNode, Thread, ThreadNode},
    types::{ArcList, ThreadPriority},
};

type SleepList = ArcList<Thread, OffsetOfTimerNode>;

struct SleepQueue {
    list: SleepList,
}

// Protected by the spinlock around it.
unsafe impl Send for SleepQueue {}

static SLEEP_QUEUE: SpinLock<SleepQueue> = SpinLock::new(SleepQueue {
    list: SleepList::const_new(),
});

pub(crate) fn init() {
    SLEEP_QUEUE.irqsave_lock().list.init();
}

fn deadline_of(t: &Thread) -> i64 {
    t.ctl().irqsave_lock().wakeup_at
}

/// Arms a wakeup for `t` at `deadline` (monotonic ns). Caller has
/// already moved the thread out of Running.
pub(crate) fn insert(t: ThreadNode, deadline: i64) {
    t.ctl().irqsave_lock().wakeup_at = deadline;
    let mut q = SLEEP_QUEUE.irqsave_lock();
    q.list
        .insert_sorted_by(t, |me, other| deadline_of(me) < deadline_of(other));
}

/// Unlinks `t` if its deadline has not fired. Idempotent.
pub(crate) fn remove(t: &ThreadNode) -> bool {
    let mut q = SLEEP_QUEUE.irqsave_lock();
    if t.timer_node.is_detached() {
        return false;
    }
    q.list.remove(t)
}

/// Releases every entry whose deadline passed. Returns the strongest
/// priority among the threads actually woken here, for the caller's
/// reschedule decision.
pub(crate) fn pop_expired(now: i64) -> Option<ThreadPriority> {
    let mut strongest = None;
    loop {
        let expired = {
            let mut q = SLEEP_QUEUE.irqsave_lock();
            match q.list.front() {
                Some(front) if deadline_of(&front) <= now => {
                    q.list.pop_front();
                    Some(front)
                }
                _ => None,
            }
        };
        let Some(t) = expired else {
            return strongest;
        };
        // Whoever wins the state exchange delivers the wakeup; a racing
        // signal already made the thread Ready and we only unlinked it.
        for from in [thread::SLEEPING, thread::WAITING, thread::WAIT_CONDVAR] {
            if super::queue_ready_thread(from, t.clone()) {
                let p = t.priority();
                if strongest.map_or(true, |s| p > s) {
                    strongest = Some(p);
                }
                break;
            }
        }
    }
}

/// Earliest armed deadline, for diagnostics and tickless idle.
pub fn next_deadline() -> Option<i64> {
    let q = SLEEP_QUEUE.irqsave_lock();
    q.list.front().map(|t| deadline_of(&t))
}
