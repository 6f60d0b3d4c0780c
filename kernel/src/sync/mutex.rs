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

//! Thread mutex with priority inheritance. Two flavors share the
//! implementation: the fast one treats a relock by the owner as a
//! fault, the recursive one counts nesting. Unlocking hands the mutex
//! directly to the first waiter, and the owner's effective priority is
//! recomputed from the waiters of everything it still owns.

use super::{
    spinlock::SpinLock,
    wait_queue::{WaitEntry, WaitQueue},
};
use crate::{
    error::{fatal_error, FatalKind, TimeoutResult},
    irq, scheduler, thread,
    thread::{Thread, ThreadCtl, ThreadNode},
    time,
    types::{impl_intrusive_adapter, Arc, ArcList, IlistHead, ThreadPriority},
};
use core::sync::atomic::{AtomicU32, Ordering};

impl_intrusive_adapter!(OffsetOfMutexNode, Mutex, mutex_node);

/// Per-thread list of owned mutexes, linked through `mutex_node`.
pub(crate) type MutexList = ArcList<Mutex, OffsetOfMutexNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    /// Relock by the owner is a programming fault.
    Fast,
    /// Relock by the owner nests.
    Recursive,
}

#[derive(Debug)]
pub struct Mutex {
    kind: MutexKind,
    // The wait queue lock serializes lock/unlock; the owner slot has
    // its own lock so the inheritance chain can be walked without
    // taking foreign wait queues.
    pending: SpinLock<WaitQueue>,
    owner: SpinLock<Option<ThreadNode>>,
    nesting: AtomicU32,
    pub(crate) mutex_node: IlistHead<Mutex, OffsetOfMutexNode>,
}

unsafe impl Sync for Mutex {}

impl Mutex {
    /// A mutex must live inside an `Arc` (see [`Mutex::create`]) or a
    /// `static_arc!` block: ownership tracking links it into the
    /// owner's mutex list by its embedded node.
    pub const fn new(kind: MutexKind) -> Self {
        Self {
            kind,
            pending: SpinLock::new(WaitQueue::const_new()),
            owner: SpinLock::new(None),
            nesting: AtomicU32::new(0),
            mutex_node: IlistHead::const_new(),
        }
    }

    pub fn init(&self) -> bool {
        self.pending.irqsave_lock().init()
    }

    pub fn create(kind: MutexKind) -> Arc<Self> {
        let m = Arc::new(Self::new(kind));
        m.init();
        m
    }

    #[inline]
    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    #[inline]
    pub(crate) fn nesting(&self) -> u32 {
        self.nesting.load(Ordering::Relaxed)
    }

    fn self_arc(&self) -> Arc<Mutex> {
        // SAFETY: mutexes are only constructed inside an ArcInner, see
        // the constructor contract.
        unsafe { MutexList::make_arc_from(&self.mutex_node) }
    }

    pub fn owner(&self) -> Option<ThreadNode> {
        self.owner.irqsave_lock().clone()
    }

    fn set_owner(&self, t: Option<ThreadNode>) {
        *self.owner.irqsave_lock() = t;
    }

    fn grant_to(&self, t: &ThreadNode) {
        self.set_owner(Some(t.clone()));
        self.nesting.store(1, Ordering::Relaxed);
        t.ctl().irqsave_lock().owned_mutexes.push_back(self.self_arc());
    }

    fn acquire(&self, deadline: Option<i64>) -> TimeoutResult {
        assert!(!irq::is_in_irq());
        let me = scheduler::current_thread();
        loop {
            let mut w = self.pending.irqsave_lock();
            let owner = self.owner();
            match owner {
                None => {
                    debug_assert_eq!(self.nesting(), 0);
                    self.grant_to(&me);
                    return TimeoutResult::NoTimeout;
                }
                Some(o) if Thread::id(&o) == Thread::id(&me) => {
                    match self.kind {
                        MutexKind::Recursive => {
                            self.nesting.fetch_add(1, Ordering::Relaxed);
                            return TimeoutResult::NoTimeout;
                        }
                        MutexKind::Fast => {
                            drop(w);
                            fatal_error(FatalKind::MutexRelock);
                        }
                    }
                }
                Some(owner) => {
                    if let Some(d) = deadline {
                        if time::now() >= d {
                            return TimeoutResult::Timeout;
                        }
                    }
                    me.ctl().irqsave_lock().pend_mutex = Some(self.self_arc());
                    boost_chain(owner, me.priority());
                    let entry = WaitEntry::new(me.clone());
                    w.push_back(entry.clone());
                    scheduler::park_current(w, thread::WAITING, deadline);
                    let mut w = self.pending.irqsave_lock();
                    me.ctl().irqsave_lock().pend_mutex = None;
                    if entry.taken() {
                        // unlock() handed ownership over before waking us.
                        return TimeoutResult::NoTimeout;
                    }
                    if entry.is_queued() {
                        w.remove(&entry);
                    }
                }
            }
        }
    }

    /// Acquires, blocking with priority inheritance while contended.
    pub fn lock(&self) {
        let r = self.acquire(None);
        debug_assert!(!r.timed_out());
    }

    /// Acquires or gives up at `deadline` (monotonic ns).
    pub fn timed_lock(&self, deadline: i64) -> TimeoutResult {
        self.acquire(Some(deadline))
    }

    /// Non-blocking acquire. Owner relock behaves as in [`Mutex::lock`].
    pub fn try_lock(&self) -> bool {
        assert!(!irq::is_in_irq());
        let me = scheduler::current_thread();
        let _w = self.pending.irqsave_lock();
        match self.owner() {
            None => {
                self.grant_to(&me);
                true
            }
            Some(o) if Thread::id(&o) == Thread::id(&me) => match self.kind {
                MutexKind::Recursive => {
                    self.nesting.fetch_add(1, Ordering::Relaxed);
                    true
                }
                MutexKind::Fast => false,
            },
            Some(_) => false,
        }
    }

    /// Releases the mutex. Only the owner may unlock; a recursive mutex
    /// unlocks when the nesting count returns to zero. The first waiter
    /// (FIFO) becomes the owner directly.
    pub fn unlock(&self) {
        let me = scheduler::current_thread();
        let mut w = self.pending.irqsave_lock();
        match self.owner() {
            Some(o) if Thread::id(&o) == Thread::id(&me) => {}
            _ => {
                drop(w);
                fatal_error(FatalKind::MutexUnlockNotOwner);
            }
        }
        if self.kind == MutexKind::Recursive && self.nesting.load(Ordering::Relaxed) > 1 {
            self.nesting.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        self.release_and_handoff(&me, &mut w);
        drop(w);
        scheduler::yield_me_now_or_later();
    }

    /// Full release regardless of nesting depth; returns the depth so
    /// a condition variable can restore it after re-acquiring.
    pub(crate) fn release_all(&self) -> u32 {
        let me = scheduler::current_thread();
        let mut w = self.pending.irqsave_lock();
        match self.owner() {
            Some(o) if Thread::id(&o) == Thread::id(&me) => {}
            _ => {
                drop(w);
                fatal_error(FatalKind::MutexUnlockNotOwner);
            }
        }
        let depth = self.nesting.load(Ordering::Relaxed);
        self.release_and_handoff(&me, &mut w);
        drop(w);
        scheduler::yield_me_now_or_later();
        depth
    }

    pub(crate) fn restore_nesting(&self, depth: u32) {
        debug_assert_eq!(self.nesting.load(Ordering::Relaxed), 1);
        self.nesting.store(depth.max(1), Ordering::Relaxed);
    }

    fn release_and_handoff(
        &self,
        me: &ThreadNode,
        w: &mut crate::sync::spinlock::SpinLockGuard<'_, WaitQueue>,
    ) {
        {
            let mut ctl = me.ctl().irqsave_lock();
            let this = self.self_arc();
            ctl.owned_mutexes.remove(&this);
        }
        restore_priority(me);
        match w.pop_front() {
            None => {
                self.set_owner(None);
                self.nesting.store(0, Ordering::Relaxed);
            }
            Some(entry) => {
                let next = entry.thread.clone();
                self.grant_to(&next);
                entry.mark_taken();
                // The exchange fails only when the waiter's timeout
                // raced the handoff; it is Ready then and will see the
                // taken mark, so ownership still lands exactly once.
                let _ = scheduler::queue_ready_thread(thread::WAITING, next);
            }
        }
    }
}

/// Walks the chain of blocked owners, raising every effective priority
/// below `prio`. Bounded by the chain of mutexes actually held.
fn boost_chain(mut owner: ThreadNode, prio: ThreadPriority) {
    loop {
        if owner.priority() >= prio {
            return;
        }
        if owner.state() == thread::READY {
            scheduler::requeue_ready_with_priority(&owner, prio);
        } else {
            owner.set_effective_priority(prio);
        }
        let next_mutex = owner.ctl().irqsave_lock().pend_mutex.clone();
        let Some(m) = next_mutex else {
            return;
        };
        let Some(next_owner) = m.owner() else {
            return;
        };
        owner = next_owner;
    }
}

/// Strongest waiter priority across every mutex the thread owns, the
/// inherited floor for its effective priority. Caller holds the
/// thread's control lock.
pub(crate) fn max_waiter_priority(ctl: &ThreadCtl) -> Option<ThreadPriority> {
    let mut strongest = None;
    for m in ctl.owned_mutexes.iter() {
        let w = m.pending.irqsave_lock();
        for entry in w.iter() {
            let p = entry.thread.priority();
            if strongest.map_or(true, |s| p > s) {
                strongest = Some(p);
            }
        }
    }
    strongest
}

/// Drops any inherited boost that is no longer justified: effective
/// priority returns to max(origin, strongest remaining waiter).
fn restore_priority(me: &ThreadNode) {
    let ctl = me.ctl().irqsave_lock();
    let origin = me.origin_priority();
    let effective = match max_waiter_priority(&ctl) {
        Some(p) if p > origin => p,
        _ => origin,
    };
    me.set_effective_priority(effective);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn lock_unlock_cycle() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Fast);
            m.lock();
            assert_eq!(m.nesting(), 1);
            assert!(m.owner().is_some());
            m.unlock();
            assert_eq!(m.nesting(), 0);
            assert!(m.owner().is_none());
        });
    }

    #[test]
    fn recursive_nesting_counts() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Recursive);
            for depth in 1..=10u32 {
                m.lock();
                assert_eq!(m.nesting(), depth);
            }
            for depth in (1..=10u32).rev() {
                assert_eq!(m.nesting(), depth);
                m.unlock();
            }
            assert_eq!(m.nesting(), 0);
            assert!(m.owner().is_none());
        });
    }

    #[test]
    fn try_lock_on_owned_fast_mutex_fails() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Fast);
            assert!(m.try_lock());
            assert!(!m.try_lock());
            m.unlock();
            assert!(m.try_lock());
            m.unlock();
        });
    }

    #[test]
    fn try_lock_on_owned_recursive_mutex_nests() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Recursive);
            assert!(m.try_lock());
            assert!(m.try_lock());
            assert_eq!(m.nesting(), 2);
            m.unlock();
            m.unlock();
            assert_eq!(m.nesting(), 0);
        });
    }

    #[test]
    fn owner_tracks_the_owned_mutex_list() {
        testing::with_kernel(|| {
            let me = scheduler::current_thread();
            let a = Mutex::create(MutexKind::Fast);
            let b = Mutex::create(MutexKind::Fast);
            a.lock();
            b.lock();
            assert_eq!(me.ctl().irqsave_lock().owned_mutexes.len(), 2);
            b.unlock();
            assert_eq!(me.ctl().irqsave_lock().owned_mutexes.len(), 1);
            a.unlock();
            assert_eq!(me.ctl().irqsave_lock().owned_mutexes.len(), 0);
        });
    }

    #[test]
    fn priority_restores_to_origin_when_nothing_is_owned() {
        testing::with_kernel(|| {
            let me = scheduler::current_thread();
            let origin = me.origin_priority();
            let m = Mutex::create(MutexKind::Fast);
            m.lock();
            // Simulate the boost a higher-priority waiter would apply.
            me.set_effective_priority(origin + 3);
            m.unlock();
            assert_eq!(me.priority(), origin);
        });
    }

    #[test]
    #[should_panic(expected = "MutexUnlockNotOwner")]
    fn unlock_of_free_mutex_is_fatal() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Fast);
            m.unlock();
        });
    }

    #[test]
    #[should_panic(expected = "MutexRelock")]
    fn fast_mutex_relock_is_fatal() {
        testing::with_kernel(|| {
            let m = Mutex::create(MutexKind::Fast);
            m.lock();
            m.lock();
        });
    }
}
