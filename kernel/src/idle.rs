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

//! Per-core idle threads. They run whenever nothing else is Ready,
//! reclaim exited detached threads, and drop the core into low power
//! unless a deep-sleep lock forbids it. Idle threads never enter the
//! ready table; the scheduler falls back to them explicitly.

use crate::{
    config::{IDLE_THREAD_PRIORITY, NUM_CORES},
    support,
    sync::spinlock::SpinLock,
    thread::{
        build_static_thread, Entry, GlobalQueue, OffsetOfSchedNode, SystemThreadStorage, Thread,
        ThreadKind, ThreadNode, CREATED,
    },
    types::ArcList,
};
use core::mem::MaybeUninit;
use osprey_arch as arch;

static IDLE_STORAGE: [SystemThreadStorage; NUM_CORES] =
    [const { SystemThreadStorage::const_new(ThreadKind::Idle) }; NUM_CORES];

static mut IDLE_THREADS: [MaybeUninit<ThreadNode>; NUM_CORES] =
    [const { MaybeUninit::uninit() }; NUM_CORES];

type ZombieList = ArcList<Thread, OffsetOfSchedNode>;

struct Zombies {
    list: ZombieList,
}

// Protected by the spinlock around it.
unsafe impl Send for Zombies {}

static ZOMBIES: SpinLock<Zombies> = SpinLock::new(Zombies {
    list: ZombieList::const_new(),
});

extern "C" fn idle_entry() {
    loop {
        idle_work();
    }
}

pub(crate) fn init_idle_threads() {
    ZOMBIES.irqsave_lock().list.init();
    for core in 0..NUM_CORES {
        // SAFETY: boot runs once, before any other access to the slots.
        let slot = unsafe { &mut *core::ptr::addr_of_mut!(IDLE_THREADS[core]) };
        build_static_thread(
            slot,
            &IDLE_STORAGE[core],
            IDLE_THREAD_PRIORITY,
            CREATED,
            Entry::C(idle_entry),
        );
    }
}

pub(crate) fn idle_thread(core: usize) -> ThreadNode {
    // SAFETY: written during scheduler init, read-only afterwards.
    unsafe { (*core::ptr::addr_of!(IDLE_THREADS[core])).assume_init_ref() }.clone()
}

/// Queues an exited detached thread for reclamation.
pub(crate) fn push_zombie(t: ThreadNode) {
    ZOMBIES.irqsave_lock().list.push_back(t);
}

fn reap_zombies() {
    loop {
        let t = {
            let mut z = ZOMBIES.irqsave_lock();
            let Some(t) = z.list.pop_front() else {
                return;
            };
            if t.is_on_cpu() {
                // Its exit path has not saved context yet; retry on the
                // next idle pass.
                z.list.push_back(t);
                return;
            }
            t
        };
        GlobalQueue::remove(&t);
        // Dropping the last reference frees stack and descriptor.
        drop(t);
    }
}

/// One pass of the idle loop: reap, then wait for something to happen.
pub(crate) fn idle_work() {
    reap_zombies();
    if support::deep_sleep_allowed() {
        arch::deep_sleep();
    } else {
        arch::wait_for_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn zombie_reaping_releases_the_thread() {
        testing::with_kernel(|| {
            let t = crate::thread::Builder::new(Entry::C(idle_entry))
                .set_detached(true)
                .build()
                .unwrap();
            let before = GlobalQueue::len();
            // Simulate the retire path of a detached thread.
            unsafe { t.set_state(crate::thread::DETACHED) };
            push_zombie(t.clone());
            drop(t);
            reap_zombies();
            assert_eq!(GlobalQueue::len(), before - 1);
        });
    }
}
