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

extern crate alloc;
use super::{Entry, GlobalQueue, Stack, Thread, ThreadKind, ThreadNode, CREATED};
use crate::{
    config, scheduler,
    types::{ArcInner, ThreadPriority, Uint},
};
use alloc::boxed::Box;
use core::{mem::MaybeUninit, sync::atomic::Ordering};
use osprey_arch as arch;

/// # Safety
/// Caller must ensure no other reference to `*r` is live for the
/// duration the returned pointer is used mutably.
#[inline(always)]
unsafe fn as_mut_ptr(r: &Thread) -> *mut Thread {
    r as *const Thread as *mut Thread
}

/// Spawns a thread running `f` at the default priority. Returns `None`
/// when the stack allocation fails; by configuration this is reported
/// as a value, not a fault.
pub fn spawn<F>(f: F) -> Option<ThreadNode>
where
    F: FnOnce() -> usize + Send + 'static,
{
    Builder::new(Entry::Closure(Box::new(f))).start()
}

pub struct Builder {
    entry: Entry,
    stack_size: usize,
    priority: ThreadPriority,
    detached: bool,
}

impl Builder {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            stack_size: config::DEFAULT_STACK_SIZE,
            priority: config::MAIN_THREAD_PRIORITY,
            detached: false,
        }
    }

    #[inline]
    pub fn set_priority(mut self, p: ThreadPriority) -> Self {
        assert!(p <= config::MAX_THREAD_PRIORITY);
        self.priority = p;
        self
    }

    #[inline]
    pub fn set_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    #[inline]
    pub fn set_detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    pub fn build(self) -> Option<ThreadNode> {
        let min = core::mem::size_of::<arch::Context>() + arch::EXTRA_STACK_RESERVE;
        let Some(stack) = Stack::try_with_size(self.stack_size.max(min)) else {
            log::warn!("thread stack allocation failed ({} bytes)", self.stack_size);
            return None;
        };
        let thread = ThreadNode::new(Thread::new(ThreadKind::Normal));
        // SAFETY: the node was just created; nothing else references it.
        let mutable = unsafe { &mut *as_mut_ptr(&thread) };
        mutable.init(stack, self.entry);
        thread.set_origin_priority(self.priority);
        thread.set_effective_priority(self.priority);
        thread
            .detached
            .store(self.detached, Ordering::Release);
        GlobalQueue::add(thread.clone());
        Some(thread)
    }

    /// Builds and makes the thread runnable. If it outranks the caller
    /// the switch happens before the caller continues.
    pub fn start(self) -> Option<ThreadNode> {
        let t = self.build()?;
        let ok = scheduler::queue_ready_thread(CREATED, t.clone());
        debug_assert!(ok);
        scheduler::yield_me_now_or_later();
        Some(t)
    }
}

/// Statically allocated thread + stack, for the per-core system threads
/// that must exist before the heap does.
#[repr(align(16))]
#[derive(Copy, Clone, Debug)]
pub(crate) struct SystemThreadStack {
    pub(crate) rep: [u8; config::SYSTEM_THREAD_STACK_SIZE],
}

#[derive(Debug)]
pub(crate) struct SystemThreadStorage {
    pub(crate) arc: ArcInner<Thread>,
    pub(crate) stack: SystemThreadStack,
}

impl SystemThreadStorage {
    pub(crate) const fn const_new(kind: ThreadKind) -> Self {
        Self {
            arc: ArcInner::const_new(Thread::const_new(kind)),
            stack: SystemThreadStack {
                rep: [0u8; config::SYSTEM_THREAD_STACK_SIZE],
            },
        }
    }
}

pub(crate) fn build_static_thread(
    slot: &'static mut MaybeUninit<ThreadNode>,
    storage: &'static SystemThreadStorage,
    priority: ThreadPriority,
    init_state: Uint,
    entry: Entry,
) -> ThreadNode {
    // SAFETY: storage lives forever and is handed out exactly once.
    let arc = unsafe { ThreadNode::const_new(&storage.arc) };
    assert_eq!(ThreadNode::strong_count(&arc), 1);
    let mutable = unsafe { &mut *as_mut_ptr(&arc) };
    mutable.init(
        Stack::Raw {
            base: storage.stack.rep.as_ptr() as usize,
            size: storage.stack.rep.len(),
        },
        entry,
    );
    arc.set_origin_priority(priority);
    arc.set_effective_priority(priority);
    assert!((CREATED..=super::DETACHED).contains(&init_state));
    unsafe { arc.set_state(init_state) };
    slot.write(arc.clone());
    GlobalQueue::add(arc.clone());
    arc
}
