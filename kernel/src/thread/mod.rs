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
use crate::{
    config,
    error::{fatal_error, FatalKind},
    irq, scheduler,
    support::align_down_size,
    sync::{
        mutex::{Mutex, MutexList},
        spinlock::SpinLock,
        wait_queue::{WaitEntry, WaitQueue},
    },
    time,
    types::{impl_intrusive_adapter, Arc, AtomicUint, IlistHead, ThreadPriority, Uint},
};
use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use osprey_arch as arch;

mod builder;
pub use builder::*;

pub type ThreadNode = Arc<Thread>;

pub enum Entry {
    C(extern "C" fn()),
    CArg(extern "C" fn(*mut core::ffi::c_void), *mut core::ffi::c_void),
    Closure(Box<dyn FnOnce() -> usize + Send>),
}

impl core::fmt::Debug for Entry {
    fn fmt(&self, _f: &mut core::fmt::Formatter) -> core::fmt::Result {
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ThreadKind {
    Idle,
    Main,
    #[default]
    Normal,
}

/// Heap stacks keep AAPCS alignment through the chunk type.
#[repr(align(16))]
#[derive(Copy, Clone, Debug)]
pub struct StackChunk([u8; 16]);

#[derive(Debug)]
pub enum Stack {
    Raw { base: usize, size: usize },
    Boxed(Box<[StackChunk]>),
}

impl Default for Stack {
    fn default() -> Self {
        Stack::Raw { base: 0, size: 0 }
    }
}

impl Stack {
    /// Heap stack of at least `size` bytes, or `None` when memory is
    /// exhausted: spawn reports that as a value, never as a fault.
    pub fn try_with_size(size: usize) -> Option<Self> {
        let chunks = size.div_ceil(core::mem::size_of::<StackChunk>());
        let mut storage = alloc::vec::Vec::new();
        if storage.try_reserve_exact(chunks).is_err() {
            return None;
        }
        storage.resize(chunks, StackChunk([0u8; 16]));
        Some(Stack::Boxed(storage.into_boxed_slice()))
    }

    pub fn base(&self) -> usize {
        match self {
            Self::Boxed(chunks) => chunks.as_ptr() as usize,
            Self::Raw { base, .. } => *base,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Boxed(chunks) => core::mem::size_of_val(&chunks[..]),
            Self::Raw { size, .. } => *size,
        }
    }
}

impl_intrusive_adapter!(OffsetOfGlobal, Thread, global);
impl_intrusive_adapter!(OffsetOfSchedNode, Thread, sched_node);
impl_intrusive_adapter!(OffsetOfTimerNode, Thread, timer_node);

pub const CREATED: Uint = 0;
pub const READY: Uint = 1;
pub const RUNNING: Uint = 2;
pub const SLEEPING: Uint = 3;
pub const WAITING: Uint = 4;
pub const WAIT_CONDVAR: Uint = 5;
pub const WAITING_JOIN: Uint = 6;
pub const DELETED: Uint = 7;
pub const DETACHED: Uint = 8;

/// CPU-time bookkeeping, charged on every context switch. Protected by
/// the thread control lock.
#[derive(Debug, Default)]
pub struct ThreadStats {
    start: u64,
    cycles: u64,
}

impl ThreadStats {
    pub const fn new() -> Self {
        Self {
            start: 0,
            cycles: 0,
        }
    }

    pub fn charge(&mut self, cycles: u64) {
        self.cycles += cycles.saturating_sub(self.start);
    }

    pub fn stamp(&mut self, cycles: u64) {
        self.start = cycles;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn start_cycles(&self) -> u64 {
        self.start
    }
}

/// Mutable half of a thread, behind its spinlock. The atomics outside
/// (state, priorities, flags) have their own update discipline.
#[derive(Debug, Default)]
pub struct ThreadCtl {
    saved_sp: usize,
    /// Absolute wakeup deadline while on the sleep queue.
    pub(crate) wakeup_at: i64,
    /// Mutexes currently owned; priority inheritance recomputes from it.
    pub(crate) owned_mutexes: MutexList,
    /// The mutex this thread is blocked on, for the inheritance chain.
    pub(crate) pend_mutex: Option<Arc<Mutex>>,
    pub(crate) exit_value: usize,
    pub(crate) stats: ThreadStats,
}

#[derive(Debug)]
pub struct Thread {
    pub global: IlistHead<Thread, OffsetOfGlobal>,
    pub sched_node: IlistHead<Thread, OffsetOfSchedNode>,
    pub timer_node: IlistHead<Thread, OffsetOfTimerNode>,
    kind: ThreadKind,
    stack: Stack,
    state: AtomicUint,
    /// Effective priority; may be boosted above `origin_priority` by
    /// priority inheritance. Written under the control lock, read
    /// lock-free by the scheduler.
    priority: AtomicU8,
    origin_priority: AtomicU8,
    preempt_count: AtomicUint,
    robin_count: AtomicI32,
    /// True while a core is executing this thread or its context is not
    /// yet saved. Nobody may dispatch it then.
    on_cpu: AtomicBool,
    detached: AtomicBool,
    join_taken: AtomicBool,
    ctl: SpinLock<ThreadCtl>,
    pub(crate) join_waiters: SpinLock<WaitQueue>,
}

unsafe impl Sync for Thread {}

extern "C" fn run_simple_c(f: extern "C" fn()) {
    f();
    scheduler::retire_me(0)
}

extern "C" fn run_c_arg(f: extern "C" fn(*mut core::ffi::c_void), arg: *mut core::ffi::c_void) {
    f(arg);
    scheduler::retire_me(0)
}

extern "C" fn run_closure(raw: *mut Box<dyn FnOnce() -> usize + Send>) {
    // The double box exists because the trait object pointer is fat.
    let value = unsafe { Box::from_raw(raw) }();
    scheduler::retire_me(value)
}

impl Thread {
    pub(crate) const fn const_new(kind: ThreadKind) -> Self {
        Self {
            global: IlistHead::const_new(),
            sched_node: IlistHead::const_new(),
            timer_node: IlistHead::const_new(),
            kind,
            stack: Stack::Raw { base: 0, size: 0 },
            state: AtomicUint::new(CREATED),
            priority: AtomicU8::new(0),
            origin_priority: AtomicU8::new(0),
            preempt_count: AtomicUint::new(0),
            robin_count: AtomicI32::new(config::ROBIN_SLICE_TICKS as i32),
            on_cpu: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            join_taken: AtomicBool::new(false),
            ctl: SpinLock::new(ThreadCtl {
                saved_sp: 0,
                wakeup_at: 0,
                owned_mutexes: MutexList::const_new(),
                pend_mutex: None,
                exit_value: 0,
                stats: ThreadStats::new(),
            }),
            join_waiters: SpinLock::new(WaitQueue::const_new()),
        }
    }

    pub(crate) const fn new(kind: ThreadKind) -> Self {
        Self::const_new(kind)
    }

    #[inline]
    pub fn id(me: &ThreadNode) -> usize {
        unsafe { ThreadNode::get_handle(me) as usize }
    }

    #[inline]
    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.kind == ThreadKind::Idle
    }

    #[inline]
    pub(crate) fn ctl(&self) -> &SpinLock<ThreadCtl> {
        &self.ctl
    }

    #[inline]
    pub fn state(&self) -> Uint {
        self.state.load(Ordering::Relaxed)
    }

    pub fn state_to_str(&self) -> &str {
        match self.state() {
            CREATED => "created",
            READY => "ready",
            RUNNING => "running",
            SLEEPING => "sleeping",
            WAITING => "waiting",
            WAIT_CONDVAR => "waitcondvar",
            WAITING_JOIN => "waitingjoin",
            DELETED => "deleted",
            DETACHED => "detached",
            _ => "unknown",
        }
    }

    /// Moves `from` to `to` if and only if the thread is still in
    /// `from`. Every scheduler-visible transition goes through here, so
    /// racing wakers resolve by whoever wins the exchange.
    #[inline]
    pub fn transfer_state(&self, from: Uint, to: Uint) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// # Safety
    /// Bypasses the transition discipline; boot and test scaffolding
    /// only.
    #[inline]
    pub unsafe fn set_state(&self, to: Uint) -> &Self {
        self.state.store(to, Ordering::SeqCst);
        self
    }

    #[inline]
    pub fn priority(&self) -> ThreadPriority {
        self.priority.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn origin_priority(&self) -> ThreadPriority {
        self.origin_priority.load(Ordering::Relaxed)
    }

    /// Sets the effective priority. Caller holds the control lock.
    #[inline]
    pub(crate) fn set_effective_priority(&self, p: ThreadPriority) {
        self.priority.store(p, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_origin_priority(&self, p: ThreadPriority) {
        self.origin_priority.store(p, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_on_cpu(&self) -> bool {
        self.on_cpu.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_on_cpu(&self, v: bool) {
        self.on_cpu.store(v, Ordering::Release);
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    #[inline]
    pub fn disable_preempt(&self) -> bool {
        self.preempt_count.fetch_add(1, Ordering::Acquire) == 0
    }

    #[inline]
    pub fn enable_preempt(&self) -> bool {
        self.preempt_count.fetch_sub(1, Ordering::Release) == 1
    }

    #[inline]
    pub fn is_preemptable(&self) -> bool {
        self.preempt_count.load(Ordering::Relaxed) == 0
    }

    #[inline]
    pub(crate) fn round_robin(&self, ticks: usize) -> i32 {
        self.robin_count.fetch_sub(ticks as i32, Ordering::Relaxed) - ticks as i32
    }

    #[inline]
    pub(crate) fn reset_robin(&self) {
        self.robin_count
            .store(config::ROBIN_SLICE_TICKS as i32, Ordering::Relaxed);
    }

    #[inline]
    pub fn stack_base(&self) -> usize {
        self.stack.base()
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    pub fn saved_sp(&self) -> usize {
        self.ctl.irqsave_lock().saved_sp
    }

    pub(crate) fn set_saved_sp(&self, sp: usize) {
        self.ctl.irqsave_lock().saved_sp = sp;
    }

    /// Sanity check used by scheduler debug asserts. Idle threads run on
    /// the boot/system stack, which is not the one they were built with.
    pub fn validate_saved_sp(&self) -> bool {
        if self.stack.size() == 0 || self.is_idle() {
            return true;
        }
        let sp = self.saved_sp();
        sp >= self.stack.base() && sp <= self.stack.base() + self.stack.size()
    }

    #[inline]
    pub fn stack_usage(&self) -> usize {
        let sp = arch::current_sp();
        self.stack.base() + self.stack.size() - sp
    }

    /// Carves the initial context frame from the stack top and points
    /// it at the entry trampoline.
    pub(crate) fn init(&mut self, stack: Stack, entry: Entry) -> &mut Self {
        self.stack = stack;
        let top = align_down_size(self.stack.base() + self.stack.size(), arch::STACK_ALIGN);
        let sp = align_down_size(top - core::mem::size_of::<arch::Context>(), arch::STACK_ALIGN);
        assert!(sp >= self.stack.base());
        // SAFETY: sp is inside the freshly owned stack and aligned.
        let ctx = unsafe { &mut *(sp as *mut arch::Context) };
        ctx.init();
        match entry {
            Entry::C(f) => ctx
                .set_return_address(run_simple_c as usize)
                .set_arg(0, f as usize),
            Entry::CArg(f, arg) => ctx
                .set_return_address(run_c_arg as usize)
                .set_arg(0, f as usize)
                .set_arg(1, arg as usize),
            Entry::Closure(boxed) => {
                let raw = Box::into_raw(Box::new(boxed));
                ctx.set_return_address(run_closure as usize)
                    .set_arg(0, raw as usize)
            }
        };
        let mut w = self.ctl.lock();
        w.saved_sp = sp;
        w.owned_mutexes.init();
        drop(w);
        self.join_waiters.lock().init();
        self
    }

    pub fn cycles(&self) -> u64 {
        self.ctl.irqsave_lock().stats.cycles()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        assert!(self.sched_node.is_detached());
        assert!(self.timer_node.is_detached());
    }
}

/// Blocks until `t` exits and returns its exit value; the thread's
/// stack and descriptor are released. Joining a detached, already
/// joined, or current thread is a programming fault.
pub fn join(t: &ThreadNode) -> usize {
    assert!(!irq::is_in_irq());
    let me = scheduler::current_thread();
    if Thread::id(&me) == Thread::id(t) || t.is_detached() {
        fatal_error(FatalKind::InvalidJoin);
    }
    if t.join_taken.swap(true, Ordering::AcqRel) {
        fatal_error(FatalKind::InvalidJoin);
    }
    loop {
        let mut w = t.join_waiters.irqsave_lock();
        if t.state() == DELETED {
            break;
        }
        let entry = WaitEntry::new(me.clone());
        w.push_back(entry.clone());
        scheduler::park_current(w, WAITING_JOIN, None);
        let mut w = t.join_waiters.irqsave_lock();
        if entry.is_queued() {
            w.remove(&entry);
        }
    }
    // The exiting core may not have saved its context yet.
    while t.is_on_cpu() {
        scheduler::yield_me();
    }
    let exit = t.ctl.irqsave_lock().exit_value;
    GlobalQueue::remove(t);
    exit
}

/// Marks `t` to be reclaimed automatically when it exits.
pub fn detach(t: &ThreadNode) {
    if t.join_taken.load(Ordering::Acquire) {
        fatal_error(FatalKind::InvalidJoin);
    }
    t.detached.store(true, Ordering::Release);
    if t.transfer_state(DELETED, DETACHED) {
        crate::idle::push_zombie(t.clone());
    }
}

/// Changes the base priority of `t`. The effective priority follows
/// unless inheritance currently holds it higher.
pub fn set_priority(t: &ThreadNode, p: ThreadPriority) {
    assert!(p <= config::MAX_THREAD_PRIORITY);
    let was_ready = t.state() == READY;
    {
        let ctl = t.ctl.irqsave_lock();
        t.set_origin_priority(p);
        let inherited = crate::sync::mutex::max_waiter_priority(&ctl);
        let effective = match inherited {
            Some(q) if q > p => q,
            _ => p,
        };
        if was_ready && effective != t.priority() {
            scheduler::requeue_ready_with_priority(t, effective);
        } else {
            t.set_effective_priority(effective);
        }
    }
    scheduler::yield_me_now_or_later();
}

/// CPU time consumed by `t` in nanoseconds. For the running thread the
/// live slice since its last dispatch is included.
pub fn cpu_time_ns(t: &ThreadNode) -> i64 {
    let cycles = {
        let ctl = t.ctl.irqsave_lock();
        let mut c = ctl.stats.cycles();
        if t.state() == RUNNING {
            c += time::now_cycles().saturating_sub(ctl.stats.start_cycles());
        }
        c
    };
    (cycles as u128 * config::NSEC_PER_SEC as u128 / config::CYCLES_PER_SEC as u128) as i64
}

pub fn sleep_for(ns: i64) {
    scheduler::sleep_until(time::now().saturating_add(ns))
}

pub fn sleep_until(deadline: i64) {
    scheduler::sleep_until(deadline)
}

/// All live threads, for joins and diagnostics.
pub struct GlobalQueue;

type ThreadList = crate::types::ArcList<Thread, OffsetOfGlobal>;

static GLOBAL_QUEUE: SpinLock<GlobalThreads> = SpinLock::new(GlobalThreads {
    list: ThreadList::const_new(),
});

struct GlobalThreads {
    list: ThreadList,
}

// Protected by the spinlock around it.
unsafe impl Send for GlobalThreads {}

impl GlobalQueue {
    pub(crate) fn init() {
        GLOBAL_QUEUE.irqsave_lock().list.init();
    }

    pub(crate) fn add(t: ThreadNode) {
        GLOBAL_QUEUE.irqsave_lock().list.push_back(t);
    }

    pub(crate) fn remove(t: &ThreadNode) -> bool {
        GLOBAL_QUEUE.irqsave_lock().list.remove(t)
    }

    pub fn len() -> usize {
        GLOBAL_QUEUE.irqsave_lock().list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config, testing};

    extern "C" fn noop() {}

    #[test]
    fn heap_stacks_are_aligned_and_rounded_up() {
        let s = Stack::try_with_size(1000).unwrap();
        assert!(s.size() >= 1000);
        assert_eq!(s.base() % 16, 0);
        assert_eq!(s.size() % 16, 0);
    }

    #[test]
    fn builder_produces_a_dispatchable_thread() {
        testing::with_kernel(|| {
            let t = Builder::new(Entry::C(noop))
                .set_priority(7)
                .set_stack_size(2048)
                .build()
                .unwrap();
            assert_eq!(t.state(), CREATED);
            assert_eq!(t.priority(), 7);
            assert_eq!(t.origin_priority(), 7);
            assert!(t.stack_size() >= 2048);
            assert!(t.validate_saved_sp());
            assert!(!t.is_detached());
            GlobalQueue::remove(&t);
        });
    }

    #[test]
    fn spawn_registers_the_thread_globally() {
        testing::with_kernel(|| {
            let before = GlobalQueue::len();
            let t = Builder::new(Entry::C(noop)).build().unwrap();
            assert_eq!(GlobalQueue::len(), before + 1);
            GlobalQueue::remove(&t);
            assert_eq!(GlobalQueue::len(), before);
        });
    }

    #[test]
    fn set_priority_tracks_origin_without_boost() {
        testing::with_kernel(|| {
            let t = Builder::new(Entry::C(noop)).build().unwrap();
            set_priority(&t, 3);
            assert_eq!(t.origin_priority(), 3);
            assert_eq!(t.priority(), 3);
            set_priority(&t, config::MAX_THREAD_PRIORITY);
            assert_eq!(t.priority(), config::MAX_THREAD_PRIORITY);
            GlobalQueue::remove(&t);
        });
    }

    #[test]
    fn detach_marks_the_thread() {
        testing::with_kernel(|| {
            let t = Builder::new(Entry::C(noop)).build().unwrap();
            assert!(!t.is_detached());
            detach(&t);
            assert!(t.is_detached());
            GlobalQueue::remove(&t);
        });
    }

    #[test]
    #[should_panic(expected = "InvalidJoin")]
    fn join_on_detached_thread_is_fatal() {
        testing::with_kernel(|| {
            let t = Builder::new(Entry::C(noop)).build().unwrap();
            detach(&t);
            let _ = join(&t);
        });
    }

    #[test]
    fn state_exchange_is_single_winner() {
        testing::with_kernel(|| {
            let t = Builder::new(Entry::C(noop)).build().unwrap();
            unsafe { t.set_state(WAITING) };
            assert!(t.transfer_state(WAITING, READY));
            // The losing side of a wake race observes a failed exchange.
            assert!(!t.transfer_state(WAITING, READY));
            assert!(!t.transfer_state(SLEEPING, READY));
            unsafe { t.set_state(CREATED) };
            GlobalQueue::remove(&t);
        });
    }
}
