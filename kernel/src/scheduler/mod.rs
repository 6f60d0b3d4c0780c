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

//! Preemptive priority scheduler. Exactly one thread is Running per
//! core; the Running set is re-evaluated at every reschedule-interrupt
//! epilogue ([`osprey_switch_context_in_irq`]), which is the only place
//! a thread loses the CPU. Everything else (wakeups, yields, parks,
//! priority changes) just latches the pend-reschedule request.

use crate::{
    config::NUM_CORES,
    error::{fatal_error, FatalKind},
    idle, irq,
    support::DisableInterruptGuard,
    sync::spinlock::{SpinLock, SpinLockGuard},
    thread::{self, Thread, ThreadNode},
    time,
    types::Uint,
};
use core::sync::atomic::{AtomicBool, Ordering};
use osprey_arch as arch;

mod ready_table;
pub(crate) mod sleep_queue;

pub use ready_table::{next_ready_thread, peek_highest, queue_ready_thread, remove_from_ready};
pub(crate) use ready_table::{next_if, requeue_ready_with_priority};

static RUNNING_THREADS: [SpinLock<Option<ThreadNode>>; NUM_CORES] =
    [const { SpinLock::new(None) }; NUM_CORES];

/// Set when the running thread should rotate behind an equal-priority
/// peer: explicit yield or an expired round-robin slice.
static YIELD_REQUESTED: [AtomicBool; NUM_CORES] = [const { AtomicBool::new(false) }; NUM_CORES];

pub fn init() {
    ready_table::init();
    sleep_queue::init();
    thread::GlobalQueue::init();
    idle::init_idle_threads();
    for core in 0..NUM_CORES {
        let t = idle::idle_thread(core);
        // The boot path of each core becomes its idle thread.
        unsafe { t.set_state(if core == arch::current_cpu_id() {
            thread::RUNNING
        } else {
            thread::READY
        }) };
        t.set_on_cpu(core == arch::current_cpu_id());
        *RUNNING_THREADS[core].irqsave_lock() = Some(t);
    }
}

#[inline]
pub fn current_thread() -> ThreadNode {
    let _dig = DisableInterruptGuard::new();
    let slot = RUNNING_THREADS[arch::current_cpu_id()].irqsave_lock();
    slot.clone().expect("scheduler not initialized")
}

#[inline]
pub fn current_thread_id() -> usize {
    Thread::id(&current_thread())
}

/// Like [`current_thread_id`] but usable before the scheduler is up.
pub fn try_current_thread_id() -> Option<usize> {
    let _dig = DisableInterruptGuard::new();
    let slot = RUNNING_THREADS[arch::current_cpu_id()].irqsave_lock();
    slot.as_ref().map(Thread::id)
}

pub(crate) fn set_current_thread(t: ThreadNode) -> ThreadNode {
    let mut slot = RUNNING_THREADS[arch::current_cpu_id()].irqsave_lock();
    core::mem::replace(&mut *slot, Some(t)).expect("scheduler not initialized")
}

/// Latches a reschedule. If called from an interrupt the switch runs at
/// its epilogue, otherwise as soon as interrupts permit.
#[inline]
pub fn yield_me_now_or_later() {
    arch::pend_switch_context();
    #[cfg(feature = "smp")]
    crate::smp::nudge_other_core();
}

/// Gives the CPU to an equal- or higher-priority Ready thread, if any.
pub fn yield_me() {
    debug_assert!(!irq::is_in_irq());
    YIELD_REQUESTED[arch::current_cpu_id()].store(true, Ordering::Release);
    arch::pend_switch_context();
}

/// Parks the caller: transitions it out of Running, optionally arms a
/// wakeup deadline, releases the wait-queue guard, and lets the next
/// epilogue switch away. The caller re-checks its predicate on return;
/// spurious wakeups are allowed by every wait loop in the kernel.
pub(crate) fn park_current<T: ?Sized>(
    guard: SpinLockGuard<'_, T>,
    state: Uint,
    deadline: Option<i64>,
) {
    debug_assert!(!irq::is_in_irq());
    let me = current_thread();
    if !me.is_preemptable() {
        fatal_error(FatalKind::BlockingForbidden);
    }
    let ok = me.transfer_state(thread::RUNNING, state);
    assert!(ok);
    if let Some(d) = deadline {
        sleep_queue::insert(me.clone(), d);
    }
    arch::pend_switch_context();
    drop(guard);
    // On hardware the pended switch fires the moment the guard restores
    // interrupts; execution resumes here when the thread is dispatched
    // again.
    hosted_unpark(&me, state);
    if deadline.is_some() {
        sleep_queue::remove(&me);
    }
}

/// Blocks the caller until `deadline` (monotonic ns). A deadline in the
/// past degrades to a yield, so an equal-priority Ready peer gets the
/// CPU but the caller does not block.
pub fn sleep_until(deadline: i64) {
    debug_assert!(!irq::is_in_irq());
    if deadline <= time::now() {
        yield_me();
        return;
    }
    let me = current_thread();
    if !me.is_preemptable() {
        fatal_error(FatalKind::BlockingForbidden);
    }
    let ok = me.transfer_state(thread::RUNNING, thread::SLEEPING);
    assert!(ok);
    sleep_queue::insert(me.clone(), deadline);
    arch::pend_switch_context();
    hosted_unpark(&me, thread::SLEEPING);
    sleep_queue::remove(&me);
}

/// Makes a Sleeping thread Ready before its deadline. The bridge for
/// interrupt handlers that finish a wait early.
pub fn wakeup(t: &ThreadNode) {
    if queue_ready_thread(thread::SLEEPING, t.clone()) {
        yield_me_now_or_later();
    }
}

/// IRQ-context alias of [`wakeup`].
pub fn irq_wakeup(t: &ThreadNode) {
    wakeup(t)
}

/// Terminates the calling thread. Its exit value is handed to `join`,
/// or the thread is queued for the idle reaper when detached.
pub fn retire_me(exit_value: usize) -> ! {
    debug_assert!(!irq::is_in_irq());
    let me = current_thread();
    me.ctl().irqsave_lock().exit_value = exit_value;
    let next_state = if me.is_detached() {
        thread::DETACHED
    } else {
        thread::DELETED
    };
    {
        let mut joiners = me.join_waiters.irqsave_lock();
        let ok = me.transfer_state(thread::RUNNING, next_state);
        assert!(ok);
        while let Some(entry) = joiners.pop_front() {
            entry.mark_taken();
            queue_ready_thread(thread::WAITING_JOIN, entry.thread.clone());
        }
    }
    if next_state == thread::DETACHED {
        idle::push_zombie(me.clone());
    }
    drop(me);
    arch::pend_switch_context();
    loop {
        // The pended switch takes the CPU at the next epilogue and this
        // context is never dispatched again.
        arch::wait_for_interrupt();
    }
}

/// Periodic tick work: round-robin accounting and expired sleepers.
pub(crate) fn handle_tick(now: i64) {
    let core = arch::current_cpu_id();
    let cur = current_thread();
    let mut need_resched = false;
    if !cur.is_idle() && cur.round_robin(1) <= 0 {
        cur.reset_robin();
        if cur.is_preemptable() {
            YIELD_REQUESTED[core].store(true, Ordering::Release);
            need_resched = true;
        }
    }
    if let Some(strongest) = sleep_queue::pop_expired(now) {
        if cur.is_idle() || strongest >= cur.priority() {
            need_resched = true;
        }
        #[cfg(feature = "smp")]
        crate::smp::nudge_other_core();
    }
    if need_resched {
        arch::pend_switch_context();
    }
}

/// The reschedule-interrupt hook: called by the PendSV-style handler
/// with the outgoing stack pointer after the frame is saved; returns
/// the stack pointer to resume. Runs with interrupts masked.
#[no_mangle]
pub extern "C" fn osprey_switch_context_in_irq(old_sp: usize) -> usize {
    debug_assert!(!arch::local_irq_enabled());
    let core = arch::current_cpu_id();
    let cur = current_thread();
    cur.set_saved_sp(old_sp);
    debug_assert!(cur.validate_saved_sp());

    let cur_running = cur.state() == thread::RUNNING;
    if cur_running && !cur.is_preemptable() {
        // Kernel paused: the request stays latched in YIELD_REQUESTED
        // where the pause guard re-pends it on release.
        return old_sp;
    }
    let yield_requested = YIELD_REQUESTED[core].swap(false, Ordering::AcqRel);
    let cur_prio = cur.priority();
    let cur_is_idle = cur.is_idle();

    let next = next_if(|p| {
        !cur_running || cur_is_idle || p > cur_prio || (p == cur_prio && yield_requested)
    });
    let next = match next {
        Some(n) => n,
        None if cur_running => return old_sp,
        // Nothing runnable and the current thread is leaving: idle.
        None => idle::idle_thread(core),
    };

    if cur_running {
        if cur_is_idle {
            // Idle threads never sit in the ready table.
            let ok = cur.transfer_state(thread::RUNNING, thread::READY);
            assert!(ok);
        } else {
            let ok = queue_ready_thread(thread::RUNNING, cur.clone());
            if !ok {
                fatal_error(FatalKind::SchedulerBroken);
            }
        }
    }
    let ok = next.transfer_state(thread::READY, thread::RUNNING);
    assert!(ok);
    next.reset_robin();
    next.set_on_cpu(true);

    let cycles = time::now_cycles();
    cur.ctl().irqsave_lock().stats.charge(cycles);
    next.ctl().irqsave_lock().stats.stamp(cycles);

    let to_sp = next.saved_sp();
    let old = set_current_thread(next);
    // Only after the outgoing context is fully published may another
    // core dispatch this thread.
    old.set_on_cpu(false);
    to_sp
}

/// Entry of each core's idle thread; also the tail of the boot path.
pub extern "C" fn schedule() -> ! {
    arch::enable_local_irq();
    assert!(arch::local_irq_enabled());
    loop {
        idle::idle_work();
    }
}

/// The hosted backend cannot take the pended interrupt, so a parked
/// test thread resumes synchronously here and the wait loops observe an
/// ordinary spurious wakeup. Compiled out on hardware.
#[allow(unused_variables)]
fn hosted_unpark(me: &ThreadNode, state: Uint) {
    #[cfg(not(target_os = "none"))]
    {
        if me.transfer_state(state, thread::RUNNING) {
            return;
        }
        // A waker got there first and made us Ready.
        if me.state() == thread::READY {
            remove_from_ready(me);
            let ok = me.transfer_state(thread::READY, thread::RUNNING);
            assert!(ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        support::FastInterruptGuard,
        testing,
        thread::{Builder, Entry, GlobalQueue},
    };

    extern "C" fn noop() {}

    /// Runs the reschedule hook the way the interrupt epilogue does.
    fn epilogue(from_sp: usize) -> usize {
        let _m = FastInterruptGuard::new();
        osprey_switch_context_in_irq(from_sp)
    }

    fn drop_test_thread(t: &ThreadNode) {
        remove_from_ready(t);
        GlobalQueue::remove(t);
    }

    #[test]
    fn spawning_above_the_running_priority_preempts() {
        testing::with_kernel(|| {
            let me = current_thread();
            let origin = me.origin_priority();
            let t = Builder::new(Entry::C(noop))
                .set_priority(origin + 1)
                .build()
                .unwrap();
            assert!(queue_ready_thread(thread::CREATED, t.clone()));

            let my_sp = me.saved_sp();
            let to_sp = epilogue(my_sp);
            assert_eq!(to_sp, t.saved_sp());
            assert_eq!(t.state(), thread::RUNNING);
            assert_eq!(me.state(), thread::READY);

            // Outrank the spawned thread again and take the CPU back.
            thread::set_priority(&me, origin + 2);
            let back = epilogue(t.saved_sp());
            assert_eq!(back, my_sp);
            assert_eq!(me.state(), thread::RUNNING);
            assert_eq!(t.state(), thread::READY);

            thread::set_priority(&me, origin);
            drop_test_thread(&t);
        });
    }

    #[test]
    fn equal_priority_rotates_only_on_yield() {
        testing::with_kernel(|| {
            let me = current_thread();
            let origin = me.origin_priority();
            let t = Builder::new(Entry::C(noop))
                .set_priority(origin)
                .build()
                .unwrap();
            assert!(queue_ready_thread(thread::CREATED, t.clone()));

            let my_sp = me.saved_sp();
            // No yield requested: the running thread keeps the CPU.
            YIELD_REQUESTED[arch::current_cpu_id()].store(false, Ordering::Release);
            assert_eq!(epilogue(my_sp), my_sp);
            assert_eq!(me.state(), thread::RUNNING);

            yield_me();
            assert_eq!(epilogue(my_sp), t.saved_sp());
            assert_eq!(t.state(), thread::RUNNING);
            assert_eq!(me.state(), thread::READY);

            thread::set_priority(&me, origin + 1);
            assert_eq!(epilogue(t.saved_sp()), my_sp);
            thread::set_priority(&me, origin);
            drop_test_thread(&t);
        });
    }

    #[test]
    fn lower_priority_never_preempts() {
        testing::with_kernel(|| {
            let me = current_thread();
            let t = Builder::new(Entry::C(noop))
                .set_priority(me.origin_priority() - 1)
                .build()
                .unwrap();
            assert!(queue_ready_thread(thread::CREATED, t.clone()));
            let my_sp = me.saved_sp();
            YIELD_REQUESTED[arch::current_cpu_id()].store(true, Ordering::Release);
            // Even a requested yield must not hand the CPU down.
            assert_eq!(epilogue(my_sp), my_sp);
            assert_eq!(me.state(), thread::RUNNING);
            drop_test_thread(&t);
        });
    }

    #[test]
    fn sleep_queue_wakes_in_deadline_order() {
        testing::with_kernel(|| {
            let base = time::now() + 1_000_000_000;
            let mk = || {
                let t = Builder::new(Entry::C(noop)).build().unwrap();
                unsafe { t.set_state(thread::SLEEPING) };
                t
            };
            let (a, b, c) = (mk(), mk(), mk());
            sleep_queue::insert(c.clone(), base + 2_000_000);
            sleep_queue::insert(a.clone(), base);
            sleep_queue::insert(b.clone(), base + 1_000_000);
            assert_eq!(sleep_queue::next_deadline(), Some(base));

            assert_eq!(sleep_queue::pop_expired(base - 1), None);
            assert!(sleep_queue::pop_expired(base).is_some());
            assert_eq!(a.state(), thread::READY);
            assert_eq!(b.state(), thread::SLEEPING);

            assert!(sleep_queue::pop_expired(base + 2_000_000).is_some());
            assert_eq!(b.state(), thread::READY);
            assert_eq!(c.state(), thread::READY);
            assert_eq!(sleep_queue::next_deadline(), None);

            for t in [&a, &b, &c] {
                drop_test_thread(t);
            }
        });
    }

    #[test]
    fn sleep_with_elapsed_deadline_does_not_block() {
        testing::with_kernel(|| {
            let before = time::now();
            sleep_until(before - 1);
            sleep_until(0);
            assert_eq!(current_thread().state(), thread::RUNNING);
        });
    }

    #[test]
    fn cpu_time_accumulates_while_running() {
        testing::with_kernel(|| {
            let me = current_thread();
            let t0 = thread::cpu_time_ns(&me);
            time::busy_delay_us(300);
            let t1 = thread::cpu_time_ns(&me);
            assert!(t1 >= t0 + 300_000, "t0={} t1={}", t0, t1);
        });
    }
}
