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

//! Run-time interrupt registration. Drivers install `(handler, arg)`
//! pairs against dense peripheral ids; the vector table points at the
//! per-id trampolines generated at the bottom of this file. Registering
//! an occupied id is a fatal fault by contract: drivers that can
//! tolerate losing the race check [`is_registered`] first.

use crate::{
    config::{IRQ_TABLE_LEN, NUM_CORES},
    error::{fatal_error, FatalKind},
    sync::spinlock::SpinLock,
    types::AtomicUint,
};
use core::{ffi::c_void, sync::atomic::Ordering};
use osprey_arch as arch;

pub type IrqHandlerFn = fn(*mut c_void);

/// Implemented by driver objects whose method serves the interrupt.
/// The object analogue of registering a bound function.
pub trait IrqHandlerObject {
    fn handle_irq(&self);
}

#[derive(Clone, Copy)]
enum Registered {
    Plain(fn()),
    WithArg(IrqHandlerFn, *mut c_void),
}

// The stored arg is an opaque token owned by the registering driver.
unsafe impl Send for Registered {}

impl PartialEq for Registered {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Registered::Plain(a), Registered::Plain(b)) => *a as usize == *b as usize,
            (Registered::WithArg(f, a), Registered::WithArg(g, b)) => {
                *f as usize == *g as usize && *a == *b
            }
            _ => false,
        }
    }
}

static TABLE: SpinLock<[Option<Registered>; IRQ_TABLE_LEN]> =
    SpinLock::new([None; IRQ_TABLE_LEN]);

fn install(id: usize, entry: Registered) {
    assert!(id < IRQ_TABLE_LEN);
    let mut w = TABLE.irqsave_lock();
    if w[id].is_some() {
        drop(w);
        fatal_error(FatalKind::IrqAlreadyRegistered);
    }
    w[id] = Some(entry);
}

fn uninstall(id: usize, entry: Registered) {
    assert!(id < IRQ_TABLE_LEN);
    let mut w = TABLE.irqsave_lock();
    if w[id] != Some(entry) {
        drop(w);
        fatal_error(FatalKind::IrqMismatch);
    }
    w[id] = None;
}

/// Installs `handler` for `id`; `arg` is stored and passed back verbatim
/// on every dispatch. Fatal if `id` already has a handler.
pub fn register_irq(id: usize, handler: IrqHandlerFn, arg: *mut c_void) {
    install(id, Registered::WithArg(handler, arg));
}

/// Argument-less variant of [`register_irq`].
pub fn register_irq_fn(id: usize, handler: fn()) {
    install(id, Registered::Plain(handler));
}

fn object_thunk<T: IrqHandlerObject>(arg: *mut c_void) {
    // SAFETY: register_irq_obj stored a &'static T here.
    unsafe { &*(arg as *const T) }.handle_irq()
}

/// Registers `obj.handle_irq` as the handler for `id`.
pub fn register_irq_obj<T: IrqHandlerObject>(id: usize, obj: &'static T) {
    install(
        id,
        Registered::WithArg(object_thunk::<T>, obj as *const T as *mut c_void),
    );
}

/// Removes the handler for `id`. Fatal unless the stored `(handler,
/// arg)` pair matches the one being removed.
pub fn unregister_irq(id: usize, handler: IrqHandlerFn, arg: *mut c_void) {
    uninstall(id, Registered::WithArg(handler, arg));
}

pub fn unregister_irq_fn(id: usize, handler: fn()) {
    uninstall(id, Registered::Plain(handler));
}

pub fn unregister_irq_obj<T: IrqHandlerObject>(id: usize, obj: &'static T) {
    uninstall(
        id,
        Registered::WithArg(object_thunk::<T>, obj as *const T as *mut c_void),
    );
}

pub fn is_registered(id: usize) -> bool {
    assert!(id < IRQ_TABLE_LEN);
    TABLE.irqsave_lock()[id].is_some()
}

/// Looks up and invokes the handler for `id`. An empty slot means a
/// peripheral fired that no driver claimed; that is unrecoverable.
pub(crate) fn dispatch(id: usize) {
    let entry = {
        let w = TABLE.irqsave_lock();
        w[id]
    };
    match entry {
        Some(Registered::Plain(f)) => f(),
        Some(Registered::WithArg(f, arg)) => f(arg),
        None => fatal_error(FatalKind::UnexpectedInterrupt),
    }
}

static IRQ_NEST: [AtomicUint; NUM_CORES] = [const { AtomicUint::new(0) }; NUM_CORES];

pub struct Irq;

impl Irq {
    #[inline]
    pub fn enter() {
        IRQ_NEST[arch::current_cpu_id()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn leave() {
        let old = IRQ_NEST[arch::current_cpu_id()].fetch_sub(1, Ordering::Relaxed);
        debug_assert_ne!(old, 0);
    }
}

#[inline]
pub fn is_in_irq() -> bool {
    IRQ_NEST[arch::current_cpu_id()].load(Ordering::Relaxed) != 0
}

macro_rules! gen_trampolines {
    ($($n:literal),+ $(,)?) => {
        paste::paste! {
            $(
                extern "C" fn [<irq_trampoline_ $n>]() {
                    Irq::enter();
                    dispatch($n);
                    Irq::leave();
                }
            )+

            /// One entry point per interrupt id, in id order. Boards
            /// point their vector-table entries here.
            pub static IRQ_TRAMPOLINES: [extern "C" fn(); IRQ_TABLE_LEN] = [
                $( [<irq_trampoline_ $n>] ),+
            ];
        }
    };
}

gen_trampolines!(
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31,
);

const _: () = assert!(IRQ_TABLE_LEN == 32, "trampoline list must match the table");
const _: () = assert!(IRQ_TABLE_LEN <= arch::IRQ_TABLE_CAPACITY);

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    static PLAIN_HITS: AtomicUsize = AtomicUsize::new(0);

    fn plain_handler() {
        PLAIN_HITS.fetch_add(1, Ordering::SeqCst);
    }

    fn counting_handler(arg: *mut c_void) {
        let counter = unsafe { &*(arg as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn register_unregister_round_trip() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let arg = &COUNTER as *const _ as *mut c_void;
        assert!(!is_registered(3));
        register_irq(3, counting_handler, arg);
        assert!(is_registered(3));
        unregister_irq(3, counting_handler, arg);
        assert!(!is_registered(3));
    }

    #[test]
    fn dispatch_passes_the_stored_arg() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let arg = &COUNTER as *const _ as *mut c_void;
        register_irq(4, counting_handler, arg);
        IRQ_TRAMPOLINES[4]();
        IRQ_TRAMPOLINES[4]();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        assert!(!is_in_irq());
        unregister_irq(4, counting_handler, arg);
    }

    #[test]
    fn plain_handler_dispatch() {
        register_irq_fn(5, plain_handler);
        let before = PLAIN_HITS.load(Ordering::SeqCst);
        dispatch(5);
        assert_eq!(PLAIN_HITS.load(Ordering::SeqCst), before + 1);
        unregister_irq_fn(5, plain_handler);
    }

    #[test]
    fn object_handler_dispatch() {
        struct Dev {
            hits: AtomicUsize,
        }
        impl IrqHandlerObject for Dev {
            fn handle_irq(&self) {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
        }
        static DEV: Dev = Dev {
            hits: AtomicUsize::new(0),
        };
        register_irq_obj(6, &DEV);
        dispatch(6);
        assert_eq!(DEV.hits.load(Ordering::SeqCst), 1);
        unregister_irq_obj(6, &DEV);
        assert!(!is_registered(6));
    }

    #[test]
    #[should_panic(expected = "IrqAlreadyRegistered")]
    fn double_register_is_fatal() {
        register_irq_fn(7, plain_handler);
        register_irq_fn(7, plain_handler);
    }

    #[test]
    #[should_panic(expected = "IrqMismatch")]
    fn mismatched_unregister_is_fatal() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        register_irq(8, counting_handler, &COUNTER as *const _ as *mut c_void);
        unregister_irq(8, counting_handler, core::ptr::null_mut());
    }

    #[test]
    #[should_panic(expected = "UnexpectedInterrupt")]
    fn unclaimed_interrupt_is_fatal() {
        dispatch(31);
    }
}
