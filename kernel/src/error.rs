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

//! Failure policy: programming faults are unrecoverable and funnel
//! through [`fatal_error`]; everything transient is an ordinary value
//! (`bool` from `try_*`, [`TimeoutResult`] from `timed_*`). Nothing in
//! the kernel unwinds across an API boundary.

use crate::kprintln;
use osprey_arch as arch;

/// Outcome of a `timed_*` wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutResult {
    NoTimeout,
    Timeout,
}

impl TimeoutResult {
    #[inline]
    pub fn timed_out(self) -> bool {
        self == TimeoutResult::Timeout
    }
}

/// Programming faults. Each of these means kernel or driver code broke
/// an API contract; none of them can be handled at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// An interrupt fired with no registered handler.
    UnexpectedInterrupt,
    /// `register_irq` on an id that already has a handler.
    IrqAlreadyRegistered,
    /// `unregister_irq` with a handler/arg pair that does not match.
    IrqMismatch,
    /// A mutex was unlocked by a thread that does not own it.
    MutexUnlockNotOwner,
    /// A fast (non-recursive) mutex was relocked by its owner.
    MutexRelock,
    /// `join` on a thread that was already joined or detached.
    InvalidJoin,
    /// A blocking call was made from interrupt context or while the
    /// kernel was paused.
    BlockingForbidden,
    /// Scheduler self-check failed.
    SchedulerBroken,
    /// The secondary core did not answer the bring-up handshake.
    SmpHandshake,
    /// A thread stack was found out of bounds.
    StackOverflow,
}

/// Terminal error path: masks interrupts, reports, reboots. On hosted
/// builds this panics instead so tests can assert on the fault.
pub fn fatal_error(kind: FatalKind) -> ! {
    arch::disable_local_irq();
    kprintln!("fatal kernel error: {:?}", kind);
    #[cfg(target_os = "none")]
    {
        arch::sys_reset()
    }
    #[cfg(not(target_os = "none"))]
    {
        panic!("fatal kernel error: {:?}", kind);
    }
}
