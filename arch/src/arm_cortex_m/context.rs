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

/// Saved thread state as laid out by the PendSV handler: the
/// software-pushed words (EXC_RETURN, CONTROL, r4-r11) directly below
/// the hardware-stacked exception frame. A fresh thread gets one of
/// these carved from the top of its stack, shaped as if it had just
/// been preempted on entry.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub exc_return: u32,
    pub control: u32,
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    // Hardware-stacked part.
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// Return to thread mode, process stack, no FPU state.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;
/// Unprivileged bit clear, SPSEL set: threads run privileged on PSP.
const CONTROL_THREAD: u32 = 0x2;
/// Thumb state bit; everything else clear.
const XPSR_THUMB: u32 = 0x0100_0000;

/// Words the reschedule interrupt stores per thread.
pub const CONTEXT_WORDS: usize = core::mem::size_of::<Context>() / 4;

/// AAPCS stack alignment at every call boundary.
pub const STACK_ALIGN: usize = 8;

/// Headroom above the context frame: one more hardware frame for a late
/// interrupt plus FPU lazy-stacking space on cores that have it.
pub const EXTRA_STACK_RESERVE: usize = 32 + 72;

impl Context {
    pub fn init(&mut self) -> &mut Self {
        *self = Self::default();
        self.exc_return = EXC_RETURN_THREAD_PSP;
        self.control = CONTROL_THREAD;
        self.xpsr = XPSR_THUMB;
        self
    }

    #[inline]
    pub fn set_return_address(&mut self, addr: usize) -> &mut Self {
        self.pc = addr as u32;
        self
    }

    #[inline]
    pub fn set_arg(&mut self, n: usize, val: usize) -> &mut Self {
        match n {
            0 => self.r0 = val as u32,
            1 => self.r1 = val as u32,
            _ => unreachable!("entry functions take at most two args"),
        }
        self
    }
}
