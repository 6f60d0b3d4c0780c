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

//! RP2040-family single-cycle IO block: the core id register, the 32
//! hardware spinlocks and the inter-core mailbox FIFO. This is the whole
//! substrate the kernel's SMP support stands on.

use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

register_structs! {
    SioRegisters {
        /// Id of the core reading the register.
        (0x000 => cpuid: ReadOnly<u32, CPUID::Register>),

        (0x004 => _reserved0),

        /// Inter-core FIFO status.
        (0x050 => fifo_st: ReadWrite<u32, FIFO_ST::Register>),

        /// Write to the outgoing FIFO.
        (0x054 => fifo_wr: ReadWrite<u32, FIFO_WR::Register>),

        /// Read from the incoming FIFO.
        (0x058 => fifo_rd: ReadOnly<u32, FIFO_RD::Register>),

        (0x05c => _reserved1),

        /// Hardware spinlocks. Reading a nonzero value takes the lock,
        /// any write releases it.
        (0x100 => spinlock: [ReadWrite<u32, SPINLOCK::Register>; 32]),

        (0x180 => @END),
    }
}

register_bitfields! [u32,
    CPUID [
        VALUE OFFSET(0) NUMBITS(32)
    ],
    FIFO_ST [
        /// Incoming FIFO was read while empty.
        ROE OFFSET(3) NUMBITS(1) [],
        /// Outgoing FIFO was written while full.
        WOF OFFSET(2) NUMBITS(1) [],
        /// Outgoing FIFO is not full.
        RDY OFFSET(1) NUMBITS(1) [],
        /// Incoming FIFO is not empty.
        VLD OFFSET(0) NUMBITS(1) []
    ],
    FIFO_WR [
        VALUE OFFSET(0) NUMBITS(32)
    ],
    FIFO_RD [
        VALUE OFFSET(0) NUMBITS(32)
    ],
    SPINLOCK [
        VALUE OFFSET(0) NUMBITS(32)
    ],
];

const SIO_BASE_ADDRESS: usize = 0xd000_0000;

#[inline]
fn sio() -> &'static SioRegisters {
    // SAFETY: fixed MMIO block, always mapped.
    unsafe { &*(SIO_BASE_ADDRESS as *const SioRegisters) }
}

pub const NUM_SPINLOCKS: usize = 32;

#[inline]
pub fn cpu_id() -> usize {
    sio().cpuid.get() as usize
}

/// Tries to take hardware spinlock `n`. A nonzero read means the lock
/// was free and is now held by this core.
#[inline]
pub fn spinlock_try_lock(n: usize) -> bool {
    sio().spinlock[n].get() != 0
}

#[inline]
pub fn spinlock_lock(n: usize) {
    while !spinlock_try_lock(n) {
        core::hint::spin_loop();
    }
}

#[inline]
pub fn spinlock_unlock(n: usize) {
    sio().spinlock[n].set(1);
}

#[inline]
pub fn fifo_ready() -> bool {
    sio().fifo_st.is_set(FIFO_ST::RDY)
}

#[inline]
pub fn fifo_valid() -> bool {
    sio().fifo_st.is_set(FIFO_ST::VLD)
}

/// Clears the sticky overflow/underflow error flags.
#[inline]
pub fn fifo_clear_errors() {
    sio().fifo_st.set(0);
}

pub fn fifo_drain() {
    while fifo_valid() {
        let _ = sio().fifo_rd.get();
    }
}

pub fn fifo_write_blocking(v: u32) {
    while !fifo_ready() {
        core::hint::spin_loop();
    }
    sio().fifo_wr.set(v);
    cortex_m::asm::sev();
}

pub fn fifo_read_blocking() -> u32 {
    while !fifo_valid() {
        cortex_m::asm::wfe();
    }
    sio().fifo_rd.get()
}

/// Non-blocking read for IPI handlers that already saw VLD set.
pub fn fifo_read() -> Option<u32> {
    if !fifo_valid() {
        return None;
    }
    Some(sio().fifo_rd.get())
}
