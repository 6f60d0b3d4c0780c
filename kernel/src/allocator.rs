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

//! Kernel heap. Bare-metal builds place a linked-list heap over the
//! linker-provided region; hosted builds use the system allocator.

#[cfg(target_os = "none")]
mod heap {
    use linked_list_allocator::LockedHeap;

    #[global_allocator]
    static HEAP: LockedHeap = LockedHeap::empty();

    /// # Safety
    /// `[start, start+size)` must be unused RAM; call once.
    pub unsafe fn init_heap(start: *mut u8, size: usize) {
        HEAP.lock().init(start, size);
    }

    /// (total, free) bytes of the kernel heap.
    pub fn memory_info() -> (usize, usize) {
        let h = HEAP.lock();
        (h.size(), h.free())
    }
}

#[cfg(target_os = "none")]
pub use heap::{init_heap, memory_info};

#[cfg(not(target_os = "none"))]
pub fn memory_info() -> (usize, usize) {
    (0, 0)
}
