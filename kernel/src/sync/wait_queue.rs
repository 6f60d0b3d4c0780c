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

//! The FIFO wait list every blocking primitive parks on. An entry is
//! shared between the parked thread and the queue; the `taken` flag is
//! how the waking side tells the parked thread it was dequeued on
//! purpose (token or ownership handed over), as opposed to a timeout
//! or a spurious resume.

use crate::{
    thread::ThreadNode,
    types::{impl_intrusive_adapter, Arc, ArcList, IlistHead},
};
use core::sync::atomic::{AtomicBool, Ordering};

impl_intrusive_adapter!(OffsetOfWait, WaitEntry, wait_node);

pub type WaitQueue = ArcList<WaitEntry, OffsetOfWait>;

#[derive(Debug)]
pub struct WaitEntry {
    pub wait_node: IlistHead<WaitEntry, OffsetOfWait>,
    pub thread: ThreadNode,
    taken: AtomicBool,
}

impl WaitEntry {
    pub fn new(thread: ThreadNode) -> Arc<Self> {
        Arc::new(Self {
            wait_node: IlistHead::const_new(),
            thread,
            taken: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn mark_taken(&self) {
        self.taken.store(true, Ordering::Release);
    }

    #[inline]
    pub fn taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }

    /// Still linked into the wait list. Callers hold the queue lock.
    #[inline]
    pub fn is_queued(&self) -> bool {
        !self.wait_node.is_detached()
    }
}
