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

//! Hosted-test scaffolding: brings the scheduler statics up once and
//! adopts the test runner as the Running thread, the same shape boot
//! leaves the kernel in. Tests that touch scheduler state serialize
//! through [`with_kernel`] because that state is process-global.

use crate::{scheduler, thread, time};
use std::sync::{Mutex, Once, PoisonError};

static INIT: Once = Once::new();
static KERNEL: Mutex<()> = Mutex::new(());

extern "C" fn test_main() {}

fn init_once() {
    time::clock_init();
    scheduler::init();
    let main = thread::Builder::new(thread::Entry::C(test_main))
        .build()
        .expect("test main thread");
    // SAFETY: boot-equivalent staging; nothing is scheduled yet.
    unsafe { main.set_state(thread::RUNNING) };
    main.set_on_cpu(true);
    let idle = scheduler::set_current_thread(main);
    let ok = idle.transfer_state(thread::RUNNING, thread::READY);
    assert!(ok);
    idle.set_on_cpu(false);
}

pub(crate) fn with_kernel<R>(f: impl FnOnce() -> R) -> R {
    let _serial = KERNEL.lock().unwrap_or_else(PoisonError::into_inner);
    INIT.call_once(init_once);
    f()
}
