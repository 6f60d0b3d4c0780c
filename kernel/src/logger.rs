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

//! `log` facade backend: tick count, core and thread id in front of
//! every record, bytes out through the console sink.

use crate::{kprintln, scheduler, sync::SpinLock, time::get_sys_ticks};
use log::{LevelFilter, Metadata, Record};
use osprey_arch as arch;

static SINK_MUTEX: SpinLock<()> = SpinLock::new(());

struct Logger;

static LOGGER: Logger = Logger;

pub fn init() {
    if cfg!(debug_assertions) {
        log::set_max_level(LevelFilter::Trace);
    } else {
        log::set_max_level(LevelFilter::Warn);
    }
    let _ = log::set_logger(&LOGGER);
}

pub fn set_max_level(level: LevelFilter) {
    log::set_max_level(level);
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tick = get_sys_ticks();
        let cpu = arch::current_cpu_id();
        let tid = scheduler::try_current_thread_id().unwrap_or(0);
        let _serial = SINK_MUTEX.irqsave_lock();
        kprintln!(
            "[T:{:09} C:{} TH:0x{:x}][{}] {}",
            tick,
            cpu,
            tid,
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}
