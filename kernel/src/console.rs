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

//! Byte sink for the logger and the panic path. This is not a serial
//! driver: bare-metal output goes through semihosting, hosted output to
//! stdout.

/// Prints a line to the console sink.
#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {{
        #[cfg(target_os = "none")]
        semihosting::println!($($arg)*);
        #[cfg(not(target_os = "none"))]
        std::println!($($arg)*);
    }};
}
