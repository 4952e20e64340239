// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Panic logging and optional deadlock detection.
//!
//! The queue's producer and consumer are plain threads; a panic in either
//! would otherwise only reach stderr.

#[cfg(feature = "deadlock_detection")]
use std::time::Duration;
use std::{panic, sync::LazyLock};

use backtrace::Backtrace;
use prometheus::{IntCounter, register_int_counter};

pub static PANIC_COUNTER: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("evcache_panic_counter", "Number of panics observed").unwrap()
});

/// Chain a hook in front of the current panic hook that logs the panic as
/// an error event with its location and backtrace and bumps
/// [`PANIC_COUNTER`].
///
/// With the `deadlock_detection` feature a background thread also reports
/// `parking_lot` deadlocks every five seconds.
pub fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let backtrace = format!("{:?}", Backtrace::new());
        match info.location() {
            Some(location) => tracing::error!(
                message = %info,
                backtrace = %backtrace,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
            ),
            None => tracing::error!(message = %info, backtrace = %backtrace),
        }
        PANIC_COUNTER.inc();
        default_hook(info);
    }));

    #[cfg(feature = "deadlock_detection")]
    let _ = std::thread::Builder::new()
        .name("deadlock-detector".to_string())
        .spawn(|| {
            loop {
                std::thread::sleep(Duration::from_secs(5));
                let deadlocks = parking_lot::deadlock::check_deadlock();
                if deadlocks.is_empty() {
                    continue;
                }

                tracing::error!(count = deadlocks.len(), "Deadlocks detected");
                for (i, threads) in deadlocks.iter().enumerate() {
                    for t in threads {
                        tracing::error!(
                            deadlock = i,
                            thread_id = ?t.thread_id(),
                            backtrace = ?t.backtrace(),
                        );
                    }
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_is_counted() {
        set_panic_hook();
        let before = PANIC_COUNTER.get();

        let result = std::thread::spawn(|| panic!("worker failed")).join();

        assert!(result.is_err());
        assert_eq!(PANIC_COUNTER.get(), before + 1);
    }
}
