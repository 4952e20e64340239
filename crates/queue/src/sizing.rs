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

//! Conversions from memory and disk budgets (in MB) to event counts.

use sysinfo::System;

/// Memory footprint per cached event in bytes.
///
/// This is not the size of any single event but the overall memory cost of
/// keeping one event cached, found by experimentation.
pub const EVENT_FOOTPRINT_BYTES: usize = 1024;

/// Largest budget in MB whose byte count fits in a `usize`.
pub const MAX_BUDGET_MB: usize = usize::MAX / 1024 / 1024;

// Conversions saturate at `usize::MAX`.

#[must_use]
pub const fn kb_to_b(amount_kb: usize) -> usize { amount_kb.saturating_mul(1024) }

#[must_use]
pub const fn mb_to_kb(amount_mb: usize) -> usize { amount_mb.saturating_mul(1024) }

#[must_use]
pub const fn gb_to_mb(amount_gb: usize) -> usize { amount_gb.saturating_mul(1024) }

/// Number of events that fit in `amount_mb` megabytes.
#[must_use]
pub const fn events_for_mb(amount_mb: usize) -> usize {
    kb_to_b(mb_to_kb(amount_mb)) / EVENT_FOOTPRINT_BYTES
}

/// Snap a memory budget to one of the canonical tiers, in MB.
///
/// The thresholds are host memory classes (1/4/8/16 GB) but are compared
/// against the configured budget itself.
#[must_use]
pub const fn memory_tier_mb(mem_mb: usize) -> usize {
    if mem_mb <= gb_to_mb(1) {
        256
    } else if mem_mb <= gb_to_mb(4) {
        512
    } else if mem_mb <= gb_to_mb(8) {
        gb_to_mb(1)
    } else if mem_mb <= gb_to_mb(16) {
        gb_to_mb(2)
    } else {
        gb_to_mb(4)
    }
}

/// Records per resident segment of the hybrid queue.
///
/// Head and tail are both resident, so each gets half of the memory tier.
#[must_use]
pub const fn items_per_segment(mem_mb: usize) -> usize {
    kb_to_b(mb_to_kb(memory_tier_mb(mem_mb))) / 2 / EVENT_FOOTPRINT_BYTES
}

/// Event capacity for the given budgets.
///
/// With both budgets set the capacity is taken from their sum. A single
/// budget is used as is. With neither, the host memory size is snapped to a
/// tier; an unknown host gets the smallest tier.
#[must_use]
pub const fn capacity_in_events(mem_mb: usize, disk_mb: usize, host_mb: Option<usize>) -> usize {
    match (mem_mb, disk_mb) {
        (0, 0) => {
            let host_mb = match host_mb {
                Some(mb) => mb,
                None => 0,
            };
            events_for_mb(memory_tier_mb(host_mb))
        }
        (mem, 0) => events_for_mb(mem),
        (0, disk) => events_for_mb(disk),
        (mem, disk) => events_for_mb(mem.saturating_add(disk)),
    }
}

/// Total physical memory of the host in MB, if it can be read.
#[must_use]
pub fn host_memory_mb() -> Option<usize> {
    let mut sys = System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => None,
        total => usize::try_from(total / 1024 / 1024).ok(),
    }
}
