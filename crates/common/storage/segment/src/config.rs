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

use std::{path::PathBuf, time::Duration};

/// Bytes written between two syncs while turbo mode is on.
pub const TURBO_BATCH_BYTES: usize = 4 * 1024 * 1024;

/// Longest time written data may stay unsynced while turbo mode is on.
pub const TURBO_BATCH_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct SegmentStoreConfig {
    pub base_path:         PathBuf,
    /// Maximum number of records held by one segment file.
    pub items_per_segment: usize,
    pub flush_mode:        FlushMode,
}

impl Default for SegmentStoreConfig {
    fn default() -> Self {
        Self {
            base_path:         PathBuf::from("./segment_data"),
            items_per_segment: 4096,
            flush_mode:        FlushMode::Sync,
        }
    }
}

/// When written records are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// `fsync` after every push and pop.
    Sync,
    /// Hand writes to the OS and never `fsync` until the store closes.
    Async,
    /// `fsync` once `bytes` have accumulated or `interval` has elapsed.
    Batch { bytes: usize, interval: Duration },
}

impl FlushMode {
    /// The batched mode used by turbo.
    #[must_use]
    pub const fn turbo() -> Self {
        Self::Batch {
            bytes:    TURBO_BATCH_BYTES,
            interval: TURBO_BATCH_INTERVAL,
        }
    }

    pub fn should_sync(&self, pending_bytes: usize, since_last_sync: Duration) -> bool {
        match self {
            Self::Sync => pending_bytes > 0,
            Self::Async => false,
            Self::Batch { bytes, interval } => {
                pending_bytes >= *bytes || (pending_bytes > 0 && since_last_sync >= *interval)
            }
        }
    }
}
