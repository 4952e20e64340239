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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Segment store operation errors.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum SegmentError {
    /// Filesystem I/O failure on a segment file or the store directory.
    #[snafu(display("IO error on {}", path.display()))]
    Io {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// CRC mismatch or impossible length detected while loading a segment.
    #[snafu(display("Corrupted record in segment {segment} at offset {offset}"))]
    CorruptedRecord {
        segment: u64,
        offset:  u64,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// Payload does not fit in a single frame.
    #[snafu(display("Record of {len} bytes exceeds the maximum frame size"))]
    RecordTooLarge {
        len: usize,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// A segment between the head and the tail is absent from disk.
    #[snafu(display("Segment {number} is missing from {}", path.display()))]
    MissingSegment {
        number: u64,
        path:   PathBuf,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The store has been closed and no longer accepts operations.
    #[snafu(display("Segment store is closed"))]
    StoreClosed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Turbo mode is already on"))]
    TurboAlreadyOn {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Turbo mode is already off"))]
    TurboAlreadyOff {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}

impl SegmentError {
    /// Returns `true` when the error only says the store was closed, as
    /// opposed to a storage fault.
    #[must_use]
    pub const fn is_closed(&self) -> bool { matches!(self, Self::StoreClosed { .. }) }
}

/// Result type for segment store operations.
pub type Result<T> = std::result::Result<T, SegmentError>;
