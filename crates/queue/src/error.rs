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

use std::{io, num::ParseIntError, path::PathBuf};

use evcache_common_storage_segment::SegmentError;
use snafu::Snafu;

use crate::{cache::Stage, payload::PayloadKind};

/// Errors raised by the queue backends.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum QueueError {
    #[snafu(display(
        "queue size on disk ({disk_mb} MB) should be greater or equal to the in-memory size \
         ({mem_mb} MB)"
    ))]
    DiskSmallerThanMemory { mem_mb: usize, disk_mb: usize },

    #[snafu(display("failed to open segment store at {}", path.display()))]
    OpenStore {
        path:   PathBuf,
        source: SegmentError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to remove segment store at {}", path.display()))]
    RemoveStore {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to write to segment store"))]
    WriteStore {
        source: SegmentError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to read from segment store"))]
    ReadStore {
        source: SegmentError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to encode event"))]
    EncodeEvent {
        source: bincode::error::EncodeError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("failed to decode event"))]
    DecodeEvent {
        source: bincode::error::DecodeError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A stored record carries the tag of another payload kind.
    #[snafu(display("expected a {expected} record, found kind tag {found:?}"))]
    KindMismatch {
        expected: PayloadKind,
        found:    Option<u8>,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },
}

/// Errors raised by the cache facade.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum CacheError {
    /// The operation targets the payload kind the cache is not bound to.
    #[snafu(display("{operation} is not valid for a {stage} cache"))]
    StageMismatch {
        operation: &'static str,
        stage:     Stage,
    },

    #[snafu(transparent)]
    Queue { source: QueueError },
}

/// Errors raised while turning `key=value` cache options into a cache.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum OptionsError {
    #[snafu(display("unrecognized cache option format: {token}"))]
    UnrecognizedFormat { token: String },

    #[snafu(display("unrecognized cache-type option: {token} (valid options are: none,mem,hybrid)"))]
    UnrecognizedCacheType { token: String },

    #[snafu(display(
        "unrecognized cache-stage option: {token} (valid options are: before-decode,after-decode)"
    ))]
    UnrecognizedCacheStage { token: String },

    #[snafu(display(
        "you need to specify cache-type=mem or cache-type=hybrid before setting {key}"
    ))]
    CacheTypeRequired { key: String },

    #[snafu(display("you need to specify cache-type=hybrid before setting {key}"))]
    HybridRequired { key: String },

    #[snafu(display("could not parse {key} value: {source}"))]
    InvalidSize { key: String, source: ParseIntError },

    #[snafu(display("{key} value {mb} MB is too large (at most {max} MB)"))]
    SizeTooLarge {
        key: &'static str,
        mb:  usize,
        max: usize,
    },

    #[snafu(display(
        "disk-cache-size ({disk_mb} MB) must be greater or equal to mem-cache-size ({mem_mb} MB)"
    ))]
    DiskSmallerThanMemoryOption { mem_mb: usize, disk_mb: usize },

    #[snafu(display("failed to build cache: {source}"))]
    BuildCache {
        source: QueueError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
