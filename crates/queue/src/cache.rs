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

//! The cache facade the pipeline stages talk to.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{CacheError, StageMismatchSnafu},
    event::Event,
    queue::EventQueue,
};

/// Where in the pipeline the cache sits, which also fixes what it carries.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// Between capture and decode; carries raw bytes.
    BeforeDecode,
    /// After decode; carries [`Event`] records.
    #[default]
    AfterDecode,
}

/// The one queue a cache owns.
pub enum BoundQueue {
    Decoded(Box<dyn EventQueue<Event>>),
    Raw(Box<dyn EventQueue<Bytes>>),
}

/// A queue bound to a pipeline stage.
///
/// Built once at startup and immutable afterwards. Share it between the
/// producing and the consuming stage with an `Arc`.
pub struct CacheConfig {
    queue: BoundQueue,
}

impl CacheConfig {
    /// A cache of decoded events, placed after the decode stage.
    #[must_use]
    pub fn after_decode(queue: Box<dyn EventQueue<Event>>) -> Self {
        info!(queue = %queue, stage = %Stage::AfterDecode, "Cache configured");
        Self {
            queue: BoundQueue::Decoded(queue),
        }
    }

    /// A cache of raw bytes, placed before the decode stage.
    #[must_use]
    pub fn before_decode(queue: Box<dyn EventQueue<Bytes>>) -> Self {
        info!(queue = %queue, stage = %Stage::BeforeDecode, "Cache configured");
        Self {
            queue: BoundQueue::Raw(queue),
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self.queue {
            BoundQueue::Decoded(_) => Stage::AfterDecode,
            BoundQueue::Raw(_) => Stage::BeforeDecode,
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &BoundQueue { &self.queue }

    pub fn enqueue(&self, event: Event) -> Result<(), CacheError> {
        let queue = self.decoded("enqueue")?;
        queue.enqueue(event);
        Ok(())
    }

    /// Blocks while empty. `Ok(None)` once the cache is torn down.
    pub fn dequeue(&self) -> Result<Option<Event>, CacheError> {
        Ok(self.decoded("dequeue")?.dequeue())
    }

    pub fn enqueue_raw(&self, raw: Bytes) -> Result<(), CacheError> {
        let queue = self.raw("enqueue_raw")?;
        queue.enqueue(raw);
        Ok(())
    }

    /// Blocks while empty. `Ok(None)` once the cache is torn down.
    pub fn dequeue_raw(&self) -> Result<Option<Bytes>, CacheError> {
        Ok(self.raw("dequeue_raw")?.dequeue())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        match &self.queue {
            BoundQueue::Decoded(q) => q.size(),
            BoundQueue::Raw(q) => q.size(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.queue {
            BoundQueue::Decoded(q) => q.capacity(),
            BoundQueue::Raw(q) => q.capacity(),
        }
    }

    pub fn teardown(&self) -> Result<(), CacheError> {
        match &self.queue {
            BoundQueue::Decoded(q) => q.teardown()?,
            BoundQueue::Raw(q) => q.teardown()?,
        }
        Ok(())
    }

    fn decoded(&self, operation: &'static str) -> Result<&dyn EventQueue<Event>, CacheError> {
        match &self.queue {
            BoundQueue::Decoded(q) => Ok(&**q),
            BoundQueue::Raw(_) => self.mismatch(operation),
        }
    }

    fn raw(&self, operation: &'static str) -> Result<&dyn EventQueue<Bytes>, CacheError> {
        match &self.queue {
            BoundQueue::Raw(q) => Ok(&**q),
            BoundQueue::Decoded(_) => self.mismatch(operation),
        }
    }

    fn mismatch<T>(&self, operation: &'static str) -> Result<T, CacheError> {
        StageMismatchSnafu {
            operation,
            stage: self.stage(),
        }
        .fail()
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.queue {
            BoundQueue::Decoded(q) => write!(f, "{q} ({})", Stage::AfterDecode),
            BoundQueue::Raw(q) => write!(f, "{q} ({})", Stage::BeforeDecode),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("stage", &self.stage())
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
