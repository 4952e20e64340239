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

use std::fmt;

use crate::{Result, payload::Payload};

/// A bounded, blocking FIFO of one payload kind.
///
/// # Concurrency
///
/// An instance serves exactly one producer thread and one consumer thread.
/// A successful enqueue wakes a single waiting consumer and a successful
/// dequeue wakes a single waiting producer. With more than one waiter on the
/// same side a wakeup can go to the wrong thread and leave the other parked,
/// so implementations supporting several producers or consumers must switch
/// to broadcast-and-recheck.
///
/// Neither `enqueue` nor `dequeue` can be cancelled or time out; a caller
/// needing bounded waits must wrap them and be ready to abandon a blocked
/// call.
///
/// The `Display` output is a human readable description of the queue.
pub trait EventQueue<T: Payload>: fmt::Display + Send + Sync {
    /// Append `item`, blocking while the queue is full.
    ///
    /// After teardown the item is discarded and the call returns at once.
    fn enqueue(&self, item: T);

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been torn down, and, on the hybrid
    /// backend, when reading the item back failed.
    fn dequeue(&self) -> Option<T>;

    /// Items currently queued. Lock-free; may be momentarily stale.
    fn size(&self) -> usize;

    /// Maximum number of queued items, fixed at construction.
    fn capacity(&self) -> usize;

    /// Release backing resources and wake every blocked caller.
    ///
    /// Idempotent: later calls succeed without doing anything new.
    fn teardown(&self) -> Result<()>;
}
