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

use std::{collections::VecDeque, path::Path, time::Instant};

use bytes::Bytes;
use snafu::{ResultExt, ensure};
use tracing::{error, info, warn};

use crate::{
    FlushMode, Result, SegmentStoreConfig,
    error::{
        IoSnafu, MissingSegmentSnafu, StoreClosedSnafu, TurboAlreadyOffSnafu, TurboAlreadyOnSnafu,
    },
    frame::TOMBSTONE_SIZE,
    path::{quarantine_file_path, scan_segment_numbers, segment_file_path},
    segment::Segment,
};

/// A FIFO of byte records persisted as numbered segment files.
///
/// Every record lives on disk. Only two segments are ever resident: the
/// head, which serves pops, and the tail, which takes pushes. Segments in
/// between exist on disk only and are loaded one at a time as the head
/// advances, so resident memory is bounded by `2 * items_per_segment`
/// records.
///
/// A segment that cannot be read back when the head reaches it is moved
/// aside with a `.corrupt` suffix and its records are dropped from `size`.
///
/// The store is not internally synchronized; callers wrap it in a lock.
pub struct SegmentStore {
    config:        SegmentStoreConfig,
    /// Oldest segment with unread records.
    head:          Segment,
    /// Newest segment. `None` while the head is also the tail.
    tail:          Option<Segment>,
    /// Segments between head and tail, on disk only, with their unread
    /// record counts.
    middle:        VecDeque<(u64, usize)>,
    /// Unread records across all segments, resident or not.
    size:          usize,
    /// Flush mode in effect; differs from `config.flush_mode` under turbo.
    flush_mode:    FlushMode,
    turbo:         bool,
    pending_bytes: usize,
    last_sync:     Instant,
    closed:        bool,
}

impl SegmentStore {
    /// Open the store, recovering any segments already in `base_path`.
    pub(crate) fn open(config: SegmentStoreConfig) -> Result<Self> {
        let base = config.base_path.clone();
        std::fs::create_dir_all(&base).context(IoSnafu { path: &base })?;

        let numbers = scan_segment_numbers(&base)?;
        let (head, tail, middle) = match numbers.as_slice() {
            [] => (Segment::create(&base, 1)?, None, VecDeque::new()),
            [only] => (Segment::load(&base, *only)?, None, VecDeque::new()),
            [first, .., last] => {
                if let Some(missing) = (*first..=*last).find(|n| {
                    numbers.binary_search(n).is_err() && !quarantine_file_path(&base, *n).exists()
                }) {
                    return MissingSegmentSnafu {
                        number: missing,
                        path:   segment_file_path(&base, missing),
                    }
                    .fail();
                }
                // Counted rather than derived from `items_per_segment`, which
                // may differ from the run that wrote them.
                let middle = numbers[1..numbers.len() - 1]
                    .iter()
                    .map(|&number| (number, count_middle(&base, number)))
                    .collect::<VecDeque<_>>();
                (
                    Segment::load(&base, *first)?,
                    Some(Segment::load(&base, *last)?),
                    middle,
                )
            }
        };

        let size = head.len()
            + middle.iter().map(|(_, unread)| unread).sum::<usize>()
            + tail.as_ref().map_or(0, Segment::len);

        let mut store = Self {
            flush_mode: config.flush_mode,
            config,
            head,
            tail,
            middle,
            size,
            turbo: false,
            pending_bytes: 0,
            last_sync: Instant::now(),
            closed: false,
        };

        // A crash between the last pop of a segment and its deletion leaves
        // an exhausted head behind.
        while store.head_is_exhausted() {
            store.advance_head()?;
        }

        info!(
            path = ?store.config.base_path,
            items_per_segment = store.config.items_per_segment,
            head = store.head.number(),
            tail = store.tail_ref().number(),
            size = store.size,
            "Segment store opened"
        );

        Ok(store)
    }

    /// Append a record at the tail, rolling to a new segment when the tail
    /// is full.
    pub fn push(&mut self, data: impl Into<Bytes>) -> Result<()> {
        ensure!(!self.closed, StoreClosedSnafu);

        if self.tail_ref().is_full(self.config.items_per_segment) {
            self.roll_tail()?;
        }

        let written = self.tail_mut().append(data.into())?;
        self.size += 1;
        self.after_write(written)
    }

    /// Remove and return the oldest record, or `None` when the store is
    /// empty.
    ///
    /// An error leaves every record in place, so the call can be retried.
    pub fn pop(&mut self) -> Result<Option<Bytes>> {
        ensure!(!self.closed, StoreClosedSnafu);

        // A head left exhausted by an earlier failed advance.
        while self.head_is_exhausted() {
            self.advance_head()?;
        }

        let Some(item) = self.head.remove_front()? else {
            if self.size != 0 {
                warn!(
                    path = ?self.config.base_path,
                    size = self.size,
                    "Store has no readable records, resetting size"
                );
                self.size = 0;
            }
            return Ok(None);
        };
        self.size -= 1;

        // The record is taken; failures past this point are retried on the
        // next pop or sync.
        if self.head_is_exhausted()
            && let Err(e) = self.advance_head()
        {
            warn!(
                error = ?e,
                head = self.head.number(),
                "Failed to advance head, retrying on next pop"
            );
        }
        if let Err(e) = self.after_write(TOMBSTONE_SIZE) {
            warn!(error = ?e, path = ?self.config.base_path, "Failed to sync after pop");
        }
        Ok(Some(item))
    }

    /// The oldest record without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&Bytes> { self.head.front() }

    /// Unread records in the store.
    #[must_use]
    pub const fn size(&self) -> usize { self.size }

    #[must_use]
    pub const fn is_empty(&self) -> bool { self.size == 0 }

    /// Records currently held in memory by the head and tail segments.
    #[must_use]
    pub fn resident_len(&self) -> usize {
        self.head.len() + self.tail.as_ref().map_or(0, Segment::len)
    }

    /// Numbers of the head and tail segments.
    #[must_use]
    pub fn segment_range(&self) -> (u64, u64) { (self.head.number(), self.tail_ref().number()) }

    #[must_use]
    pub const fn config(&self) -> &SegmentStoreConfig { &self.config }

    #[must_use]
    pub const fn is_turbo(&self) -> bool { self.turbo }

    /// Switch to batched syncing for throughput.
    ///
    /// Writes are no longer synced one by one; data written since the last
    /// sync is lost if the host crashes.
    pub fn turbo_on(&mut self) -> Result<()> {
        ensure!(!self.closed, StoreClosedSnafu);
        ensure!(!self.turbo, TurboAlreadyOnSnafu);

        self.turbo = true;
        self.flush_mode = FlushMode::turbo();
        info!(path = ?self.config.base_path, "Turbo mode on");
        Ok(())
    }

    /// Return to the configured flush mode, syncing whatever is pending.
    pub fn turbo_off(&mut self) -> Result<()> {
        ensure!(!self.closed, StoreClosedSnafu);
        ensure!(self.turbo, TurboAlreadyOffSnafu);

        self.turbo_sync()?;
        self.turbo = false;
        self.flush_mode = self.config.flush_mode;
        info!(path = ?self.config.base_path, "Turbo mode off");
        Ok(())
    }

    /// Force pending writes to disk.
    pub fn turbo_sync(&mut self) -> Result<()> {
        ensure!(!self.closed, StoreClosedSnafu);
        self.sync_resident()
    }

    /// Sync and release the store. Further pushes and pops fail with
    /// `StoreClosed`. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sync_resident()?;
        info!(path = ?self.config.base_path, size = self.size, "Segment store closed");
        Ok(())
    }

    fn tail_ref(&self) -> &Segment { self.tail.as_ref().unwrap_or(&self.head) }

    fn tail_mut(&mut self) -> &mut Segment {
        match self.tail {
            Some(ref mut tail) => tail,
            None => &mut self.head,
        }
    }

    /// Start a new tail. The previous tail, unless it is the head, leaves
    /// memory and lives on disk only.
    fn roll_tail(&mut self) -> Result<()> {
        let next = self.tail_ref().number() + 1;
        let segment = Segment::create(&self.config.base_path, next)?;
        if let Some(previous) = self.tail.replace(segment) {
            self.middle.push_back((previous.number(), previous.len()));
            previous.sync()?;
        } else {
            self.head.sync()?;
        }
        self.pending_bytes = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// The head has nothing left to serve and a later segment can take
    /// over.
    fn head_is_exhausted(&self) -> bool {
        self.head.len() == 0
            && (self.tail.is_some() || self.head.is_full(self.config.items_per_segment))
    }

    /// Drop the exhausted head and make the next readable segment the head.
    ///
    /// Only fails when a fresh segment cannot be created, in which case
    /// nothing has changed.
    fn advance_head(&mut self) -> Result<()> {
        let new_head = loop {
            if let Some((number, unread)) = self.middle.pop_front() {
                match Segment::load(&self.config.base_path, number) {
                    Ok(segment) => {
                        self.size = self.size - unread.min(self.size) + segment.len();
                        break segment;
                    }
                    Err(e) => {
                        error!(
                            error = ?e,
                            segment = number,
                            lost = unread,
                            "Skipping unreadable segment"
                        );
                        self.size -= unread.min(self.size);
                        quarantine(&self.config.base_path, number);
                    }
                }
            } else if let Some(tail) = self.tail.take() {
                break tail;
            } else {
                break Segment::create(&self.config.base_path, self.head.number() + 1)?;
            }
        };

        let consumed = std::mem::replace(&mut self.head, new_head);
        let number = consumed.number();
        if let Err(e) = consumed.delete() {
            warn!(error = ?e, segment = number, "Failed to delete consumed segment");
        }
        Ok(())
    }

    fn after_write(&mut self, written: usize) -> Result<()> {
        self.pending_bytes += written;
        if self
            .flush_mode
            .should_sync(self.pending_bytes, self.last_sync.elapsed())
        {
            self.sync_resident()?;
        }
        Ok(())
    }

    fn sync_resident(&mut self) -> Result<()> {
        self.head.sync()?;
        if let Some(ref tail) = self.tail {
            tail.sync()?;
        }
        self.pending_bytes = 0;
        self.last_sync = Instant::now();
        Ok(())
    }
}

/// Unread records in a middle segment; an unreadable one counts as empty and
/// is skipped when the head reaches it.
fn count_middle(base: &Path, number: u64) -> usize {
    Segment::count_unread(base, number).unwrap_or_else(|e| {
        warn!(error = ?e, segment = number, "Cannot count records in segment");
        0
    })
}

/// Move an unreadable segment out of the way of later scans.
fn quarantine(base: &Path, number: u64) {
    let from = segment_file_path(base, number);
    let to = quarantine_file_path(base, number);
    if let Err(e) = std::fs::rename(&from, &to) {
        warn!(error = ?e, from = ?from, "Failed to quarantine segment");
    }
}

impl Drop for SegmentStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = ?e, path = ?self.config.base_path, "Failed to sync segment store on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::SegmentStoreBuilder;

    fn open(temp_dir: &TempDir, items_per_segment: usize) -> SegmentStore {
        SegmentStoreBuilder::new(temp_dir.path())
            .items_per_segment(items_per_segment)
            .flush_mode(FlushMode::Async)
            .open()
            .unwrap()
    }

    #[test]
    fn test_push_pop_fifo() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 4);

        for i in 0..10 {
            store.push(format!("record-{i}")).unwrap();
        }
        assert_eq!(store.size(), 10);

        for i in 0..10 {
            let record = store.pop().unwrap().unwrap();
            assert_eq!(record.as_ref(), format!("record-{i}").as_bytes());
        }
        assert!(store.pop().unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_only_head_and_tail_are_resident() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 3);

        for i in 0..10u32 {
            store.push(i.to_le_bytes().to_vec()).unwrap();
        }

        // segments 1..=4: 3 + 3 + 3 + 1, segments 2 and 3 on disk only
        assert_eq!(store.segment_range(), (1, 4));
        assert_eq!(store.size(), 10);
        assert_eq!(store.resident_len(), 4);
        assert!(store.resident_len() <= 2 * 3);
    }

    #[test]
    fn test_consumed_segments_are_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        for i in 0..5 {
            store.push(format!("r{i}")).unwrap();
        }
        for _ in 0..4 {
            store.pop().unwrap().unwrap();
        }

        assert_eq!(store.segment_range(), (3, 3));
        assert!(!segment_file_path(temp_dir.path(), 1).exists());
        assert!(!segment_file_path(temp_dir.path(), 2).exists());
        assert_eq!(store.pop().unwrap().unwrap().as_ref(), b"r4");
    }

    #[test]
    fn test_exhausting_single_segment_starts_a_new_one() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        store.push("a").unwrap();
        store.push("b").unwrap();
        store.pop().unwrap();
        store.pop().unwrap();

        assert_eq!(store.segment_range(), (2, 2));
        store.push("c").unwrap();
        assert_eq!(store.pop().unwrap().unwrap().as_ref(), b"c");
    }

    #[test]
    fn test_peek_does_not_remove() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 4);

        assert!(store.peek().is_none());
        store.push("first").unwrap();
        assert_eq!(store.peek().unwrap().as_ref(), b"first");
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_turbo_toggle() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 4);

        assert!(!store.is_turbo());
        store.turbo_on().unwrap();
        assert!(store.is_turbo());
        assert!(store.turbo_on().is_err());

        store.push("x").unwrap();
        store.turbo_sync().unwrap();
        store.turbo_off().unwrap();
        assert!(store.turbo_off().is_err());
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 4);

        store.close().unwrap();
        store.close().unwrap();
        assert!(store.push("late").unwrap_err().is_closed());
        assert!(store.pop().unwrap_err().is_closed());
    }

    #[test]
    fn test_missing_middle_segment_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir, 1);
            for i in 0..3 {
                store.push(format!("r{i}")).unwrap();
            }
        }
        std::fs::remove_file(segment_file_path(temp_dir.path(), 2)).unwrap();

        let err = SegmentStoreBuilder::new(temp_dir.path())
            .items_per_segment(1)
            .open()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Segment 2 is missing"));
    }
}
