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

use std::{
    fmt,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use evcache_common_storage_segment::{FlushMode, SegmentStore, SegmentStoreBuilder};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{IntoError, ResultExt, ensure};
use tracing::{debug, error, info, warn};

use crate::{
    Result,
    error::{
        DiskSmallerThanMemorySnafu, OpenStoreSnafu, ReadStoreSnafu, RemoveStoreSnafu,
        WriteStoreSnafu,
    },
    payload::{Payload, decode_record, encode_record},
    queue::EventQueue,
    sizing::{events_for_mb, items_per_segment, memory_tier_mb},
};

/// Default location of the hybrid queue's segment store.
#[must_use]
pub fn default_store_path() -> PathBuf { std::env::temp_dir().join("evcache").join("hybrid_cache") }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct HybridOptions {
    /// Memory budget in MB; sets the size of the resident segments.
    pub mem_mb:       usize,
    /// Disk budget in MB; sets the queue capacity.
    #[default = 8192]
    pub disk_mb:      usize,
    /// Directory holding the segment files. Owned exclusively by one queue.
    #[default(_code = "default_store_path()")]
    pub store_path:   PathBuf,
    /// Discard whatever a previous run left at `store_path`.
    #[default = true]
    pub wipe_on_open: bool,
}

/// Bounded FIFO whose items are persisted in a segment store; only the head
/// and tail segments stay in memory.
pub struct HybridQueue<T> {
    /// `None` once torn down.
    store:             Mutex<Option<SegmentStore>>,
    cond:              Condvar,
    size:              AtomicUsize,
    capacity:          usize,
    items_per_segment: usize,
    options:           HybridOptions,
    label:             String,
    _kind:             PhantomData<fn() -> T>,
}

impl<T: Payload> HybridQueue<T> {
    pub fn new(options: HybridOptions) -> Result<Self> {
        ensure!(
            options.disk_mb >= options.mem_mb,
            DiskSmallerThanMemorySnafu {
                mem_mb:  options.mem_mb,
                disk_mb: options.disk_mb,
            }
        );

        // Every item is on disk, head and tail included, so the disk budget
        // alone bounds the queue.
        let capacity = events_for_mb(options.disk_mb).max(1);
        let items_per_segment = items_per_segment(options.mem_mb);

        if options.wipe_on_open {
            remove_store(&options.store_path)?;
        }

        let mut store = SegmentStoreBuilder::new(&options.store_path)
            .items_per_segment(items_per_segment)
            .flush_mode(FlushMode::Async)
            .open()
            .context(OpenStoreSnafu {
                path: &options.store_path,
            })?;
        store.turbo_on().context(OpenStoreSnafu {
            path: &options.store_path,
        })?;

        let label = format!(
            "Hybrid Event Queue (Size = {} MB in-memory, {} MB on-disk)",
            options.mem_mb, options.disk_mb
        );
        info!(
            queue = %label,
            kind = %T::KIND,
            path = ?options.store_path,
            capacity,
            items_per_segment,
            memory_tier_mb = memory_tier_mb(options.mem_mb),
            recovered = store.size(),
            "Constructed hybrid event queue"
        );

        Ok(Self {
            size: AtomicUsize::new(store.size()),
            store: Mutex::new(Some(store)),
            cond: Condvar::new(),
            capacity,
            items_per_segment,
            options,
            label,
            _kind: PhantomData,
        })
    }

    /// Records per segment file; two segments are resident at most.
    #[must_use]
    pub const fn items_per_segment(&self) -> usize { self.items_per_segment }

    /// The memory tier the configured budget snapped to, in MB.
    #[must_use]
    pub const fn memory_tier_mb(&self) -> usize { memory_tier_mb(self.options.mem_mb) }

    #[must_use]
    pub const fn options(&self) -> &HybridOptions { &self.options }

    /// Like [`EventQueue::dequeue`], but a failure to read the item back is
    /// reported instead of being folded into `None`.
    ///
    /// `Ok(None)` means the queue was torn down.
    pub fn dequeue_checked(&self) -> Result<Option<T>> {
        let mut guard = self.store.lock();
        while guard.as_ref().is_some_and(SegmentStore::is_empty) {
            self.cond.wait(&mut guard);
        }
        let Some(store) = guard.as_mut() else {
            return Ok(None);
        };

        let popped = store.pop();
        self.size.store(store.size(), Ordering::Release);
        drop(guard);
        // A failed pop may still have freed room by skipping a segment.
        self.cond.notify_one();

        let record = popped.context(ReadStoreSnafu)?;

        match record {
            Some(record) => decode_record(record).map(Some),
            None => Ok(None),
        }
    }
}

impl<T: Payload> EventQueue<T> for HybridQueue<T> {
    fn enqueue(&self, item: T) {
        let record = match encode_record(&item) {
            Ok(record) => record,
            Err(e) => {
                error!(error = ?e, "Dropping item that could not be encoded");
                return;
            }
        };

        let mut guard = self.store.lock();
        while guard
            .as_ref()
            .is_some_and(|store| store.size() >= self.capacity)
        {
            self.cond.wait(&mut guard);
        }
        let Some(store) = guard.as_mut() else {
            debug!("Discarding item enqueued after teardown");
            return;
        };

        if let Err(e) = store.push(record) {
            error!(error = ?WriteStoreSnafu.into_error(e), "Dropping item that could not be stored");
            return;
        }
        self.size.store(store.size(), Ordering::Release);
        drop(guard);
        self.cond.notify_one();
    }

    fn dequeue(&self) -> Option<T> {
        match self.dequeue_checked() {
            Ok(item) => item,
            Err(e) => {
                warn!(error = ?e, queue = %self.label, "Failed to dequeue item");
                None
            }
        }
    }

    fn size(&self) -> usize { self.size.load(Ordering::Acquire) }

    fn capacity(&self) -> usize { self.capacity }

    fn teardown(&self) -> Result<()> {
        let mut guard = self.store.lock();
        if let Some(mut store) = guard.take() {
            if let Err(e) = store.close() {
                warn!(error = ?e, "Failed to sync segment store before removal");
            }
            self.size.store(0, Ordering::Release);
        }
        drop(guard);
        self.cond.notify_all();

        remove_store(&self.options.store_path)?;
        info!(queue = %self.label, "Tore down hybrid event queue");
        Ok(())
    }
}

impl<T> fmt::Display for HybridQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label) }
}

/// Delete the store directory; a missing directory counts as success.
fn remove_store(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = ?path, "Removed segment store");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(RemoveStoreSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use bytes::Bytes;
    use evcache_common_storage_segment::path::segment_file_path;
    use tempfile::TempDir;

    use super::*;
    use crate::event::Event;

    fn options(temp_dir: &TempDir, mem_mb: usize, disk_mb: usize) -> HybridOptions {
        HybridOptions {
            mem_mb,
            disk_mb,
            store_path: temp_dir.path().join("hybrid_cache"),
            wipe_on_open: true,
        }
    }

    #[test]
    fn test_hybrid_size() {
        let temp_dir = TempDir::new().unwrap();
        let queue = HybridQueue::<Event>::new(options(&temp_dir, 512, 512)).unwrap();

        assert_eq!(queue.capacity(), 524_288);
        // the tier table buckets budgets up to 1 GB to 256 MB
        assert_eq!(queue.memory_tier_mb(), 256);
        assert_eq!(queue.items_per_segment(), 131_072);
        assert_eq!(queue.options().disk_mb, 512);
        assert_eq!(
            queue.to_string(),
            "Hybrid Event Queue (Size = 512 MB in-memory, 512 MB on-disk)"
        );

        queue.teardown().unwrap();
    }

    #[test]
    fn test_disk_smaller_than_memory_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = HybridQueue::<Event>::new(options(&temp_dir, 1024, 512))
            .err()
            .unwrap();
        assert!(err.to_string().contains("should be greater or equal"));
        assert!(!temp_dir.path().join("hybrid_cache").exists());
    }

    #[test]
    fn test_hybrid_enqueue_dequeue() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(HybridQueue::<Event>::new(options(&temp_dir, 1, 1)).unwrap());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..1000 {
                    let event = queue.dequeue().unwrap();
                    assert_eq!(event.timestamp, i);
                }
            })
        };

        for i in 0..1000 {
            queue.enqueue(Event::with_timestamp(i));
        }

        consumer.join().unwrap();
        queue.teardown().unwrap();
    }

    #[test]
    fn test_wipe_on_open_discards_previous_backlog() {
        let temp_dir = TempDir::new().unwrap();
        {
            let queue = HybridQueue::<Bytes>::new(options(&temp_dir, 1, 1)).unwrap();
            queue.enqueue(Bytes::from_static(b"stale"));
            assert_eq!(queue.size(), 1);
        }

        let queue = HybridQueue::<Bytes>::new(options(&temp_dir, 1, 1)).unwrap();
        assert_eq!(queue.size(), 0);
        queue.teardown().unwrap();
    }

    #[test]
    fn test_reopen_without_wipe_keeps_backlog() {
        let temp_dir = TempDir::new().unwrap();
        let opts = HybridOptions {
            wipe_on_open: false,
            ..options(&temp_dir, 1, 1)
        };
        {
            let queue = HybridQueue::<Bytes>::new(opts.clone()).unwrap();
            queue.enqueue(Bytes::from_static(b"kept-1"));
            queue.enqueue(Bytes::from_static(b"kept-2"));
        }

        let queue = HybridQueue::<Bytes>::new(opts).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.dequeue().unwrap().as_ref(), b"kept-1");
        queue.teardown().unwrap();
    }

    #[test]
    fn test_kind_mismatch_yields_none() {
        let temp_dir = TempDir::new().unwrap();
        let opts = HybridOptions {
            wipe_on_open: false,
            ..options(&temp_dir, 1, 1)
        };
        {
            let raw = HybridQueue::<Bytes>::new(opts.clone()).unwrap();
            raw.enqueue(Bytes::from_static(b"not an event"));
        }

        let events = HybridQueue::<Event>::new(opts).unwrap();
        assert!(events.dequeue_checked().is_err());
        assert_eq!(events.size(), 0);
        events.teardown().unwrap();
    }

    #[test]
    fn test_unreadable_records_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let opts = HybridOptions {
            wipe_on_open: false,
            ..options(&temp_dir, 1, 1)
        };
        {
            let mut store = SegmentStoreBuilder::new(&opts.store_path)
                .items_per_segment(1)
                .flush_mode(FlushMode::Sync)
                .open()
                .unwrap();
            store.push(encode_record(&Event::with_timestamp(0)).unwrap()).unwrap();
            store.push(encode_record(&Event::with_timestamp(1)).unwrap()).unwrap();
            store.push(encode_record(&Bytes::from_static(b"raw")).unwrap()).unwrap();
            store.push(encode_record(&Event::with_timestamp(3)).unwrap()).unwrap();
        }
        let corrupted = segment_file_path(&opts.store_path, 2);
        let mut raw = std::fs::read(&corrupted).unwrap();
        raw[5] ^= 0xFF;
        std::fs::write(&corrupted, raw).unwrap();

        // the corrupted segment cannot be counted
        let queue = HybridQueue::<Event>::new(opts).unwrap();
        assert_eq!(queue.size(), 3);

        assert_eq!(queue.dequeue().unwrap().timestamp, 0);
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.dequeue().unwrap().timestamp, 3);
        assert_eq!(queue.size(), 0);

        queue.enqueue(Event::with_timestamp(4));
        assert_eq!(queue.dequeue().unwrap().timestamp, 4);
        queue.teardown().unwrap();
    }

    #[test]
    fn test_teardown_removes_store_and_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let queue = HybridQueue::<Event>::new(options(&temp_dir, 1, 1)).unwrap();
        queue.enqueue(Event::with_timestamp(7));
        assert!(temp_dir.path().join("hybrid_cache").exists());

        queue.teardown().unwrap();
        assert!(!temp_dir.path().join("hybrid_cache").exists());
        queue.teardown().unwrap();

        assert!(queue.dequeue().is_none());
        queue.enqueue(Event::with_timestamp(8));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_teardown_releases_blocked_consumer() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(HybridQueue::<Bytes>::new(options(&temp_dir, 1, 1)).unwrap());

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        queue.teardown().unwrap();
        assert!(consumer.join().unwrap().is_none());
    }
}
