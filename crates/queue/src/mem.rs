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
    collections::VecDeque,
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::{
    Result,
    payload::Payload,
    queue::EventQueue,
    sizing::{capacity_in_events, host_memory_mb},
};

struct MemState<T> {
    items:  VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO held entirely in process memory.
pub struct MemoryQueue<T> {
    state:    Mutex<MemState<T>>,
    /// Parks the producer while full and the consumer while empty.
    cond:     Condvar,
    /// Mirror of `items.len()` for lock-free reads.
    size:     AtomicUsize,
    capacity: usize,
    label:    String,
}

impl<T: Payload> MemoryQueue<T> {
    /// Create a queue sized from a memory budget in MB.
    ///
    /// A zero budget sizes the queue from the host's memory tier.
    #[must_use]
    pub fn new(mem_mb: usize) -> Self {
        let host_mb = if mem_mb == 0 { host_memory_mb() } else { None };
        let capacity = capacity_in_events(mem_mb, 0, host_mb);
        let label = format!("In-Memory Event Queue (Size = {mem_mb} MB)");
        Self::build(capacity, label)
    }

    /// Create a queue holding at most `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let label = format!("In-Memory Event Queue (Capacity = {capacity} events)");
        Self::build(capacity, label)
    }

    fn build(capacity: usize, label: String) -> Self {
        let capacity = capacity.max(1);
        info!(capacity, kind = %T::KIND, "Constructed in-memory event queue");
        Self {
            state: Mutex::new(MemState {
                items:  VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
            size: AtomicUsize::new(0),
            capacity,
            label,
        }
    }
}

impl<T: Payload> EventQueue<T> for MemoryQueue<T> {
    fn enqueue(&self, item: T) {
        let mut state = self.state.lock();
        while !state.closed && state.items.len() >= self.capacity {
            self.cond.wait(&mut state);
        }
        if state.closed {
            debug!("Discarding item enqueued after teardown");
            return;
        }

        state.items.push_back(item);
        self.size.store(state.items.len(), Ordering::Release);
        drop(state);
        self.cond.notify_one();
    }

    fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        while !state.closed && state.items.is_empty() {
            self.cond.wait(&mut state);
        }

        let item = state.items.pop_front()?;
        self.size.store(state.items.len(), Ordering::Release);
        drop(state);
        self.cond.notify_one();
        Some(item)
    }

    fn size(&self) -> usize { self.size.load(Ordering::Acquire) }

    fn capacity(&self) -> usize { self.capacity }

    fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.items = VecDeque::new();
            self.size.store(0, Ordering::Release);
            info!(queue = %self.label, "Tore down in-memory event queue");
        }
        drop(state);
        self.cond.notify_all();
        Ok(())
    }
}

impl<T> fmt::Display for MemoryQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.label) }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use bytes::Bytes;

    use super::*;
    use crate::event::Event;

    #[test]
    fn test_enqueue_dequeue() {
        let queue = Arc::new(MemoryQueue::<Event>::new(1));

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
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_capacity_from_budget() {
        let queue = MemoryQueue::<Bytes>::new(512);
        assert_eq!(queue.capacity(), 524_288);
        assert_eq!(queue.to_string(), "In-Memory Event Queue (Size = 512 MB)");
    }

    #[test]
    fn test_zero_budget_uses_host_tier() {
        let queue = MemoryQueue::<Bytes>::new(0);
        let tiers = [256, 512, 1024, 2048, 4096].map(crate::sizing::events_for_mb);
        assert!(tiers.contains(&queue.capacity()));
    }

    #[test]
    fn test_enqueue_blocks_when_full() {
        let queue = Arc::new(MemoryQueue::<Bytes>::with_capacity(2));
        queue.enqueue(Bytes::from_static(b"a"));
        queue.enqueue(Bytes::from_static(b"b"));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(Bytes::from_static(b"c")))
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished());
        assert_eq!(queue.size(), 2);

        assert_eq!(queue.dequeue().unwrap().as_ref(), b"a");
        producer.join().unwrap();
        assert_eq!(queue.size(), 2);
        assert!(queue.size() <= queue.capacity());
    }

    #[test]
    fn test_teardown_releases_blocked_consumer() {
        let queue = Arc::new(MemoryQueue::<Event>::with_capacity(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        queue.teardown().unwrap();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let queue = MemoryQueue::<Event>::with_capacity(4);
        queue.enqueue(Event::with_timestamp(1));

        queue.teardown().unwrap();
        queue.teardown().unwrap();
        assert_eq!(queue.size(), 0);

        queue.enqueue(Event::with_timestamp(2));
        assert_eq!(queue.size(), 0);
        assert!(queue.dequeue().is_none());
    }
}
