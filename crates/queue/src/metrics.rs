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

use std::sync::LazyLock;

use prometheus::{GaugeVec, IntGaugeVec, register_gauge_vec, register_int_gauge_vec};

use crate::cache::CacheConfig;

pub const STAGE_LABEL: &str = "stage";

pub static QUEUE_SIZE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "evcache_queue_size",
        "Number of items currently held by the cache",
        &[STAGE_LABEL]
    )
    .unwrap()
});

pub static QUEUE_CAPACITY: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "evcache_queue_capacity",
        "Maximum number of items the cache can hold",
        &[STAGE_LABEL]
    )
    .unwrap()
});

pub static QUEUE_LOAD: LazyLock<GaugeVec> = LazyLock::new(|| {
    register_gauge_vec!(
        "evcache_queue_load",
        "Fraction of the cache capacity in use",
        &[STAGE_LABEL]
    )
    .unwrap()
});

/// Refresh the gauges for `cache` from its current size and capacity.
#[allow(clippy::cast_precision_loss)]
pub fn observe(cache: &CacheConfig) {
    let stage: &'static str = cache.stage().into();
    let size = cache.size();
    let capacity = cache.capacity();

    QUEUE_SIZE
        .with_label_values(&[stage])
        .set(i64::try_from(size).unwrap_or(i64::MAX));
    QUEUE_CAPACITY
        .with_label_values(&[stage])
        .set(i64::try_from(capacity).unwrap_or(i64::MAX));
    QUEUE_LOAD
        .with_label_values(&[stage])
        .set(size as f64 / capacity.max(1) as f64);
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::mem::MemoryQueue;

    #[test]
    fn test_observe() {
        let cache = CacheConfig::before_decode(Box::new(MemoryQueue::<Bytes>::with_capacity(4)));
        cache.enqueue_raw(Bytes::from_static(b"a")).unwrap();

        observe(&cache);

        assert_eq!(QUEUE_SIZE.with_label_values(&["before-decode"]).get(), 1);
        assert_eq!(QUEUE_CAPACITY.with_label_values(&["before-decode"]).get(), 4);
        let load = QUEUE_LOAD.with_label_values(&["before-decode"]).get();
        assert!((load - 0.25).abs() < f64::EPSILON);
    }
}
