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

use std::path::PathBuf;

use crate::{FlushMode, Result, SegmentStore, SegmentStoreConfig};

pub struct SegmentStoreBuilder {
    config: SegmentStoreConfig,
}

impl SegmentStoreBuilder {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            config: SegmentStoreConfig {
                base_path: base_path.into(),
                ..Default::default()
            },
        }
    }

    /// Zero is clamped to one record per segment.
    pub fn items_per_segment(mut self, items: usize) -> Self {
        self.config.items_per_segment = items.max(1);
        self
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    /// Open the store at the configured path, creating it when absent.
    pub fn open(self) -> Result<SegmentStore> { SegmentStore::open(self.config) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default_config() {
        let builder = SegmentStoreBuilder::new("/tmp/test_store");
        assert_eq!(builder.config.base_path, PathBuf::from("/tmp/test_store"));
        assert_eq!(builder.config.items_per_segment, 4096);
        assert_eq!(builder.config.flush_mode, FlushMode::Sync);
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = SegmentStoreBuilder::new("/tmp/test_store")
            .items_per_segment(131_072)
            .flush_mode(FlushMode::Async);

        assert_eq!(builder.config.items_per_segment, 131_072);
        assert_eq!(builder.config.flush_mode, FlushMode::Async);
    }

    #[test]
    fn test_builder_clamps_zero_items() {
        let builder = SegmentStoreBuilder::new("/tmp/test_store").items_per_segment(0);
        assert_eq!(builder.config.items_per_segment, 1);
    }
}
