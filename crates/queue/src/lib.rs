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

//! Bounded blocking event queues for a capture/decode pipeline.
//!
//! Two backends implement [`EventQueue`]: [`MemoryQueue`] keeps everything
//! in memory, [`HybridQueue`] keeps everything in a segment store on disk
//! with only the head and tail segments resident. A [`CacheConfig`] binds
//! one of them to a pipeline [`Stage`].

pub mod cache;
pub mod error;
pub mod event;
pub mod hybrid;
pub mod mem;
pub mod metrics;
pub mod options;
pub mod payload;
pub mod queue;
pub mod sizing;

pub use cache::{BoundQueue, CacheConfig, Stage};
pub use error::{CacheError, OptionsError, QueueError, Result};
pub use event::{Argument, Event};
pub use hybrid::{HybridOptions, HybridQueue};
pub use mem::MemoryQueue;
pub use options::{CacheOptions, CacheType, prepare_cache};
pub use payload::{Payload, PayloadKind};
pub use queue::EventQueue;
