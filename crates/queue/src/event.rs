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

use serde::{Deserialize, Serialize};

/// A decoded event record, as produced by the pipeline's decode stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Capture time in nanoseconds. Also serves as the ordering marker.
    pub timestamp:    u64,
    pub process_id:   u32,
    pub thread_id:    u32,
    pub process_name: String,
    pub event_id:     u32,
    pub event_name:   String,
    pub return_value: i64,
    pub args:         Vec<Argument>,
}

/// A named, already formatted event argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name:  String,
    pub value: String,
}

impl Event {
    #[must_use]
    pub fn with_timestamp(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name:  name.into(),
            value: value.into(),
        }
    }
}
