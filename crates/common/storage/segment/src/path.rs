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

use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::{Result, error::IoSnafu};

pub const SEGMENT_EXTENSION: &str = "seg";

/// Suffix given to segment files that could not be read back.
pub const QUARANTINE_SUFFIX: &str = "corrupt";

pub fn segment_file_name(number: u64) -> String { format!("{number:020}.{SEGMENT_EXTENSION}") }

pub fn segment_file_path<P: AsRef<Path>>(base: P, number: u64) -> PathBuf {
    base.as_ref().join(segment_file_name(number))
}

/// Where an unreadable segment is moved so scans no longer pick it up.
pub fn quarantine_file_path<P: AsRef<Path>>(base: P, number: u64) -> PathBuf {
    base.as_ref()
        .join(format!("{}.{QUARANTINE_SUFFIX}", segment_file_name(number)))
}

/// Parse the segment number out of a file name such as
/// `00000000000000000042.seg`.
pub fn parse_segment_number(path: &Path) -> Option<u64> {
    if path.extension().and_then(|s| s.to_str()) != Some(SEGMENT_EXTENSION) {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Sorted numbers of every segment file directly under `base`.
///
/// A missing directory yields an empty list.
pub fn scan_segment_numbers<P: AsRef<Path>>(base: P) -> Result<Vec<u64>> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut numbers = Vec::new();
    for entry in std::fs::read_dir(base).context(IoSnafu { path: base })? {
        let path = entry.context(IoSnafu { path: base })?.path();
        if path.is_file()
            && let Some(number) = parse_segment_number(&path)
        {
            numbers.push(number);
        }
    }

    numbers.sort_unstable();
    Ok(numbers)
}
