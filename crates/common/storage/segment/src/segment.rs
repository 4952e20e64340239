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
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    Result,
    error::IoSnafu,
    frame::{Frame, FrameDecoder, TOMBSTONE, encode_record},
    path::segment_file_path,
};

/// One resident segment: its file handle plus every record not yet popped.
pub(crate) struct Segment {
    number:   u64,
    path:     PathBuf,
    file:     File,
    items:    VecDeque<Bytes>,
    /// Records ever appended to this segment, popped ones included.
    appended: usize,
    scratch:  Vec<u8>,
}

impl Segment {
    /// Create an empty segment file, truncating any file of the same number.
    pub(crate) fn create(base: &Path, number: u64) -> Result<Self> {
        let path = segment_file_path(base, number);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .context(IoSnafu { path: &path })?;

        debug!(path = ?path, number, "Created segment");

        Ok(Self {
            number,
            path,
            file,
            items: VecDeque::new(),
            appended: 0,
            scratch: Vec::new(),
        })
    }

    /// Load an existing segment, replaying its tombstones.
    ///
    /// A torn frame at the end of the file is cut off so later appends stay
    /// aligned.
    pub(crate) fn load(base: &Path, number: u64) -> Result<Self> {
        let path = segment_file_path(base, number);
        let raw = std::fs::read(&path).context(IoSnafu { path: &path })?;
        let raw_len = raw.len();

        let mut decoder = FrameDecoder::new(number, Bytes::from(raw));
        let mut items = VecDeque::new();
        let mut appended = 0;
        let mut removed = 0;
        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Record(payload) => {
                    items.push_back(payload);
                    appended += 1;
                }
                Frame::Tombstone => removed += 1,
            }
        }
        items.drain(..removed.min(items.len()));

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .context(IoSnafu { path: &path })?;

        let valid_len = decoder.position();
        if valid_len < raw_len {
            warn!(
                path = ?path,
                valid_len,
                file_len = raw_len,
                "Truncating torn frame at end of segment"
            );
            file.set_len(valid_len as u64)
                .context(IoSnafu { path: &path })?;
        }

        debug!(path = ?path, number, appended, removed, "Loaded segment");

        Ok(Self {
            number,
            path,
            file,
            items,
            appended,
            scratch: Vec::new(),
        })
    }

    /// Records not yet popped from a segment file, counted without keeping
    /// them in memory.
    pub(crate) fn count_unread(base: &Path, number: u64) -> Result<usize> {
        let path = segment_file_path(base, number);
        let raw = std::fs::read(&path).context(IoSnafu { path: &path })?;

        let mut decoder = FrameDecoder::new(number, Bytes::from(raw));
        let (mut records, mut tombstones) = (0usize, 0usize);
        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Record(_) => records += 1,
                Frame::Tombstone => tombstones += 1,
            }
        }
        Ok(records.saturating_sub(tombstones))
    }

    pub(crate) const fn number(&self) -> u64 { self.number }

    /// Records still readable from this segment.
    pub(crate) fn len(&self) -> usize { self.items.len() }

    pub(crate) fn front(&self) -> Option<&Bytes> { self.items.front() }

    pub(crate) const fn is_full(&self, capacity: usize) -> bool { self.appended >= capacity }

    /// Append a record and return the bytes written.
    pub(crate) fn append(&mut self, data: Bytes) -> Result<usize> {
        self.scratch.clear();
        encode_record(&data, &mut self.scratch)?;
        self.file
            .write_all(&self.scratch)
            .context(IoSnafu { path: &self.path })?;

        self.items.push_back(data);
        self.appended += 1;
        Ok(self.scratch.len())
    }

    /// Pop the oldest record and persist a tombstone for it.
    pub(crate) fn remove_front(&mut self) -> Result<Option<Bytes>> {
        if self.items.is_empty() {
            return Ok(None);
        }

        self.file
            .write_all(&TOMBSTONE.to_le_bytes())
            .context(IoSnafu { path: &self.path })?;
        Ok(self.items.pop_front())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .context(IoSnafu { path: &self.path })
    }

    pub(crate) fn delete(self) -> Result<()> {
        let Self { path, file, .. } = self;
        drop(file);
        std::fs::remove_file(&path).context(IoSnafu { path: &path })?;
        debug!(path = ?path, "Deleted consumed segment");
        Ok(())
    }
}
