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

//! On-disk framing of segment files.
//!
//! A segment file is a sequence of frames:
//!
//! ```text
//! record:    [length: 4B LE][payload: length bytes][crc32(length ++ payload): 4B LE]
//! tombstone: [0xFFFF_FFFF: 4B]
//! ```
//!
//! Every tombstone records the removal of one record from the front of the
//! segment, so reloading a segment replays its pops.

use bytes::Bytes;
use crc32fast::Hasher;
use snafu::ensure;

use crate::{
    Result,
    error::{CorruptedRecordSnafu, RecordTooLargeSnafu},
};

pub(crate) const FRAME_LENGTH_SIZE: usize = 4;

pub(crate) const FRAME_CRC_SIZE: usize = 4;

pub(crate) const TOMBSTONE: u32 = u32::MAX;

pub(crate) const TOMBSTONE_SIZE: usize = FRAME_LENGTH_SIZE;

#[inline]
pub(crate) const fn record_disk_size(payload_len: usize) -> usize {
    FRAME_LENGTH_SIZE + payload_len + FRAME_CRC_SIZE
}

#[inline]
pub(crate) fn record_crc(length: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&length.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// Append the record frame for `data` to `buf`.
pub(crate) fn encode_record(data: &[u8], buf: &mut Vec<u8>) -> Result<()> {
    let length = u32::try_from(data.len())
        .ok()
        .filter(|len| *len != TOMBSTONE)
        .ok_or_else(|| RecordTooLargeSnafu { len: data.len() }.build())?;

    buf.reserve(record_disk_size(data.len()));
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(&record_crc(length, data).to_le_bytes());
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Record(Bytes),
    Tombstone,
}

/// Walks the frames of a fully loaded segment file.
pub(crate) struct FrameDecoder {
    segment: u64,
    buf:     Bytes,
    pos:     usize,
}

impl FrameDecoder {
    pub(crate) const fn new(segment: u64, buf: Bytes) -> Self {
        Self {
            segment,
            buf,
            pos: 0,
        }
    }

    /// Offset just past the last complete frame.
    pub(crate) const fn position(&self) -> usize { self.pos }

    /// Returns `Ok(None)` at the end of the buffer and also when the buffer
    /// ends in a partially written frame; `position()` then points at the
    /// start of that torn frame.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let remaining = self.buf.len() - self.pos;
        if remaining < FRAME_LENGTH_SIZE {
            return Ok(None);
        }

        let mut length_buf = [0u8; FRAME_LENGTH_SIZE];
        length_buf.copy_from_slice(&self.buf[self.pos..self.pos + FRAME_LENGTH_SIZE]);
        let length = u32::from_le_bytes(length_buf);

        if length == TOMBSTONE {
            self.pos += TOMBSTONE_SIZE;
            return Ok(Some(Frame::Tombstone));
        }

        let total = record_disk_size(length as usize);
        if remaining < total {
            return Ok(None);
        }

        let payload_start = self.pos + FRAME_LENGTH_SIZE;
        let crc_start = payload_start + length as usize;
        let payload = self.buf.slice(payload_start..crc_start);

        let mut crc_buf = [0u8; FRAME_CRC_SIZE];
        crc_buf.copy_from_slice(&self.buf[crc_start..crc_start + FRAME_CRC_SIZE]);

        ensure!(
            record_crc(length, &payload) == u32::from_le_bytes(crc_buf),
            CorruptedRecordSnafu {
                segment: self.segment,
                offset:  self.pos as u64,
            }
        );

        self.pos += total;
        Ok(Some(Frame::Record(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(items: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for item in items {
            encode_record(item, &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_record_disk_size() {
        assert_eq!(record_disk_size(0), 8);
        assert_eq!(record_disk_size(10), 18);
        assert_eq!(record_disk_size(1024), 1032);
    }

    #[test]
    fn test_record_crc_covers_length() {
        let data = b"test message";
        let length = data.len() as u32;
        assert_eq!(record_crc(length, data), record_crc(length, data));
        assert_ne!(record_crc(length, data), record_crc(length + 1, data));
    }

    #[test]
    fn test_decode_records_and_tombstones() {
        let mut buf = encoded(&[b"first", b"second"]);
        buf.extend_from_slice(&TOMBSTONE.to_le_bytes());

        let mut decoder = FrameDecoder::new(1, Bytes::from(buf));
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Record(Bytes::from_static(b"first")))
        );
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Record(Bytes::from_static(b"second")))
        );
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Tombstone));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_torn_trailing_frame_is_ignored() {
        let mut buf = encoded(&[b"complete"]);
        let complete_len = buf.len();
        buf.extend_from_slice(&encoded(&[b"torn record"])[..7]);

        let mut decoder = FrameDecoder::new(1, Bytes::from(buf));
        assert!(matches!(decoder.next_frame().unwrap(), Some(Frame::Record(_))));
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.position(), complete_len);
    }

    #[test]
    fn test_crc_mismatch_is_reported() {
        let mut buf = encoded(&[b"payload"]);
        buf[5] ^= 0xFF;

        let mut decoder = FrameDecoder::new(7, Bytes::from(buf));
        let err = decoder.next_frame().unwrap_err();
        assert!(err.to_string().contains("segment 7 at offset 0"));
    }
}
