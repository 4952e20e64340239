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

//! The two payload kinds a queue can carry.
//!
//! Stored records start with a one-byte kind tag followed by the body, so a
//! record read back as the wrong kind is detected instead of misdecoded.

use bytes::Bytes;
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{DecodeEventSnafu, EncodeEventSnafu, KindMismatchSnafu},
    event::Event,
};

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::event::Event {}
    impl Sealed for bytes::Bytes {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum PayloadKind {
    /// Decoded event record.
    Event = 1,
    /// Raw wire bytes, before decoding.
    Raw = 2,
}

/// Payload carried by a queue: either [`Event`] or raw [`Bytes`].
///
/// Sealed; no other kind can be queued.
pub trait Payload: sealed::Sealed + Send + Sized + 'static {
    const KIND: PayloadKind;

    /// Append the serialized body to `buf`.
    fn write_body(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Build a payload from a body written by [`Payload::write_body`].
    fn read_body(body: Bytes) -> Result<Self>;
}

impl Payload for Event {
    const KIND: PayloadKind = PayloadKind::Event;

    fn write_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        bincode::serde::encode_into_std_write(self, buf, bincode::config::standard())
            .context(EncodeEventSnafu)?;
        Ok(())
    }

    fn read_body(body: Bytes) -> Result<Self> {
        let (event, _) = bincode::serde::decode_from_slice(&body, bincode::config::standard())
            .context(DecodeEventSnafu)?;
        Ok(event)
    }
}

impl Payload for Bytes {
    const KIND: PayloadKind = PayloadKind::Raw;

    fn write_body(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self);
        Ok(())
    }

    fn read_body(body: Bytes) -> Result<Self> { Ok(body) }
}

/// Serialize `item` into a tagged record.
pub(crate) fn encode_record<T: Payload>(item: &T) -> Result<Bytes> {
    let mut buf = vec![T::KIND as u8];
    item.write_body(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Decode a tagged record, rejecting records of another kind.
pub(crate) fn decode_record<T: Payload>(record: Bytes) -> Result<T> {
    let found = record.first().copied();
    ensure!(
        found == Some(T::KIND as u8),
        KindMismatchSnafu {
            expected: T::KIND,
            found,
        }
    );
    T::read_body(record.slice(1..))
}
