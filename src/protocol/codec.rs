// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binary frame codec.
//!
//! Every WebSocket binary frame carries exactly one message. The first byte
//! is the message type; all integers are big-endian; all strings are UTF-8
//! with their lengths declared up front.
//!
//! Frame layouts:
//!
//! ```text
//! PSUB  [0x04][transaction id: u64][pattern len: u16][pattern][unique: u8]
//! HSHK  [0x84][num versions: u8][(major: u16, minor: u16) * n]
//!       [separator: u8][wildcard: u8][multi wildcard: u8]
//! PSTA  [0x80][transaction id: u64][pattern len: u16][num pairs: u32]
//!       [(key len: u16, value len: u32) * n][pattern][(key, value) * n]
//! ```
//!
//! Decoding never panics: malformed input yields a [`DecodeError`] so the
//! session can drop the frame and stay open.

use thiserror::Error;

use super::{
    ClientMessage, Handshake, KeyValuePair, PState, ProtocolVersion, PSubscribe, ServerMessage,
};

pub type MessageType = u8;

pub const PSUB: MessageType = 0b00000100;
pub const PSTA: MessageType = 0b10000000;
pub const HSHK: MessageType = 0b10000100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("request pattern is too long: {0} bytes")]
    RequestPatternTooLong(usize),
    #[error("key is too long: {0} bytes")]
    KeyTooLong(usize),
    #[error("value is too long: {0} bytes")]
    ValueTooLong(usize),
    #[error("too many key/value pairs: {0}")]
    TooManyKeyValuePairs(usize),
    #[error("too many protocol versions: {0}")]
    TooManyProtocolVersions(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("undefined message type: {0:#04x}")]
    UndefinedType(MessageType),
    #[error("frame truncated: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("invalid UTF-8 in frame at offset {0}")]
    Utf8(usize),
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("empty frame")]
    EmptyFrame,
}

pub type EncodeResult<T> = Result<T, EncodeError>;
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Encode a client-to-server message into one binary frame.
pub fn encode_client_message(msg: &ClientMessage) -> EncodeResult<Vec<u8>> {
    match msg {
        ClientMessage::PSubscribe(msg) => encode_psubscribe_message(msg),
    }
}

pub fn encode_psubscribe_message(msg: &PSubscribe) -> EncodeResult<Vec<u8>> {
    let pattern_length = request_pattern_length(&msg.request_pattern)?;

    let mut buf = vec![PSUB];
    buf.extend(msg.transaction_id.to_be_bytes());
    buf.extend(pattern_length.to_be_bytes());
    buf.extend(msg.request_pattern.as_bytes());
    buf.push(u8::from(msg.unique));

    Ok(buf)
}

/// Encode a server-to-client message into one binary frame.
///
/// The client never sends these; they exist for mock servers and tests.
pub fn encode_server_message(msg: &ServerMessage) -> EncodeResult<Vec<u8>> {
    match msg {
        ServerMessage::Handshake(msg) => encode_handshake_message(msg),
        ServerMessage::PState(msg) => encode_pstate_message(msg),
    }
}

pub fn encode_handshake_message(msg: &Handshake) -> EncodeResult<Vec<u8>> {
    let num_versions = num_protocol_versions(&msg.supported_protocol_versions)?;

    let mut buf = vec![HSHK];
    buf.push(num_versions);
    for ProtocolVersion { major, minor } in &msg.supported_protocol_versions {
        buf.extend(major.to_be_bytes());
        buf.extend(minor.to_be_bytes());
    }
    buf.push(msg.separator as u8);
    buf.push(msg.wildcard as u8);
    buf.push(msg.multi_wildcard as u8);

    Ok(buf)
}

pub fn encode_pstate_message(msg: &PState) -> EncodeResult<Vec<u8>> {
    let pattern_length = request_pattern_length(&msg.request_pattern)?;
    let num_pairs = num_key_value_pairs(&msg.key_value_pairs)?;

    let mut buf = vec![PSTA];
    buf.extend(msg.transaction_id.to_be_bytes());
    buf.extend(pattern_length.to_be_bytes());
    buf.extend(num_pairs.to_be_bytes());

    for KeyValuePair { key, value } in &msg.key_value_pairs {
        buf.extend(key_length(key)?.to_be_bytes());
        buf.extend(value_length(value)?.to_be_bytes());
    }

    buf.extend(msg.request_pattern.as_bytes());

    for KeyValuePair { key, value } in &msg.key_value_pairs {
        buf.extend(key.as_bytes());
        buf.extend(value.as_bytes());
    }

    Ok(buf)
}

/// Decode one server-to-client frame.
pub fn decode_server_message(frame: &[u8]) -> DecodeResult<ServerMessage> {
    let mut reader = Reader::new(frame);
    let msg = match reader.u8().map_err(|_| DecodeError::EmptyFrame)? {
        HSHK => ServerMessage::Handshake(decode_handshake(&mut reader)?),
        PSTA => ServerMessage::PState(decode_pstate(&mut reader)?),
        other => return Err(DecodeError::UndefinedType(other)),
    };
    reader.finish()?;
    Ok(msg)
}

/// Decode one client-to-server frame.
///
/// The counterpart of [`encode_server_message`]: only mock servers and
/// tests need it.
pub fn decode_client_message(frame: &[u8]) -> DecodeResult<ClientMessage> {
    let mut reader = Reader::new(frame);
    let msg = match reader.u8().map_err(|_| DecodeError::EmptyFrame)? {
        PSUB => ClientMessage::PSubscribe(decode_psubscribe(&mut reader)?),
        other => return Err(DecodeError::UndefinedType(other)),
    };
    reader.finish()?;
    Ok(msg)
}

fn decode_handshake(reader: &mut Reader<'_>) -> DecodeResult<Handshake> {
    let num_versions = reader.u8()?;
    let mut supported_protocol_versions = Vec::with_capacity(num_versions as usize);
    for _ in 0..num_versions {
        let major = reader.u16()?;
        let minor = reader.u16()?;
        supported_protocol_versions.push(ProtocolVersion { major, minor });
    }
    let separator = char::from(reader.u8()?);
    let wildcard = char::from(reader.u8()?);
    let multi_wildcard = char::from(reader.u8()?);
    Ok(Handshake {
        supported_protocol_versions,
        separator,
        wildcard,
        multi_wildcard,
    })
}

fn decode_pstate(reader: &mut Reader<'_>) -> DecodeResult<PState> {
    let transaction_id = reader.u64()?;
    let pattern_length = reader.u16()?;
    let num_pairs = reader.u32()?;

    // Cap the preallocation: num_pairs is wire-controlled and a lying
    // header must fail on a short read, not on an allocation.
    let mut lengths = Vec::with_capacity((num_pairs as usize).min(1024));
    for _ in 0..num_pairs {
        let key_length = reader.u16()?;
        let value_length = reader.u32()?;
        lengths.push((key_length, value_length));
    }

    let request_pattern = reader.string(pattern_length as usize)?;

    let mut key_value_pairs = Vec::with_capacity(lengths.len());
    for (key_length, value_length) in lengths {
        let key = reader.string(key_length as usize)?;
        let value = reader.string(value_length as usize)?;
        key_value_pairs.push(KeyValuePair { key, value });
    }

    Ok(PState {
        transaction_id,
        request_pattern,
        key_value_pairs,
    })
}

fn decode_psubscribe(reader: &mut Reader<'_>) -> DecodeResult<PSubscribe> {
    let transaction_id = reader.u64()?;
    let pattern_length = reader.u16()?;
    let request_pattern = reader.string(pattern_length as usize)?;
    let unique = reader.u8()? != 0;
    Ok(PSubscribe {
        transaction_id,
        request_pattern,
        unique,
    })
}

fn request_pattern_length(pattern: &str) -> EncodeResult<u16> {
    let length = pattern.len();
    u16::try_from(length).map_err(|_| EncodeError::RequestPatternTooLong(length))
}

fn key_length(key: &str) -> EncodeResult<u16> {
    let length = key.len();
    u16::try_from(length).map_err(|_| EncodeError::KeyTooLong(length))
}

fn value_length(value: &str) -> EncodeResult<u32> {
    let length = value.len();
    u32::try_from(length).map_err(|_| EncodeError::ValueTooLong(length))
}

fn num_key_value_pairs(pairs: &[KeyValuePair]) -> EncodeResult<u32> {
    let length = pairs.len();
    u32::try_from(length).map_err(|_| EncodeError::TooManyKeyValuePairs(length))
}

fn num_protocol_versions(versions: &[ProtocolVersion]) -> EncodeResult<u8> {
    let length = versions.len();
    u8::try_from(length).map_err(|_| EncodeError::TooManyProtocolVersions(length))
}

/// Bounds-checked cursor over one frame.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated {
            offset: self.pos,
            needed: len,
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: end - self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> DecodeResult<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    fn string(&mut self, len: usize) -> DecodeResult<String> {
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Utf8(offset))
    }

    fn finish(&self) -> DecodeResult<()> {
        let remaining = self.buf.len() - self.pos;
        if remaining > 0 {
            return Err(DecodeError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
