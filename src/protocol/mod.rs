// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Protocol message types.
//!
//! The wire protocol is a small binary framing over a WebSocket connection.
//! The client consumes exactly two server message kinds and produces exactly
//! one client message kind; anything else on the wire is a decode failure.
//!
//! - [`Handshake`]: first server message of a session, announces the key
//!   separator and the multi-level wildcard token.
//! - [`PState`]: a batch of key/value pairs for an active pattern
//!   subscription, correlated by transaction id.
//! - [`PSubscribe`]: client request to stream all current and future
//!   key/value pairs matching a pattern.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::fmt;

pub type TransactionId = u64;
pub type RequestPattern = String;
pub type Key = String;
pub type Value = String;
pub type KeyValuePairs = Vec<KeyValuePair>;

/// A single flat key with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValuePair {
    pub key: Key,
    pub value: Value,
}

impl From<(&str, &str)> for KeyValuePair {
    fn from((key, value): (&str, &str)) -> Self {
        KeyValuePair {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl From<(String, String)> for KeyValuePair {
    fn from((key, value): (String, String)) -> Self {
        KeyValuePair { key, value }
    }
}

/// A protocol version advertised by the server at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    PSubscribe(PSubscribe),
}

impl ClientMessage {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            ClientMessage::PSubscribe(m) => m.transaction_id,
        }
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    Handshake(Handshake),
    PState(PState),
}

/// Pattern subscription request.
///
/// `unique` asks the server to suppress duplicate notifications for
/// unchanged values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PSubscribe {
    pub transaction_id: TransactionId,
    pub request_pattern: RequestPattern,
    pub unique: bool,
}

/// First server-to-client message of a session, announcing protocol
/// parameters. The separator and the multi-level wildcard are server-owned;
/// the client never configures them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub supported_protocol_versions: Vec<ProtocolVersion>,
    pub separator: char,
    pub wildcard: char,
    pub multi_wildcard: char,
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions = self
            .supported_protocol_versions
            .iter()
            .map(|v| format!("{}.{}", v.major, v.minor))
            .collect::<Vec<String>>()
            .join(", ");
        write!(
            f,
            "handshake: separator '{}', wildcard '{}', multi-wildcard '{}', protocol versions: {}",
            self.separator, self.wildcard, self.multi_wildcard, versions
        )
    }
}

/// A batch of key/value pairs for an active pattern subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PState {
    pub transaction_id: TransactionId,
    pub request_pattern: RequestPattern,
    pub key_value_pairs: KeyValuePairs,
}

impl fmt::Display for PState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kvps: Vec<String> = self
            .key_value_pairs
            .iter()
            .map(|KeyValuePair { key, value }| format!("{key}={value}"))
            .collect();
        write!(f, "{}", kvps.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_pair_from_tuple() {
        let pair: KeyValuePair = ("env/room/temp", "21.5").into();
        assert_eq!(pair.key, "env/room/temp");
        assert_eq!(pair.value, "21.5");
    }

    #[test]
    fn test_handshake_display() {
        let handshake = Handshake {
            supported_protocol_versions: vec![ProtocolVersion { major: 1, minor: 0 }],
            separator: '/',
            wildcard: '?',
            multi_wildcard: '#',
        };
        let rendered = handshake.to_string();
        assert!(rendered.contains("separator '/'"));
        assert!(rendered.contains("multi-wildcard '#'"));
        assert!(rendered.contains("1.0"));
    }
}
