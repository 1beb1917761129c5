// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const VERSION_1: u8 = b'1';
pub const VERSION_2: u8 = b'2';

pub const CODE_WINDOW: u8 = b'W';
pub const CODE_DATA: u8 = b'D';
pub const CODE_JSON: u8 = b'J';
pub const CODE_COMPRESSED: u8 = b'C';
pub const CODE_ACK: u8 = b'A';

/// Upper bound for any length field read off the wire. Anything larger is
/// treated as a corrupt stream rather than an allocation request.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Wire protocol version, negotiated at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[default]
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
}

impl ProtocolVersion {
    pub fn wire_byte(self) -> u8 {
        match self {
            ProtocolVersion::V1 => VERSION_1,
            ProtocolVersion::V2 => VERSION_2,
        }
    }
}

/// A decoded Lumberjack frame. Compressed containers are transparent to
/// callers: the decoder inflates them and yields the inner frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Window { size: u32 },
    Data { seq: u32, pairs: Vec<(String, String)> },
    Json { seq: u32, payload: Vec<u8> },
    Ack { seq: u32 },
}

impl Frame {
    /// The data-frame sequence, if this is a data frame.
    pub fn seq(&self) -> Option<u32> {
        match self {
            Frame::Data { seq, .. } | Frame::Json { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown frame code {0:#04x}")]
    UnknownFrame(u8),

    #[error("unsupported protocol version {0:#04x}")]
    UnknownVersion(u8),

    #[error("truncated frame")]
    Truncated,

    #[error("frame length {0} exceeds limit")]
    Oversize(usize),

    #[error("invalid UTF-8 in data frame: {0}")]
    InvalidUtf8(String),

    #[error("compression error: {0}")]
    Compression(String),
}

/// Next data-frame sequence. Sequences are 1-based and wrap 2³² → 1,
/// never 0.
pub fn next_seq(seq: u32) -> u32 {
    if seq == u32::MAX {
        1
    } else {
        seq + 1
    }
}
