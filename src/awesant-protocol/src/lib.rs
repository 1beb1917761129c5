// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Lumberjack wire protocol: frame encoding/decoding, batch compression
//! and send-window bookkeeping.
//!
//! Frames are `<version byte><code byte><payload>` with big-endian
//! integers. Version `'1'` carries key/value data frames (`D`), version
//! `'2'` carries JSON data frames (`J`); window (`W`), ack (`A`) and
//! compressed-container (`C`) frames are shared.

pub mod codec;
pub mod frame;
pub mod window;

pub use codec::{decode_fixed, BatchEncoder, Compression, FrameDecoder};
pub use frame::{next_seq, CodecError, Frame, ProtocolVersion};
pub use window::{seq_distance, SendWindow};
