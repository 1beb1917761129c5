// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frame encoding and decoding.
//!
//! The encoder produces one `W` frame per batch followed by either a single
//! `C` container (whose inflated body is the concatenation of the batch's
//! data frames) or the raw data frames when compression is off. The decoder
//! consumes either a growable socket buffer (incremental, returns `None`
//! until a full frame is buffered) or a fixed inflated buffer (truncation
//! is an error). `C` inside `C` is tolerated up to a small nesting depth.

use std::collections::VecDeque;
use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};

use awesant_core::Event;

use crate::frame::{
    next_seq, CodecError, Frame, ProtocolVersion, CODE_ACK, CODE_COMPRESSED, CODE_DATA,
    CODE_JSON, CODE_WINDOW, MAX_PAYLOAD_LEN, VERSION_1, VERSION_2,
};

/// Nested `C` containers deeper than this are treated as corrupt.
const MAX_CONTAINER_DEPTH: u8 = 3;

/// DEFLATE wrapper used for `C` frames.
///
/// The default is the zlib wrapper; `raw` exists for peers that expect a
/// bare deflate stream. `none` disables the container entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Zlib,
    Raw,
    None,
}

fn deflate(data: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    let result = match compression {
        Compression::Zlib => {
            let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(data)
                .and_then(|_| enc.finish())
        }
        Compression::Raw => {
            let mut enc = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(data)
                .and_then(|_| enc.finish())
        }
        Compression::None => return Ok(data.to_vec()),
    };
    result.map_err(|e| CodecError::Compression(e.to_string()))
}

fn inflate(data: &[u8], compression: Compression) -> Result<Vec<u8>, CodecError> {
    fn zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
    fn raw(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        DeflateDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }

    let result = match compression {
        Compression::Zlib => zlib(data),
        Compression::Raw => raw(data),
        // A peer that compresses despite our `none` setting still gets a
        // best-effort parse: zlib first, then bare deflate.
        Compression::None => zlib(data).or_else(|_| raw(data)),
    };
    result.map_err(|e| CodecError::Compression(e.to_string()))
}

pub fn encode_window(version: ProtocolVersion, size: u32, buf: &mut BytesMut) {
    buf.put_u8(version.wire_byte());
    buf.put_u8(CODE_WINDOW);
    buf.put_u32(size);
}

pub fn encode_ack(version: ProtocolVersion, seq: u32, buf: &mut BytesMut) {
    buf.put_u8(version.wire_byte());
    buf.put_u8(CODE_ACK);
    buf.put_u32(seq);
}

/// Version-1 key/value data frame.
pub fn encode_data(seq: u32, pairs: &[(String, String)], buf: &mut BytesMut) {
    buf.put_u8(VERSION_1);
    buf.put_u8(CODE_DATA);
    buf.put_u32(seq);
    buf.put_u32(pairs.len() as u32);
    for (k, v) in pairs {
        buf.put_u32(k.len() as u32);
        buf.put_slice(k.as_bytes());
        buf.put_u32(v.len() as u32);
        buf.put_slice(v.as_bytes());
    }
}

/// Version-2 JSON data frame: `2J | seq | plen | payload`.
pub fn encode_json(seq: u32, payload: &[u8], buf: &mut BytesMut) {
    buf.put_u8(VERSION_2);
    buf.put_u8(CODE_JSON);
    buf.put_u32(seq);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
}

/// Batch encoder for the Lumberjack client side.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEncoder {
    pub version: ProtocolVersion,
    pub compression: Compression,
}

impl BatchEncoder {
    pub fn new(version: ProtocolVersion, compression: Compression) -> Self {
        Self {
            version,
            compression,
        }
    }

    fn encode_event_frame(&self, event: &Event, seq: u32, buf: &mut BytesMut) {
        match self.version {
            ProtocolVersion::V1 => encode_data(seq, &event.to_pairs(), buf),
            ProtocolVersion::V2 => encode_json(seq, event.to_json().as_bytes(), buf),
        }
    }

    /// Encode a single event as one data frame (no window announcement).
    pub fn encode_event(&self, event: &Event, seq: u32) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_event_frame(event, seq, &mut buf);
        buf.freeze()
    }

    /// Encode a single pre-serialized JSON line as one data frame.
    pub fn encode_json_line(&self, line: &str, seq: u32) -> Bytes {
        let mut buf = BytesMut::new();
        match self.version {
            ProtocolVersion::V1 => {
                encode_data(seq, &[("line".to_string(), line.to_string())], &mut buf)
            }
            ProtocolVersion::V2 => encode_json(seq, line.as_bytes(), &mut buf),
        }
        buf.freeze()
    }

    /// Encode a batch: one `W` frame announcing the batch length, then the
    /// data frames (inside a `C` container unless compression is off).
    ///
    /// `first_seq` is the sequence assigned to the first event; the
    /// remaining events take consecutive sequences. Returns the wire bytes
    /// and the last assigned sequence.
    pub fn encode_batch(
        &self,
        events: &[Event],
        first_seq: u32,
    ) -> Result<(Bytes, u32), CodecError> {
        let mut data = BytesMut::new();
        let mut seq = first_seq;
        let mut last = first_seq;
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                seq = next_seq(seq);
            }
            last = seq;
            self.encode_event_frame(event, seq, &mut data);
        }

        let mut out = BytesMut::new();
        encode_window(self.version, events.len() as u32, &mut out);
        match self.compression {
            Compression::None => out.extend_from_slice(&data),
            wrapper => {
                let packed = deflate(&data, wrapper)?;
                out.put_u8(self.version.wire_byte());
                out.put_u8(CODE_COMPRESSED);
                out.put_u32(packed.len() as u32);
                out.extend_from_slice(&packed);
            }
        }
        Ok((out.freeze(), last))
    }
}

enum Parsed {
    One(Frame),
    Many(Vec<Frame>),
}

fn read_u32(src: &[u8], at: usize) -> Option<u32> {
    let bytes = src.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn checked_len(len: u32) -> Result<usize, CodecError> {
    let len = len as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::Oversize(len));
    }
    Ok(len)
}

/// Parse one frame from the head of `src`.
///
/// `Ok(None)` means the buffer does not yet hold a complete frame;
/// `Ok(Some((consumed, parsed)))` reports how many bytes the frame took.
fn parse_frame(
    src: &[u8],
    compression: Compression,
    depth: u8,
) -> Result<Option<(usize, Parsed)>, CodecError> {
    if src.len() < 2 {
        return Ok(None);
    }
    let version = src[0];
    if version != VERSION_1 && version != VERSION_2 {
        return Err(CodecError::UnknownVersion(version));
    }

    match src[1] {
        CODE_WINDOW => {
            let Some(size) = read_u32(src, 2) else {
                return Ok(None);
            };
            Ok(Some((6, Parsed::One(Frame::Window { size }))))
        }
        CODE_ACK => {
            let Some(seq) = read_u32(src, 2) else {
                return Ok(None);
            };
            Ok(Some((6, Parsed::One(Frame::Ack { seq }))))
        }
        CODE_DATA => parse_data_frame(src),
        CODE_JSON => {
            let (Some(seq), Some(plen)) = (read_u32(src, 2), read_u32(src, 6)) else {
                return Ok(None);
            };
            let plen = checked_len(plen)?;
            let end = 10 + plen;
            let Some(payload) = src.get(10..end) else {
                return Ok(None);
            };
            Ok(Some((
                end,
                Parsed::One(Frame::Json {
                    seq,
                    payload: payload.to_vec(),
                }),
            )))
        }
        CODE_COMPRESSED => {
            if depth >= MAX_CONTAINER_DEPTH {
                return Err(CodecError::Compression(
                    "container nesting too deep".to_string(),
                ));
            }
            let Some(clen) = read_u32(src, 2) else {
                return Ok(None);
            };
            let clen = checked_len(clen)?;
            let end = 6 + clen;
            let Some(packed) = src.get(6..end) else {
                return Ok(None);
            };
            let inflated = inflate(packed, compression)?;
            let frames = decode_all(&inflated, compression, depth + 1)?;
            Ok(Some((end, Parsed::Many(frames))))
        }
        other => Err(CodecError::UnknownFrame(other)),
    }
}

fn parse_data_frame(src: &[u8]) -> Result<Option<(usize, Parsed)>, CodecError> {
    let (Some(seq), Some(count)) = (read_u32(src, 2), read_u32(src, 6)) else {
        return Ok(None);
    };
    if count as usize > MAX_PAYLOAD_LEN {
        return Err(CodecError::Oversize(count as usize));
    }

    let mut at = 10;
    let mut pairs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some(klen) = read_u32(src, at) else {
            return Ok(None);
        };
        let klen = checked_len(klen)?;
        let Some(key) = src.get(at + 4..at + 4 + klen) else {
            return Ok(None);
        };
        at += 4 + klen;

        let Some(vlen) = read_u32(src, at) else {
            return Ok(None);
        };
        let vlen = checked_len(vlen)?;
        let Some(value) = src.get(at + 4..at + 4 + vlen) else {
            return Ok(None);
        };
        at += 4 + vlen;

        let key = std::str::from_utf8(key)
            .map_err(|e| CodecError::InvalidUtf8(e.to_string()))?
            .to_string();
        let value = std::str::from_utf8(value)
            .map_err(|e| CodecError::InvalidUtf8(e.to_string()))?
            .to_string();
        pairs.push((key, value));
    }
    Ok(Some((at, Parsed::One(Frame::Data { seq, pairs }))))
}

fn decode_all(data: &[u8], compression: Compression, depth: u8) -> Result<Vec<Frame>, CodecError> {
    let mut frames = Vec::new();
    let mut at = 0;
    while at < data.len() {
        match parse_frame(&data[at..], compression, depth)? {
            Some((consumed, Parsed::One(frame))) => {
                frames.push(frame);
                at += consumed;
            }
            Some((consumed, Parsed::Many(inner))) => {
                frames.extend(inner);
                at += consumed;
            }
            // Fixed buffers must contain whole frames.
            None => return Err(CodecError::Truncated),
        }
    }
    Ok(frames)
}

/// Decode a fixed buffer (e.g. an inflated `C` payload) into frames.
/// A partial trailing frame is an error here.
pub fn decode_fixed(data: &[u8], compression: Compression) -> Result<Vec<Frame>, CodecError> {
    decode_all(data, compression, 0)
}

/// Incremental decoder over a growable socket buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    pending: VecDeque<Frame>,
    compression: Compression,
}

impl FrameDecoder {
    pub fn new(compression: Compression) -> Self {
        Self {
            buf: BytesMut::new(),
            pending: VecDeque::new(),
            compression,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet parsed into a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next decoded frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        match parse_frame(&self.buf, self.compression, 0)? {
            Some((consumed, parsed)) => {
                self.buf.advance(consumed);
                match parsed {
                    Parsed::One(frame) => Ok(Some(frame)),
                    Parsed::Many(frames) => {
                        self.pending.extend(frames);
                        Ok(self.pending.pop_front())
                    }
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(line: &str) -> Event {
        Event::plain(
            "2026-03-01T00:00:00.000Z",
            "host1",
            "/var/log/x",
            "app",
            &[],
            line,
        )
    }

    #[test]
    fn window_frame_wire_layout() {
        let mut buf = BytesMut::new();
        encode_window(ProtocolVersion::V1, 3, &mut buf);
        assert_eq!(&buf[..], b"1W\x00\x00\x00\x03");
    }

    #[test]
    fn ack_frame_wire_layout() {
        let mut buf = BytesMut::new();
        encode_ack(ProtocolVersion::V1, 3, &mut buf);
        assert_eq!(&buf[..], b"1A\x00\x00\x00\x03");
    }

    #[test]
    fn data_frame_round_trip() {
        let mut buf = BytesMut::new();
        encode_data(
            7,
            &[("line".to_string(), "hello".to_string())],
            &mut buf,
        );
        let frames = decode_fixed(&buf, Compression::None).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Data {
                seq: 7,
                pairs: vec![("line".to_string(), "hello".to_string())]
            }]
        );
    }

    #[test]
    fn json_frame_round_trip() {
        let mut buf = BytesMut::new();
        encode_json(9, br#"{"line":"x"}"#, &mut buf);
        let frames = decode_fixed(&buf, Compression::None).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Json {
                seq: 9,
                payload: br#"{"line":"x"}"#.to_vec()
            }]
        );
    }

    #[test]
    fn batch_encode_decode_preserves_events_and_sequences() {
        for compression in [Compression::Zlib, Compression::Raw, Compression::None] {
            let enc = BatchEncoder::new(ProtocolVersion::V1, compression);
            let events = vec![event("a"), event("b"), event("c")];
            let (bytes, last) = enc.encode_batch(&events, 1).unwrap();
            assert_eq!(last, 3);

            let frames = decode_fixed(&bytes, compression).unwrap();
            assert_eq!(frames[0], Frame::Window { size: 3 });
            let seqs: Vec<u32> = frames[1..].iter().filter_map(Frame::seq).collect();
            assert_eq!(seqs, vec![1, 2, 3]);
            match &frames[1] {
                Frame::Data { pairs, .. } => {
                    assert!(pairs.contains(&("line".to_string(), "a".to_string())));
                }
                other => panic!("expected data frame, got {:?}", other),
            }
        }
    }

    #[test]
    fn batch_sequences_wrap_past_u32_max() {
        let enc = BatchEncoder::new(ProtocolVersion::V1, Compression::None);
        let events = vec![event("a"), event("b"), event("c")];
        let (bytes, last) = enc.encode_batch(&events, u32::MAX).unwrap();
        assert_eq!(last, 2);
        let frames = decode_fixed(&bytes, Compression::None).unwrap();
        let seqs: Vec<u32> = frames.iter().filter_map(Frame::seq).collect();
        assert_eq!(seqs, vec![u32::MAX, 1, 2]);
    }

    #[test]
    fn v2_batch_uses_json_frames() {
        let enc = BatchEncoder::new(ProtocolVersion::V2, Compression::Zlib);
        let (bytes, _) = enc.encode_batch(&[event("x")], 5).unwrap();
        let frames = decode_fixed(&bytes, Compression::Zlib).unwrap();
        match &frames[1] {
            Frame::Json { seq, payload } => {
                assert_eq!(*seq, 5);
                let v: serde_json::Value = serde_json::from_slice(payload).unwrap();
                assert_eq!(v["line"], "x");
            }
            other => panic!("expected json frame, got {:?}", other),
        }
    }

    #[test]
    fn container_inside_container_is_tolerated() {
        let mut inner = BytesMut::new();
        encode_data(1, &[("k".to_string(), "v".to_string())], &mut inner);
        let packed_inner = deflate(&inner, Compression::Zlib).unwrap();

        let mut mid = BytesMut::new();
        mid.put_u8(VERSION_1);
        mid.put_u8(CODE_COMPRESSED);
        mid.put_u32(packed_inner.len() as u32);
        mid.extend_from_slice(&packed_inner);
        let packed_mid = deflate(&mid, Compression::Zlib).unwrap();

        let mut outer = BytesMut::new();
        outer.put_u8(VERSION_1);
        outer.put_u8(CODE_COMPRESSED);
        outer.put_u32(packed_mid.len() as u32);
        outer.extend_from_slice(&packed_mid);

        let frames = decode_fixed(&outer, Compression::Zlib).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq(), Some(1));
    }

    #[test]
    fn unknown_code_is_fatal() {
        let err = decode_fixed(b"1X\x00\x00\x00\x00", Compression::None).unwrap_err();
        assert!(matches!(err, CodecError::UnknownFrame(b'X')));
    }

    #[test]
    fn unknown_version_is_fatal() {
        let err = decode_fixed(b"3W\x00\x00\x00\x00", Compression::None).unwrap_err();
        assert!(matches!(err, CodecError::UnknownVersion(b'3')));
    }

    #[test]
    fn incremental_decoder_waits_for_full_frames() {
        let mut buf = BytesMut::new();
        encode_data(2, &[("line".to_string(), "hello".to_string())], &mut buf);

        let mut dec = FrameDecoder::new(Compression::None);
        let (head, tail) = buf.split_at(buf.len() / 2);

        dec.extend(head);
        assert!(dec.next_frame().unwrap().is_none());

        dec.extend(tail);
        let frame = dec.next_frame().unwrap().expect("frame after full bytes");
        assert_eq!(frame.seq(), Some(2));
        assert!(dec.next_frame().unwrap().is_none());
    }

    #[test]
    fn incremental_decoder_inlines_compressed_batches() {
        let enc = BatchEncoder::new(ProtocolVersion::V1, Compression::Zlib);
        let (bytes, _) = enc.encode_batch(&[event("a"), event("b")], 1).unwrap();

        let mut dec = FrameDecoder::new(Compression::Zlib);
        dec.extend(&bytes);
        assert_eq!(
            dec.next_frame().unwrap(),
            Some(Frame::Window { size: 2 })
        );
        assert_eq!(dec.next_frame().unwrap().and_then(|f| f.seq()), Some(1));
        assert_eq!(dec.next_frame().unwrap().and_then(|f| f.seq()), Some(2));
        assert!(dec.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversize_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(VERSION_2);
        buf.put_u8(CODE_JSON);
        buf.put_u32(1);
        buf.put_u32(u32::MAX);
        let err = decode_fixed(&buf, Compression::None).unwrap_err();
        assert!(matches!(err, CodecError::Oversize(_)));
    }

    #[test]
    fn fixed_decode_rejects_truncation() {
        let mut buf = BytesMut::new();
        encode_data(1, &[("k".to_string(), "v".to_string())], &mut buf);
        let err = decode_fixed(&buf[..buf.len() - 1], Compression::None).unwrap_err();
        assert!(matches!(err, CodecError::Truncated));
    }
}
