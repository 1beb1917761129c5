// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Oracle alert-log XML grouping.
//!
//! Parses the `<msg …><txt>…</txt></msg>` envelope dialect written by the
//! Oracle RDBMS and listener alert logs (opening tags may span several
//! physical lines, attributes are single-quoted, `<txt>` bodies carry XML
//! entity references) and reassembles TNS multi-message sequences,
//! recovering interleaved messages where possible.

mod parser;
mod tns;

pub use parser::{decode_entities, Envelope, EnvelopeParser};
pub use tns::{is_tns_continuation, is_tns_marker, TNS_MARKER_STARS};

use std::time::{Duration, Instant};

use tns::TnsAssembler;

/// Idle TNS assemblies older than this are flushed as-is.
pub const IDLE_FLUSH: Duration = Duration::from_secs(10);

/// One grouped Oracle event.
///
/// `fields` carries the envelope attributes prefixed `ora.`; TNS
/// assemblies additionally carry `ora.type = "TNS"` (or `"TNS mess"` for
/// residue that could not be deinterleaved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleEvent {
    pub fields: Vec<(String, String)>,
    pub text: String,
    pub commit_offset: u64,
}

/// The Oracle XML grouper: envelope parser plus TNS assembler.
#[derive(Debug)]
pub struct OracleXmlGrouper {
    parser: EnvelopeParser,
    tns: TnsAssembler,
    last_activity: Instant,
}

impl Default for OracleXmlGrouper {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleXmlGrouper {
    pub fn new() -> Self {
        Self {
            parser: EnvelopeParser::new(),
            tns: TnsAssembler::new(),
            last_activity: Instant::now(),
        }
    }

    /// Feed one physical line ending at `end_offset`; returns completed
    /// events in order.
    pub fn push_line(&mut self, line: &str, end_offset: u64) -> Vec<OracleEvent> {
        self.last_activity = Instant::now();
        match self.parser.push_line(line, end_offset) {
            Some(envelope) => self.tns.feed(envelope),
            None => Vec::new(),
        }
    }

    /// True while a TNS assembly or backlog is pending.
    pub fn has_pending(&self) -> bool {
        self.tns.has_pending()
    }

    /// Flush a TNS assembly that has been idle for [`IDLE_FLUSH`].
    pub fn idle_flush(&mut self, now: Instant) -> Vec<OracleEvent> {
        if !self.tns.has_pending() || now.duration_since(self.last_activity) < IDLE_FLUSH {
            return Vec::new();
        }
        self.tns.close_all()
    }

    /// Unconditional flush, used at shutdown.
    pub fn flush(&mut self) -> Vec<OracleEvent> {
        self.tns.close_all()
    }
}
