// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Multi-line grouping state machine.
//!
//! Coalesces raw physical lines into logical events according to one of
//! five modes. The grouper is single-producer single-consumer and emits
//! events in input order; each emitted event carries the byte offset the
//! tailer may commit once the event has been shipped or stashed.

use std::time::{Duration, Instant};

use regex::Regex;

/// Buffers idle longer than this are flushed as-is.
pub const IDLE_FLUSH: Duration = Duration::from_secs(10);

/// Grouping mode, selected by `multiline_mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MultilineMode {
    /// Every input line is one event.
    #[default]
    SingleLine,
    /// A non-indented line opens an event, indented lines append, the next
    /// non-indented line closes it (and opens the next).
    Indented,
    /// Opens on `multiline_prefix`; absorbs indented lines and lines
    /// matching `multiline_indented_group`; anything else closes.
    IndentedGroup,
    /// Opens on `multiline_prefix`; closes on the next prefix or on
    /// `multiline_garbage`.
    PrefixGarbage,
    /// Opens on `multiline_prefix`; closes on `multiline_suffix` inclusive.
    PrefixSuffix,
}

impl std::str::FromStr for MultilineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-line" => Ok(MultilineMode::SingleLine),
            "indented" => Ok(MultilineMode::Indented),
            "indented-group" => Ok(MultilineMode::IndentedGroup),
            "prefix-garbage" => Ok(MultilineMode::PrefixGarbage),
            "prefix-suffix" => Ok(MultilineMode::PrefixSuffix),
            other => Err(format!("invalid multiline_mode '{}'", other)),
        }
    }
}

/// Compiled grouping configuration.
#[derive(Debug, Clone, Default)]
pub struct MultilineConfig {
    pub mode: MultilineMode,
    pub prefix: Option<Regex>,
    pub suffix: Option<Regex>,
    pub garbage: Option<Regex>,
    pub indented_group: Option<Regex>,
    /// Drop lines that match no open event (default). When false such
    /// lines are emitted as singleton events instead.
    pub drop_garbage: bool,
}

impl MultilineConfig {
    pub fn single_line() -> Self {
        Self {
            drop_garbage: true,
            ..Self::default()
        }
    }

    /// Check the mode has the regexes it needs.
    pub fn validate(&self) -> Result<(), String> {
        match self.mode {
            MultilineMode::SingleLine | MultilineMode::Indented => Ok(()),
            MultilineMode::IndentedGroup | MultilineMode::PrefixGarbage => {
                if self.prefix.is_none() {
                    return Err(format!("{:?} mode requires multiline_prefix", self.mode));
                }
                Ok(())
            }
            MultilineMode::PrefixSuffix => {
                if self.prefix.is_none() || self.suffix.is_none() {
                    return Err(
                        "prefix-suffix mode requires multiline_prefix and multiline_suffix"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}

/// One complete logical event plus the offset safe to commit after it has
/// been shipped or stashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedEvent {
    pub text: String,
    pub commit_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    FindStart,
    ReadUntilSuffix,
    ReadUntilPrefix,
    ReadUntilNonIndent,
}

/// The grouping state machine.
#[derive(Debug)]
pub struct Grouper {
    cfg: MultilineConfig,
    state: GroupState,
    buf: Vec<String>,
    buf_end: u64,
    last_activity: Instant,
}

impl Grouper {
    pub fn new(cfg: MultilineConfig) -> Self {
        Self {
            cfg,
            state: GroupState::FindStart,
            buf: Vec::new(),
            buf_end: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn has_buffer(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Feed one physical line ending at `end_offset`; returns zero or more
    /// completed events, in order.
    pub fn push_line(&mut self, line: &str, end_offset: u64) -> Vec<GroupedEvent> {
        self.last_activity = Instant::now();
        let mut out = Vec::new();
        match self.cfg.mode {
            MultilineMode::SingleLine => out.push(GroupedEvent {
                text: line.to_string(),
                commit_offset: end_offset,
            }),
            MultilineMode::Indented => self.push_indented(line, end_offset, &mut out),
            MultilineMode::IndentedGroup => self.push_indented_group(line, end_offset, &mut out),
            MultilineMode::PrefixGarbage => self.push_prefix_garbage(line, end_offset, &mut out),
            MultilineMode::PrefixSuffix => self.push_prefix_suffix(line, end_offset, &mut out),
        }
        out
    }

    /// Emit a buffer that has been idle for [`IDLE_FLUSH`]. The committed
    /// offset advances to the current read position (nothing newer has
    /// arrived while idle).
    pub fn idle_flush(&mut self, now: Instant) -> Option<GroupedEvent> {
        if self.buf.is_empty() || now.duration_since(self.last_activity) < IDLE_FLUSH {
            return None;
        }
        Some(self.emit())
    }

    /// Unconditional flush, used at shutdown.
    pub fn flush(&mut self) -> Option<GroupedEvent> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.emit())
    }

    fn emit(&mut self) -> GroupedEvent {
        let event = GroupedEvent {
            text: self.buf.join("\n"),
            commit_offset: self.buf_end,
        };
        self.buf.clear();
        self.state = GroupState::FindStart;
        event
    }

    fn open(&mut self, line: &str, end_offset: u64, state: GroupState) {
        self.buf.push(line.to_string());
        self.buf_end = end_offset;
        self.state = state;
    }

    fn absorb(&mut self, line: &str, end_offset: u64) {
        self.buf.push(line.to_string());
        self.buf_end = end_offset;
    }

    fn garbage(&mut self, line: &str, end_offset: u64, out: &mut Vec<GroupedEvent>) {
        if !self.cfg.drop_garbage {
            out.push(GroupedEvent {
                text: line.to_string(),
                commit_offset: end_offset,
            });
        }
    }

    fn matches(re: &Option<Regex>, line: &str) -> bool {
        re.as_ref().is_some_and(|re| re.is_match(line))
    }

    fn push_indented(&mut self, line: &str, end_offset: u64, out: &mut Vec<GroupedEvent>) {
        if is_indented(line) && !self.buf.is_empty() {
            self.absorb(line, end_offset);
            return;
        }
        if !self.buf.is_empty() {
            out.push(self.emit());
        }
        self.open(line, end_offset, GroupState::ReadUntilNonIndent);
    }

    fn push_indented_group(&mut self, line: &str, end_offset: u64, out: &mut Vec<GroupedEvent>) {
        if self.state == GroupState::ReadUntilNonIndent {
            if is_indented(line) || Self::matches(&self.cfg.indented_group, line) {
                self.absorb(line, end_offset);
                return;
            }
            out.push(self.emit());
        }
        if Self::matches(&self.cfg.prefix, line) {
            self.open(line, end_offset, GroupState::ReadUntilNonIndent);
        } else {
            self.garbage(line, end_offset, out);
        }
    }

    fn push_prefix_garbage(&mut self, line: &str, end_offset: u64, out: &mut Vec<GroupedEvent>) {
        if self.state == GroupState::ReadUntilPrefix {
            if Self::matches(&self.cfg.prefix, line) {
                out.push(self.emit());
                self.open(line, end_offset, GroupState::ReadUntilPrefix);
                return;
            }
            if Self::matches(&self.cfg.garbage, line) {
                out.push(self.emit());
                self.garbage(line, end_offset, out);
                return;
            }
            self.absorb(line, end_offset);
            return;
        }
        if Self::matches(&self.cfg.prefix, line) {
            self.open(line, end_offset, GroupState::ReadUntilPrefix);
        } else {
            self.garbage(line, end_offset, out);
        }
    }

    fn push_prefix_suffix(&mut self, line: &str, end_offset: u64, out: &mut Vec<GroupedEvent>) {
        if self.state == GroupState::ReadUntilSuffix {
            self.absorb(line, end_offset);
            if Self::matches(&self.cfg.suffix, line) {
                out.push(self.emit());
            }
            return;
        }
        if Self::matches(&self.cfg.prefix, line) {
            self.open(line, end_offset, GroupState::ReadUntilSuffix);
            // A one-line event may match prefix and suffix at once.
            if Self::matches(&self.cfg.suffix, line) {
                out.push(self.emit());
            }
        } else {
            self.garbage(line, end_offset, out);
        }
    }
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}
