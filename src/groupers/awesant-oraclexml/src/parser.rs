// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Line-oriented parser for the Oracle alert-log XML envelope dialect.

use regex::Regex;
use std::sync::OnceLock;

/// One parsed `<msg>…</msg>` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Attributes of the `<msg>` tag plus any standalone
    /// `<attr name='…' value='…'/>` pairs, in document order.
    pub attrs: Vec<(String, String)>,
    /// Decoded `<txt>` body, without the trailing newline.
    pub text: String,
    /// Offset just past the line that closed the envelope.
    pub end_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Scanning for `<msg`.
    FindMsg,
    /// Inside the opening tag, accumulating attribute text until `>`.
    InOpenTag,
    /// Between the opening tag and `</msg>`; `<attr/>` pairs and `<txt>`
    /// live here.
    InBody,
    /// Inside `<txt>…</txt>`.
    InText,
}

/// Incremental envelope parser. Feed physical lines; complete envelopes
/// fall out.
#[derive(Debug)]
pub struct EnvelopeParser {
    state: ParseState,
    tag_buf: String,
    attrs: Vec<(String, String)>,
    segments: Vec<String>,
    cur_segment: String,
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][\w.-]*)\s*=\s*'([^']*)'").expect("static regex"))
}

fn attr_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<attr\s+name\s*=\s*'([^']*)'\s+value\s*=\s*'([^']*)'\s*/>")
            .expect("static regex")
    })
}

/// Decode the XML entity references Oracle writes into `<txt>` bodies.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else {
            out.push_str(rest);
            return out;
        };
        let entity = &rest[1..end];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let decoded = entity
                    .strip_prefix('#')
                    .and_then(|num| num.parse::<u32>().ok())
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    // Unknown entity: keep it verbatim.
                    None => {
                        out.push('&');
                        out.push_str(entity);
                        out.push(';');
                    }
                }
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

impl Default for EnvelopeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::FindMsg,
            tag_buf: String::new(),
            attrs: Vec::new(),
            segments: Vec::new(),
            cur_segment: String::new(),
        }
    }

    /// Feed one physical line; returns the envelope completed by it, if any.
    pub fn push_line(&mut self, line: &str, end_offset: u64) -> Option<Envelope> {
        let mut rest = line;
        loop {
            match self.state {
                ParseState::FindMsg => {
                    let idx = rest.find("<msg")?;
                    self.reset_envelope();
                    rest = &rest[idx + 4..];
                    self.state = ParseState::InOpenTag;
                }
                ParseState::InOpenTag => match rest.find('>') {
                    Some(idx) => {
                        self.tag_buf.push_str(&rest[..idx]);
                        self.collect_tag_attrs();
                        rest = &rest[idx + 1..];
                        self.state = ParseState::InBody;
                    }
                    None => {
                        // Attributes continue on the next physical line.
                        self.tag_buf.push_str(rest);
                        self.tag_buf.push(' ');
                        return None;
                    }
                },
                ParseState::InBody => {
                    if let Some(idx) = rest.find("<txt>") {
                        self.collect_attr_tags(&rest[..idx]);
                        rest = &rest[idx + 5..];
                        self.state = ParseState::InText;
                        continue;
                    }
                    if let Some(idx) = rest.find("</msg>") {
                        self.collect_attr_tags(&rest[..idx]);
                        return Some(self.finish_envelope(end_offset));
                    }
                    self.collect_attr_tags(rest);
                    return None;
                }
                ParseState::InText => match rest.find("</txt>") {
                    Some(idx) => {
                        self.cur_segment.push_str(&rest[..idx]);
                        let segment = std::mem::take(&mut self.cur_segment);
                        self.segments.push(segment);
                        rest = &rest[idx + 6..];
                        self.state = ParseState::InBody;
                    }
                    None => {
                        self.cur_segment.push_str(rest);
                        let segment = std::mem::take(&mut self.cur_segment);
                        self.segments.push(segment);
                        return None;
                    }
                },
            }
        }
    }

    fn reset_envelope(&mut self) {
        self.tag_buf.clear();
        self.attrs.clear();
        self.segments.clear();
        self.cur_segment.clear();
    }

    fn collect_tag_attrs(&mut self) {
        for caps in attr_regex().captures_iter(&self.tag_buf) {
            self.attrs
                .push((caps[1].to_string(), decode_entities(&caps[2])));
        }
        self.tag_buf.clear();
    }

    fn collect_attr_tags(&mut self, segment: &str) {
        for caps in attr_tag_regex().captures_iter(segment) {
            self.attrs
                .push((decode_entities(&caps[1]), decode_entities(&caps[2])));
        }
    }

    fn finish_envelope(&mut self, end_offset: u64) -> Envelope {
        // `<txt>` at end-of-line leaves an empty leading segment behind.
        if self.segments.first().is_some_and(String::is_empty) {
            self.segments.remove(0);
        }
        let text = decode_entities(&self.segments.join("\n"));
        self.state = ParseState::FindMsg;
        Envelope {
            attrs: std::mem::take(&mut self.attrs),
            text,
            end_offset,
        }
    }
}
