// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TNS multi-message assembly with out-of-order recovery.
//!
//! A TNS report is spread over many envelopes: a banner of asterisks, then
//! sub-messages in a fixed order (NI → VERSION INFORMATION → Time →
//! Tracing → Tns error struct → nr/ns/nt err codes → Client address).
//! Two reports written concurrently interleave their envelopes; a
//! lower-or-equal ladder state arriving after a higher one betrays the
//! interleave and the envelope is parked in a backlog. At closure the
//! backlog is greedily re-scanned to rebuild the other report(s); whatever
//! cannot be placed is emitted tagged `ora.type = "TNS mess"`.

use tracing::debug;

use crate::parser::Envelope;
use crate::OracleEvent;

/// Number of leading asterisks that open a TNS report banner.
pub const TNS_MARKER_STARS: usize = 71;

/// Ladder state that must be reached before a non-continuation envelope
/// may close the assembly (the `Time:` sub-message).
const MIN_COMPLETE_STATE: u32 = 30;

/// Ladder states whose `TNS-…` code line is still expected.
const CODE_STATES: [u32; 6] = [60, 61, 70, 71, 90, 91];

/// True when `text` opens a TNS report (banner of asterisks).
pub fn is_tns_marker(text: &str) -> bool {
    let first = text.lines().next().unwrap_or("");
    first.chars().take_while(|c| *c == '*').count() >= TNS_MARKER_STARS
}

/// True when `text` continues an open TNS report: indented, a `TNS…`
/// line, or a fresh `Fatal NI connect error`.
pub fn is_tns_continuation(text: &str) -> bool {
    let first = text.lines().next().unwrap_or("");
    first.starts_with(' ')
        || first.starts_with('\t')
        || first.starts_with("TNS")
        || first.starts_with("Fatal NI connect error")
        || is_tns_marker(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TnsKey {
    /// A recognized sub-message with its ladder state.
    State(u32),
    /// A `TNS-…` error code line, paired with the preceding err-code state.
    Code,
    /// A continuation without a ladder key.
    Plain,
}

fn classify(text: &str) -> TnsKey {
    let first = text.lines().next().unwrap_or("").trim_start();
    if first.starts_with("Fatal NI connect error") {
        TnsKey::State(10)
    } else if first.starts_with("VERSION INFORMATION") {
        TnsKey::State(20)
    } else if first.starts_with("Time:") {
        TnsKey::State(30)
    } else if first.starts_with("Tracing") {
        TnsKey::State(40)
    } else if first.starts_with("Tns error struct") {
        TnsKey::State(50)
    } else if first.starts_with("nr err code") {
        TnsKey::State(60)
    } else if first.starts_with("ns main err code") {
        TnsKey::State(70)
    } else if first.starts_with("ns secondary err code") {
        TnsKey::State(80)
    } else if first.starts_with("nt main err code") {
        TnsKey::State(90)
    } else if first.starts_with("nt secondary err code") {
        TnsKey::State(100)
    } else if first.starts_with("nt OS err code") {
        TnsKey::State(110)
    } else if first.starts_with("Client address") {
        TnsKey::State(150)
    } else if first.starts_with("TNS-") {
        TnsKey::Code
    } else {
        TnsKey::Plain
    }
}

#[derive(Debug)]
struct TnsMessage {
    parts: Vec<Envelope>,
    state: u32,
}

impl TnsMessage {
    fn new() -> Self {
        Self {
            parts: Vec::new(),
            state: 0,
        }
    }

    /// Try to take `env` into this message; returns false when the ladder
    /// says it belongs to another interleaved report.
    fn accept(&mut self, env: Envelope, key: TnsKey) -> Result<(), Envelope> {
        match key {
            TnsKey::State(s) if s > self.state => {
                self.state = s;
                self.parts.push(env);
                Ok(())
            }
            TnsKey::State(_) => Err(env),
            TnsKey::Code if CODE_STATES.contains(&self.state) => {
                self.state |= 1;
                self.parts.push(env);
                Ok(())
            }
            TnsKey::Code => Err(env),
            TnsKey::Plain => {
                self.parts.push(env);
                Ok(())
            }
        }
    }

    fn into_event(self, ora_type: &str) -> OracleEvent {
        let mut fields = prefixed_attrs(self.parts.first());
        set_ora_type(&mut fields, ora_type);
        let text = self
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let commit_offset = self.parts.iter().map(|p| p.end_offset).max().unwrap_or(0);
        OracleEvent {
            fields,
            text,
            commit_offset,
        }
    }
}

fn prefixed_attrs(env: Option<&Envelope>) -> Vec<(String, String)> {
    env.map(|e| {
        e.attrs
            .iter()
            .map(|(k, v)| (format!("ora.{}", k), v.clone()))
            .collect()
    })
    .unwrap_or_default()
}

fn set_ora_type(fields: &mut Vec<(String, String)>, value: &str) {
    if let Some(slot) = fields.iter_mut().find(|(k, _)| k == "ora.type") {
        slot.1 = value.to_string();
    } else {
        fields.push(("ora.type".to_string(), value.to_string()));
    }
}

fn standalone_event(env: Envelope) -> OracleEvent {
    OracleEvent {
        fields: env
            .attrs
            .iter()
            .map(|(k, v)| (format!("ora.{}", k), v.clone()))
            .collect(),
        text: env.text,
        commit_offset: env.end_offset,
    }
}

fn mess_event(env: Envelope) -> OracleEvent {
    let mut event = standalone_event(env);
    set_ora_type(&mut event.fields, "TNS mess");
    event
}

/// Assembles envelopes into events, deinterleaving TNS reports.
#[derive(Debug)]
pub(crate) struct TnsAssembler {
    active: Option<TnsMessage>,
    backlog: Vec<Envelope>,
}

impl TnsAssembler {
    pub(crate) fn new() -> Self {
        Self {
            active: None,
            backlog: Vec::new(),
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.active.is_some() || !self.backlog.is_empty()
    }

    pub(crate) fn feed(&mut self, env: Envelope) -> Vec<OracleEvent> {
        if is_tns_marker(&env.text) {
            let mut out = self.close_all();
            let mut msg = TnsMessage::new();
            msg.parts.push(env);
            self.active = Some(msg);
            return out;
        }

        let Some(msg) = self.active.as_mut() else {
            return vec![standalone_event(env)];
        };

        if is_tns_continuation(&env.text) {
            let key = classify(&env.text);
            if let Err(rejected) = msg.accept(env, key) {
                debug!(
                    "TNS envelope out of order at state {}, parking in backlog",
                    msg.state
                );
                self.backlog.push(rejected);
            }
            return Vec::new();
        }

        if msg.state < MIN_COMPLETE_STATE {
            // The report is still incomplete; odd interior envelopes are
            // kept with it rather than splitting the assembly.
            msg.parts.push(env);
            return Vec::new();
        }

        let mut out = self.close_all();
        out.push(standalone_event(env));
        out
    }

    /// Emit the active assembly, rebuild interleaved reports from the
    /// backlog and mark the residue.
    pub(crate) fn close_all(&mut self) -> Vec<OracleEvent> {
        let mut out = Vec::new();
        if let Some(msg) = self.active.take() {
            out.push(msg.into_event("TNS"));
        }

        while !self.backlog.is_empty() {
            let mut msg = TnsMessage::new();
            let mut rest = Vec::new();
            for env in self.backlog.drain(..) {
                let key = classify(&env.text);
                // Stray continuations only attach to an open reconstruction.
                let key = match key {
                    TnsKey::Plain if msg.parts.is_empty() => TnsKey::Code,
                    other => other,
                };
                if let Err(rejected) = msg.accept(env, key) {
                    rest.push(rejected);
                }
            }
            self.backlog = rest;
            if msg.parts.is_empty() {
                break;
            }
            out.push(msg.into_event("TNS"));
        }

        out.extend(self.backlog.drain(..).map(mess_event));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(text: &str, offset: u64) -> Envelope {
        Envelope {
            attrs: vec![("time".to_string(), format!("t{}", offset))],
            text: text.to_string(),
            end_offset: offset,
        }
    }

    fn marker() -> String {
        "*".repeat(TNS_MARKER_STARS)
    }

    #[test]
    fn marker_detection_requires_71_stars() {
        assert!(is_tns_marker(&marker()));
        assert!(is_tns_marker(&"*".repeat(80)));
        assert!(!is_tns_marker(&"*".repeat(70)));
        assert!(!is_tns_marker("plain text"));
    }

    #[test]
    fn continuation_detection() {
        assert!(is_tns_continuation("  indented"));
        assert!(is_tns_continuation("\ttabbed"));
        assert!(is_tns_continuation("TNS-12560: boom"));
        assert!(is_tns_continuation("TNS for Linux"));
        assert!(is_tns_continuation("Fatal NI connect error 12170."));
        assert!(!is_tns_continuation("ORA-00600: x"));
    }

    #[test]
    fn ladder_states_are_ordered() {
        assert_eq!(classify("Fatal NI connect error 1."), TnsKey::State(10));
        assert_eq!(classify("VERSION INFORMATION:"), TnsKey::State(20));
        assert_eq!(classify("Time: now"), TnsKey::State(30));
        assert_eq!(classify("Tracing not turned on."), TnsKey::State(40));
        assert_eq!(classify("Tns error struct:"), TnsKey::State(50));
        assert_eq!(classify("nr err code: 0"), TnsKey::State(60));
        assert_eq!(classify("ns main err code: 12560"), TnsKey::State(70));
        assert_eq!(classify("ns secondary err code: 0"), TnsKey::State(80));
        assert_eq!(classify("nt main err code: 530"), TnsKey::State(90));
        assert_eq!(classify("nt secondary err code: 2"), TnsKey::State(100));
        assert_eq!(classify("nt OS err code: 0"), TnsKey::State(110));
        assert_eq!(classify("Client address: (ADDRESS=...)"), TnsKey::State(150));
        assert_eq!(classify("TNS-12560: boom"), TnsKey::Code);
        assert_eq!(classify("whatever"), TnsKey::Plain);
    }

    #[test]
    fn code_lines_pair_with_their_err_code_state() {
        let mut a = TnsAssembler::new();
        assert!(a.feed(env(&marker(), 1)).is_empty());
        assert!(a.feed(env("Fatal NI connect error 12560.", 2)).is_empty());
        assert!(a.feed(env("Time: now", 3)).is_empty());
        assert!(a.feed(env("ns main err code: 12560", 4)).is_empty());
        assert!(a.feed(env("TNS-12560: lost contact", 5)).is_empty());
        assert!(a.feed(env("TNS-00530: protocol error", 6)).is_empty());
        assert!(a.feed(env("ns secondary err code: 0", 7)).is_empty());

        let out = a.feed(env("ORA-00001: done", 8));
        assert_eq!(out.len(), 2);
        assert!(out[0].text.contains("TNS-12560"));
        assert!(out[0].text.contains("TNS-00530"));
        assert!(out[0].text.contains("ns secondary err code"));
    }

    #[test]
    fn full_ladder_assembles_single_report() {
        let mut a = TnsAssembler::new();
        let lines = [
            "Fatal NI connect error 12170.",
            "VERSION INFORMATION:",
            "Time: 01-MAR-2026",
            "Tracing not turned on.",
            "Tns error struct:",
            "nr err code: 0",
            "ns main err code: 12535",
            "TNS-12535: operation timed out",
            "ns secondary err code: 12560",
            "nt main err code: 505",
            "TNS-00505: operation timed out",
            "nt secondary err code: 110",
            "nt OS err code: 0",
            "Client address: (ADDRESS=(PROTOCOL=tcp)(HOST=10.0.0.9))",
        ];
        assert!(a.feed(env(&marker(), 0)).is_empty());
        for (i, line) in lines.iter().enumerate() {
            assert!(a.feed(env(line, i as u64 + 1)).is_empty(), "line {}", line);
        }
        let out = a.feed(env("ORA-00001: done", 99));
        assert_eq!(out.len(), 2);
        let tns = &out[0];
        assert!(tns.fields.contains(&("ora.type".to_string(), "TNS".to_string())));
        for line in lines {
            assert!(tns.text.contains(line), "missing {}", line);
        }
        assert_eq!(tns.commit_offset, 14);
    }

    #[test]
    fn close_all_marks_unplaceable_codes_as_mess() {
        let mut a = TnsAssembler::new();
        a.feed(env(&marker(), 1));
        a.feed(env("Fatal NI connect error 12170.", 2));
        a.feed(env("Time: now", 3));
        a.feed(env("TNS-12560: stray", 4));
        let out = a.close_all();
        assert_eq!(out.len(), 2);
        assert!(out[1]
            .fields
            .contains(&("ora.type".to_string(), "TNS mess".to_string())));
        assert!(!a.has_pending());
    }

    #[test]
    fn second_marker_closes_the_first_report() {
        let mut a = TnsAssembler::new();
        a.feed(env(&marker(), 1));
        a.feed(env("Fatal NI connect error 1.", 2));
        let out = a.feed(env(&marker(), 3));
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("Fatal NI connect error 1."));
        assert!(a.has_pending());
    }
}
