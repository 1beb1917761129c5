// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Derived `add_field` rules.
//!
//! A rule reads a referenced event field, matches it against a regex and
//! substitutes the captures into a template (`$1`, `$2`, `${name}`). When
//! the regex does not match, the optional default is used instead; without
//! a default the event is left untouched.

use regex::Regex;
use serde_json::Value;

use crate::event::Event;

/// One declarative field-derivation rule, evaluated at runtime.
#[derive(Debug, Clone)]
pub struct AddFieldRule {
    /// Field to set on the event.
    pub key: String,
    /// Field the regex is applied to (usually `line`).
    pub field: String,
    pub matcher: Regex,
    /// Capture substitution template.
    pub template: String,
    pub default: Option<String>,
}

impl AddFieldRule {
    pub fn new(
        key: impl Into<String>,
        field: impl Into<String>,
        pattern: &str,
        template: impl Into<String>,
        default: Option<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            key: key.into(),
            field: field.into(),
            matcher: Regex::new(pattern)?,
            template: template.into(),
            default,
        })
    }

    /// Apply the rule to an event in place.
    pub fn apply(&self, event: &mut Event) {
        let Some(value) = event.get_str(&self.field).map(str::to_owned) else {
            if let Some(default) = &self.default {
                event.insert(self.key.clone(), Value::from(default.as_str()));
            }
            return;
        };

        match self.matcher.captures(&value) {
            Some(caps) => {
                let mut out = String::new();
                caps.expand(&self.template, &mut out);
                event.insert(self.key.clone(), Value::from(out));
            }
            None => {
                if let Some(default) = &self.default {
                    event.insert(self.key.clone(), Value::from(default.as_str()));
                }
            }
        }
    }
}
