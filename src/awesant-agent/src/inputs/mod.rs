// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Input adapters: file tailers (plain and Oracle XML) and the
//! lumberjack network listener.

pub mod file;
pub mod lumberjack;

use async_trait::async_trait;
use serde_json::Value;

/// One record pulled from an input, not yet enriched into an event.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    /// The payload text.
    pub line: String,
    /// Structured fields delivered by the input (e.g. `ora.*` attributes
    /// or decoded lumberjack pairs); merged into the event after the base
    /// fields are set.
    pub fields: Vec<(String, Value)>,
    /// The concrete source path, when the input tails a file.
    pub path: Option<String>,
}

/// Pull contract: `None` is a fatal input error (the pipeline destroys
/// the input), an empty vec means idle.
#[async_trait]
pub trait Input: Send {
    async fn pull(&mut self, max: usize) -> Option<Vec<RawRecord>>;

    /// Called after every record of the last pull has been shipped or
    /// stashed; advances the committed offset for tailed files.
    fn commit(&mut self) {}
}
