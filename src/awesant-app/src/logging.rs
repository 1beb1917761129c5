// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Agent log setup.
//!
//! The screen output streams events on stdout, so the agent's own log
//! always goes to stderr to keep the event stream clean.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_LEVEL: Level = Level::INFO;

/// Initialize logging with the level from `[agent].log_level`.
pub fn init_logging(log_level: Option<&str>) {
    FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(resolve_level(log_level))
        .init();
}

/// Map a configured level name to a tracing level. Config validation
/// already rejects unknown names; `None` (and, defensively, anything
/// unparsable) falls back to `info`.
pub fn resolve_level(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(DEFAULT_LEVEL)
}
