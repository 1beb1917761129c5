// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Screen output: writes events to stdout. Doubles as the foreground
//! diagnostic channel.

use std::io::Write;

use async_trait::async_trait;

use awesant_core::{Event, ShipError, ShipResult};

use crate::config::OutputConfig;
use crate::outputs::Output;

pub struct ScreenOutput {
    pretty: bool,
}

impl ScreenOutput {
    pub fn new(cfg: &OutputConfig) -> Self {
        Self { pretty: cfg.pretty }
    }

    fn write(&self, line: &str) -> ShipResult<()> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        writeln!(lock, "{}", line)
            .and_then(|_| lock.flush())
            .map_err(|e| ShipError::communication(format!("stdout write failed: {}", e)))
    }
}

#[async_trait]
impl Output for ScreenOutput {
    fn name(&self) -> String {
        "screen".to_string()
    }

    async fn push_line(&mut self, line: &str) -> ShipResult<()> {
        if self.pretty {
            let rendered = serde_json::from_str::<serde_json::Value>(line)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| line.to_string());
            return self.write(&rendered);
        }
        self.write(line)
    }

    async fn push_batch(&mut self, events: &[Event]) -> ShipResult<()> {
        for event in events {
            self.push_line(&event.to_json()).await?;
        }
        Ok(())
    }
}
