// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Output adapters and the static kind registry.

pub mod file;
pub mod lumberjack;
pub mod screen;
pub mod socket;

use async_trait::async_trait;

use awesant_core::{DynResult, Event, ShipResult};

use crate::config::OutputConfig;

/// Push contract: any error means "stash and retry".
///
/// Adapters with `max_window_size() == 0` receive single JSON lines;
/// batch-capable adapters receive event slices no longer than their
/// window.
#[async_trait]
pub trait Output: Send {
    fn name(&self) -> String;

    fn max_window_size(&self) -> usize {
        0
    }

    async fn push_line(&mut self, line: &str) -> ShipResult<()>;

    async fn push_batch(&mut self, events: &[Event]) -> ShipResult<()> {
        for event in events {
            self.push_line(&event.to_json()).await?;
        }
        Ok(())
    }
}

/// Build an adapter from a validated output config. Unknown kinds were
/// rejected at startup; hitting one here is a bug.
pub fn build_output(cfg: &OutputConfig) -> DynResult<Box<dyn Output>> {
    match cfg.normalized_kind().as_str() {
        "screen" => Ok(Box::new(screen::ScreenOutput::new(cfg))),
        "file" => Ok(Box::new(file::FileOutput::new(cfg)?)),
        "socket" => Ok(Box::new(socket::SocketOutput::new(cfg))),
        "lumberjack" => Ok(Box::new(lumberjack::LumberjackOutput::new(cfg)?)),
        other => Err(format!("unknown output kind '{}'", other).into()),
    }
}
