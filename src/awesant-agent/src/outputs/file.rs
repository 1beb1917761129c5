// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! File output: appends JSON lines, reopening when the target rotates.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use async_trait::async_trait;

use awesant_core::{ShipError, ShipResult};

use crate::config::OutputConfig;
use crate::outputs::Output;

pub struct FileOutput {
    path: PathBuf,
    writer: Option<(File, u64)>,
}

impl FileOutput {
    pub fn new(cfg: &OutputConfig) -> Result<Self, String> {
        let path = cfg
            .path
            .as_deref()
            .ok_or("file output requires a path")?
            .into();
        Ok(Self { path, writer: None })
    }

    fn ensure_open(&mut self) -> std::io::Result<&mut File> {
        let live_ino = std::fs::metadata(&self.path).map(|m| m.ino()).ok();
        let stale = match (&self.writer, live_ino) {
            (Some((_, ino)), Some(live)) => *ino != live,
            (Some(_), None) => true,
            (None, _) => true,
        };
        if stale {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            let ino = file.metadata()?.ino();
            self.writer = Some((file, ino));
        }
        // Just (re)filled above when empty.
        match self.writer.as_mut() {
            Some((file, _)) => Ok(file),
            None => Err(std::io::Error::other("writer unavailable")),
        }
    }
}

#[async_trait]
impl Output for FileOutput {
    fn name(&self) -> String {
        format!("file({})", self.path.display())
    }

    async fn push_line(&mut self, line: &str) -> ShipResult<()> {
        let path = self.path.display().to_string();
        let file = self
            .ensure_open()
            .map_err(|e| ShipError::communication(format!("open {}: {}", path, e)))?;
        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|e| {
                self.writer = None;
                ShipError::communication(format!("write {}: {}", path, e))
            })
    }
}
