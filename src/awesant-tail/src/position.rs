// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A persisted read position: inode plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub inode: u64,
    pub offset: u64,
}

/// Per-source position file.
///
/// The record is `<14-digit inode>:<14-digit offset>`, zero padded so each
/// commit is a same-length in-place overwrite. A record whose inode does
/// not match the live file is ignored by the tailer.
#[derive(Debug)]
pub struct PositionStore {
    path: PathBuf,
    file: Option<File>,
}

const RECORD_LEN: usize = 14 + 1 + 14;

impl PositionStore {
    /// Position file for `source` under `libdir`:
    /// `<libdir>/awesant-<basename>.pos`.
    pub fn for_source(libdir: &Path, source: &Path) -> Self {
        let basename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        Self {
            path: libdir.join(format!("awesant-{}.pos", basename)),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved position, if the file exists and parses.
    pub fn load(&self) -> Option<Position> {
        let mut content = String::new();
        File::open(&self.path)
            .ok()?
            .read_to_string(&mut content)
            .ok()?;
        let content = content.trim();
        let (inode, offset) = content.split_once(':')?;
        if inode.len() != 14 || offset.len() != 14 {
            return None;
        }
        Some(Position {
            inode: inode.parse().ok()?,
            offset: offset.parse().ok()?,
        })
    }

    /// Rewrite the record in place (seek to zero, full overwrite).
    pub fn save(&mut self, inode: u64, offset: u64) -> std::io::Result<()> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = Some(
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(&self.path)?,
            );
        }
        let record = format!("{:014}:{:014}", inode, offset);
        debug_assert_eq!(record.len(), RECORD_LEN);
        // The option is filled right above; there is no early return between.
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(record.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }
}
