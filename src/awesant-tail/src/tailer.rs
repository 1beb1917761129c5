// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::position::PositionStore;

/// Consecutive EOF polls tolerated after an inode change before the old
/// handle is dropped and the rotated-in file is opened at offset 0
/// (~10 s at the default 500 ms poll cadence).
pub const EOF_ROTATION_TOLERANCE: u32 = 20;

/// Where to start reading when no usable saved position exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    Begin,
    #[default]
    End,
}

impl std::str::FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "begin" => Ok(StartPosition::Begin),
            "end" => Ok(StartPosition::End),
            other => Err(format!(
                "invalid start_position '{}' (expected 'begin' or 'end')",
                other
            )),
        }
    }
}

/// Result of one line pull.
#[derive(Debug, PartialEq, Eq)]
pub enum TailRead {
    /// One line, without its trailing newline. `Tailer::tell` now points
    /// past the line's terminator.
    Line(String),
    /// Nothing new to read right now.
    Eof,
    /// The tailed path disappeared; the input can be destroyed.
    Removed,
}

/// Tails one file, tracking `(device, inode)` identity and a committed
/// byte offset that only the caller advances.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    dev: u64,
    ino: u64,
    offset: u64,
    committed: u64,
    eof_polls: u32,
    position: Option<PositionStore>,
}

impl Tailer {
    /// Open `path` and seek to the resume point: the saved position when
    /// its inode matches the live file, otherwise EOF for
    /// [`StartPosition::End`] or 0 for [`StartPosition::Begin`].
    pub fn open(
        path: impl Into<PathBuf>,
        start: StartPosition,
        position: Option<PositionStore>,
    ) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let meta = file.metadata()?;
        let size = meta.len();
        let ino = meta.ino();

        let saved = position.as_ref().and_then(|p| p.load());
        let offset = match saved {
            Some(pos) if pos.inode == ino => {
                if pos.offset > size {
                    info!(
                        "{}: saved offset {} beyond file size {}, starting over",
                        path.display(),
                        pos.offset,
                        size
                    );
                    0
                } else {
                    debug!("{}: resuming at offset {}", path.display(), pos.offset);
                    pos.offset
                }
            }
            Some(_) => {
                debug!("{}: saved position has stale inode, ignoring", path.display());
                start_offset(start, size)
            }
            None => start_offset(start, size),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        Ok(Self {
            path,
            reader: Some(reader),
            dev: meta.dev(),
            ino,
            offset,
            committed: offset,
            eof_polls: 0,
            position,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inode(&self) -> u64 {
        self.ino
    }

    pub fn device(&self) -> u64 {
        self.dev
    }

    /// Offset right after the last line returned by [`Tailer::read_line`].
    pub fn tell(&self) -> u64 {
        self.offset
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Pull one line from the current offset, handling rotation at EOF.
    pub fn read_line(&mut self) -> std::io::Result<TailRead> {
        if self.reader.is_none() {
            match self.reopen(0) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(TailRead::Removed);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(line) = self.next_line()? {
            return Ok(TailRead::Line(line));
        }
        self.handle_eof()
    }

    /// Persist a commit boundary. Only called at the end of a complete
    /// logical event; partial multi-line buffers never reach here.
    pub fn commit(&mut self, offset: u64) -> std::io::Result<()> {
        self.committed = offset;
        if let Some(store) = self.position.as_mut() {
            store.save(self.ino, offset)?;
        }
        Ok(())
    }

    fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut raw = Vec::new();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        // A partial line at EOF belongs to a write in progress; leave it
        // for the next pull.
        if raw.last() != Some(&b'\n') {
            reader.seek(SeekFrom::Start(self.offset))?;
            return Ok(None);
        }
        self.offset += n as u64;
        self.eof_polls = 0;
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
    }

    fn handle_eof(&mut self) -> std::io::Result<TailRead> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{}: removed, closing tailer", self.path.display());
                self.reader = None;
                return Ok(TailRead::Removed);
            }
            Err(e) => return Err(e),
        };

        if meta.ino() != self.ino || meta.dev() != self.dev {
            self.eof_polls += 1;
            if self.eof_polls > EOF_ROTATION_TOLERANCE {
                info!(
                    "{}: rotated (inode {} -> {}), reopening",
                    self.path.display(),
                    self.ino,
                    meta.ino()
                );
                self.reopen(0)?;
                if let Some(line) = self.next_line()? {
                    return Ok(TailRead::Line(line));
                }
            }
            return Ok(TailRead::Eof);
        }

        if meta.len() < self.offset {
            warn!(
                "{}: truncated below offset {} (size {}), restarting at 0",
                self.path.display(),
                self.offset,
                meta.len()
            );
            if let Some(reader) = self.reader.as_mut() {
                reader.seek(SeekFrom::Start(0))?;
            }
            self.offset = 0;
            self.commit(0)?;
            if let Some(line) = self.next_line()? {
                return Ok(TailRead::Line(line));
            }
        }

        Ok(TailRead::Eof)
    }

    fn reopen(&mut self, offset: u64) -> std::io::Result<()> {
        let file = File::open(&self.path)?;
        let meta = file.metadata()?;
        self.dev = meta.dev();
        self.ino = meta.ino();
        self.offset = offset;
        self.eof_polls = 0;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;
        self.reader = Some(reader);
        self.commit(offset)?;
        Ok(())
    }
}

fn start_offset(start: StartPosition, size: u64) -> u64 {
    match start {
        StartPosition::Begin => 0,
        StartPosition::End => size,
    }
}
