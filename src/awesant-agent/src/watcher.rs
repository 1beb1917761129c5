// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wildcard expansion for file inputs.
//!
//! The worker re-globs each configured path every `log_watch_interval`
//! seconds and opens a tailer per newly discovered file. The first
//! expansion honours the configured `start_position`; files that appear
//! later are read from the beginning so a rotated-in successor is
//! captured in full.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use awesant_tail::StartPosition;

use crate::config::InputConfig;
use crate::inputs::file::FileInput;

pub struct FileWatcher {
    cfg: InputConfig,
    libdir: PathBuf,
    known: HashSet<PathBuf>,
    first_pass_done: bool,
}

impl FileWatcher {
    pub fn new(cfg: InputConfig, libdir: PathBuf) -> Self {
        Self {
            cfg,
            libdir,
            known: HashSet::new(),
            first_pass_done: false,
        }
    }

    pub fn config(&self) -> &InputConfig {
        &self.cfg
    }

    /// Re-glob the configured path and open tailers for new files.
    pub fn expand(&mut self) -> Vec<FileInput> {
        let Some(pattern) = self.cfg.path.clone() else {
            return Vec::new();
        };
        let start = if self.first_pass_done {
            StartPosition::Begin
        } else {
            self.cfg.parsed_start_position().unwrap_or_default()
        };
        self.first_pass_done = true;

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                error!("invalid glob pattern '{}': {}", pattern, e);
                return Vec::new();
            }
        };

        let mut opened = Vec::new();
        for path in paths.flatten() {
            if !path.is_file() || self.known.contains(&path) {
                continue;
            }
            match FileInput::open(&self.cfg, &path, start, &self.libdir) {
                Ok(input) => {
                    info!("tailing {} (start: {:?})", path.display(), start);
                    self.known.insert(path);
                    opened.push(input);
                }
                Err(e) => warn!("cannot tail {}: {}", path.display(), e),
            }
        }
        opened
    }

    /// Forget a destroyed input's path so a recreated file is rediscovered.
    pub fn forget(&mut self, path: &Path) {
        self.known.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cfg(pattern: &str) -> InputConfig {
        InputConfig {
            kind: "file".to_string(),
            event_type: Some("app".to_string()),
            path: Some(pattern.to_string()),
            start_position: "begin".to_string(),
            save_position: false,
            ..InputConfig::default()
        }
    }

    fn touch(path: &Path, content: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        write!(f, "{}", content).unwrap();
    }

    #[test]
    fn discovers_matching_files_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.log"), "x\n");
        touch(&dir.path().join("b.log"), "y\n");
        touch(&dir.path().join("c.txt"), "z\n");

        let pattern = dir.path().join("*.log").display().to_string();
        let mut watcher = FileWatcher::new(cfg(&pattern), dir.path().to_path_buf());

        assert_eq!(watcher.expand().len(), 2);
        assert!(watcher.expand().is_empty(), "already-known files are skipped");

        touch(&dir.path().join("d.log"), "w\n");
        assert_eq!(watcher.expand().len(), 1);
    }

    #[test]
    fn forget_allows_rediscovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        touch(&path, "x\n");

        let pattern = dir.path().join("*.log").display().to_string();
        let mut watcher = FileWatcher::new(cfg(&pattern), dir.path().to_path_buf());
        assert_eq!(watcher.expand().len(), 1);

        watcher.forget(&path);
        assert_eq!(watcher.expand().len(), 1);
    }

    #[test]
    fn literal_paths_work_like_globs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let mut watcher = FileWatcher::new(
            cfg(&path.display().to_string()),
            dir.path().to_path_buf(),
        );
        assert!(watcher.expand().is_empty(), "file does not exist yet");

        touch(&path, "x\n");
        assert_eq!(watcher.expand().len(), 1);
    }
}
