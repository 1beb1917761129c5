// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! File-tailing input: tailer + grouper + skip/grep filters.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{error, warn};

use awesant_multiline::Grouper;
use awesant_oraclexml::OracleXmlGrouper;
use awesant_tail::{PositionStore, StartPosition, TailRead, Tailer};

use crate::config::InputConfig;
use crate::inputs::{Input, RawRecord};

/// Grouping engine behind a file input.
pub enum LogGrouper {
    Multiline(Grouper),
    OracleXml(Box<OracleXmlGrouper>),
}

struct Grouped {
    text: String,
    fields: Vec<(String, Value)>,
    commit_offset: u64,
}

impl LogGrouper {
    fn push_line(&mut self, line: &str, end_offset: u64) -> Vec<Grouped> {
        match self {
            LogGrouper::Multiline(g) => g
                .push_line(line, end_offset)
                .into_iter()
                .map(|ev| Grouped {
                    text: ev.text,
                    fields: Vec::new(),
                    commit_offset: ev.commit_offset,
                })
                .collect(),
            LogGrouper::OracleXml(g) => g
                .push_line(line, end_offset)
                .into_iter()
                .map(oracle_grouped)
                .collect(),
        }
    }

    fn idle_flush(&mut self, now: Instant) -> Vec<Grouped> {
        match self {
            LogGrouper::Multiline(g) => g
                .idle_flush(now)
                .into_iter()
                .map(|ev| Grouped {
                    text: ev.text,
                    fields: Vec::new(),
                    commit_offset: ev.commit_offset,
                })
                .collect(),
            LogGrouper::OracleXml(g) => {
                g.idle_flush(now).into_iter().map(oracle_grouped).collect()
            }
        }
    }
}

fn oracle_grouped(ev: awesant_oraclexml::OracleEvent) -> Grouped {
    Grouped {
        text: ev.text,
        fields: ev
            .fields
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect(),
        commit_offset: ev.commit_offset,
    }
}

/// Tails one concrete file and groups its lines into logical events.
pub struct FileInput {
    path: String,
    tailer: Tailer,
    grouper: LogGrouper,
    skip: Vec<Regex>,
    grep: Vec<Regex>,
    pending_commit: Option<u64>,
    removed: bool,
}

impl FileInput {
    /// Open a tailer for `path` per the input configuration.
    /// `start` is passed by the watcher: the configured position on the
    /// first expansion, `begin` for files discovered later.
    pub fn open(
        cfg: &InputConfig,
        path: &Path,
        start: StartPosition,
        libdir: &Path,
    ) -> Result<Self, String> {
        let position = cfg
            .save_position
            .then(|| PositionStore::for_source(libdir, path));
        let tailer = Tailer::open(path, start, position)
            .map_err(|e| format!("open {}: {}", path.display(), e))?;

        let grouper = match cfg.normalized_kind().as_str() {
            "oraclexml" => LogGrouper::OracleXml(Box::new(OracleXmlGrouper::new())),
            _ => LogGrouper::Multiline(Grouper::new(cfg.multiline_config()?)),
        };

        Ok(Self {
            path: path.display().to_string(),
            tailer,
            grouper,
            skip: cfg.compiled_skip()?,
            grep: cfg.compiled_grep()?,
            pending_commit: None,
            removed: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn collect(&mut self, grouped: Vec<Grouped>, out: &mut Vec<RawRecord>) {
        for ev in grouped {
            let commit = self
                .pending_commit
                .map_or(ev.commit_offset, |c| c.max(ev.commit_offset));
            self.pending_commit = Some(commit);
            out.push(RawRecord {
                line: ev.text,
                fields: ev.fields,
                path: Some(self.path.clone()),
            });
        }
    }

    fn keep_line(&self, line: &str) -> bool {
        if self.skip.iter().any(|re| re.is_match(line)) {
            return false;
        }
        if !self.grep.is_empty() && !self.grep.iter().any(|re| re.is_match(line)) {
            return false;
        }
        true
    }
}

#[async_trait]
impl Input for FileInput {
    async fn pull(&mut self, max: usize) -> Option<Vec<RawRecord>> {
        if self.removed {
            return None;
        }

        let mut out = Vec::new();
        while out.len() < max {
            match self.tailer.read_line() {
                Ok(TailRead::Line(text)) => {
                    if !self.keep_line(&text) {
                        continue;
                    }
                    let grouped = self.grouper.push_line(&text, self.tailer.tell());
                    self.collect(grouped, &mut out);
                }
                Ok(TailRead::Eof) => break,
                Ok(TailRead::Removed) => {
                    self.removed = true;
                    break;
                }
                Err(e) => {
                    error!("{}: read failed: {}", self.path, e);
                    return None;
                }
            }
        }

        if out.is_empty() {
            let flushed = self.grouper.idle_flush(Instant::now());
            self.collect(flushed, &mut out);
        }

        if out.is_empty() && self.removed {
            return None;
        }
        Some(out)
    }

    fn commit(&mut self) {
        if let Some(offset) = self.pending_commit.take() {
            if let Err(e) = self.tailer.commit(offset) {
                warn!("{}: position commit failed: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OneOrMany;
    use std::io::Write;

    fn file_cfg() -> InputConfig {
        InputConfig {
            kind: "file".to_string(),
            event_type: Some("app".to_string()),
            ..InputConfig::default()
        }
    }

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    #[tokio::test]
    async fn pulls_single_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["L1", "L2", "L3"]);

        let mut input =
            FileInput::open(&file_cfg(), &path, StartPosition::Begin, dir.path()).unwrap();
        let records = input.pull(100).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.line.as_str()).collect::<Vec<_>>(),
            vec!["L1", "L2", "L3"]
        );
        assert_eq!(records[0].path.as_deref(), Some(path.to_str().unwrap()));
    }

    #[tokio::test]
    async fn commit_writes_position_after_shipping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["L1", "L2", "L3"]);

        let mut input =
            FileInput::open(&file_cfg(), &path, StartPosition::Begin, dir.path()).unwrap();
        input.pull(100).await.unwrap();
        input.commit();

        let store = PositionStore::for_source(dir.path(), &path);
        assert_eq!(store.load().unwrap().offset, 9);
    }

    #[tokio::test]
    async fn position_is_not_committed_before_shipping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["L1"]);

        let mut input =
            FileInput::open(&file_cfg(), &path, StartPosition::Begin, dir.path()).unwrap();
        input.pull(100).await.unwrap();

        let store = PositionStore::for_source(dir.path(), &path);
        assert_eq!(store.load().map(|p| p.offset), None);
    }

    #[tokio::test]
    async fn skip_and_grep_filter_before_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["keep 1", "drop noisy", "keep 2", "other"]);

        let cfg = InputConfig {
            skip: OneOrMany::One("noisy".to_string()),
            grep: OneOrMany::One("^keep".to_string()),
            ..file_cfg()
        };
        let mut input = FileInput::open(&cfg, &path, StartPosition::Begin, dir.path()).unwrap();
        let records = input.pull(100).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.line.as_str()).collect::<Vec<_>>(),
            vec!["keep 1", "keep 2"]
        );
    }

    #[tokio::test]
    async fn max_lines_bounds_one_pull() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["1", "2", "3", "4", "5"]);

        let mut input =
            FileInput::open(&file_cfg(), &path, StartPosition::Begin, dir.path()).unwrap();
        assert_eq!(input.pull(2).await.unwrap().len(), 2);
        assert_eq!(input.pull(100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn removed_file_turns_fatal_after_draining() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        write_lines(&path, &["tail"]);

        let mut input =
            FileInput::open(&file_cfg(), &path, StartPosition::Begin, dir.path()).unwrap();
        assert_eq!(input.pull(100).await.unwrap().len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(input.pull(100).await.is_none());
    }

    #[tokio::test]
    async fn oraclexml_kind_yields_ora_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert.xml");
        write_lines(
            &path,
            &["<msg time='t1' level='16'>", " <txt>ORA-00600</txt>", "</msg>"],
        );

        let cfg = InputConfig {
            kind: "oraclexml".to_string(),
            ..file_cfg()
        };
        let mut input = FileInput::open(&cfg, &path, StartPosition::Begin, dir.path()).unwrap();
        let records = input.pull(100).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, "ORA-00600");
        assert!(records[0]
            .fields
            .contains(&("ora.level".to_string(), Value::from("16"))));
    }
}
