// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The per-worker event pipeline: pull → enrich → dispatch, with an
//! in-memory stash for events whose push failed.
//!
//! Each worker owns its inputs and outputs and runs single-threadedly.
//! While `failed[type]` is non-empty, pulls for that type are suppressed
//! and the stash is drained in order first; this bounds memory and stops
//! consuming input while the downstream is unavailable. The tailer's
//! committed offset advances only once every event of a pull has been
//! delivered (stashed events commit when the stash drains).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use awesant_core::{AddFieldRule, Event, TimestampCache};

use crate::config::{Format, InputConfig};
use crate::inputs::{Input, RawRecord};
use crate::outputs::Output;
use crate::watcher::FileWatcher;

/// Throughput counters are reported at this interval when benchmarking
/// is enabled.
const BENCH_REPORT_EVERY: Duration = Duration::from_secs(10);

/// Per-worker settings distilled from `[agent]`.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll: Duration,
    pub lines: usize,
    pub benchmark: bool,
    pub hostname: String,
    pub log_watch_interval: Duration,
}

/// Enrichment settings of one input.
pub struct InputDescriptor {
    pub event_type: Option<String>,
    pub format: Format,
    pub tags: Vec<String>,
    pub add_field: Vec<(String, Value)>,
    pub rules: Vec<AddFieldRule>,
    /// Used for the `file` field when a record carries no path
    /// (network inputs).
    pub source_label: String,
}

impl InputDescriptor {
    pub fn from_config(cfg: &InputConfig) -> Result<Self, String> {
        let rules = cfg
            .add_field_rules
            .iter()
            .map(|r| r.compile())
            .collect::<Result<Vec<_>, _>>()?;
        let source_label = cfg
            .path
            .clone()
            .unwrap_or_else(|| cfg.binding_label());
        Ok(Self {
            event_type: cfg.event_type.clone(),
            format: cfg.format,
            tags: cfg.tags.to_vec(),
            add_field: cfg
                .add_field
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect(),
            rules,
            source_label,
        })
    }
}

/// One input plus its runtime state.
pub struct WorkerInput {
    pub descriptor: InputDescriptor,
    pub input: Box<dyn Input>,
    pub next_poll: Instant,
    pub remove: bool,
    /// Concrete file path, for watcher bookkeeping.
    pub path: Option<PathBuf>,
}

/// One output plus its routing keys.
pub struct OutputSlot {
    pub types: Vec<String>,
    pub adapter: Box<dyn Output>,
}

impl OutputSlot {
    fn serves(&self, event_type: &str) -> bool {
        self.types
            .iter()
            .any(|t| t == "*" || t == event_type)
    }
}

struct StashEntry {
    output: usize,
    events: VecDeque<Event>,
}

/// A single pipeline worker.
pub struct Worker {
    id: String,
    settings: WorkerSettings,
    inputs: Vec<WorkerInput>,
    outputs: Vec<OutputSlot>,
    failed: HashMap<String, VecDeque<StashEntry>>,
    timestamps: TimestampCache,
    watchers: Vec<FileWatcher>,
    next_watch: Instant,
    bench_count: u64,
    bench_since: Instant,
}

impl Worker {
    pub fn new(id: impl Into<String>, settings: WorkerSettings, outputs: Vec<OutputSlot>) -> Self {
        Self {
            id: id.into(),
            settings,
            inputs: Vec::new(),
            outputs,
            failed: HashMap::new(),
            timestamps: TimestampCache::new(),
            watchers: Vec::new(),
            next_watch: Instant::now(),
            bench_count: 0,
            bench_since: Instant::now(),
        }
    }

    pub fn add_input(
        &mut self,
        descriptor: InputDescriptor,
        input: Box<dyn Input>,
        path: Option<PathBuf>,
    ) {
        self.inputs.push(WorkerInput {
            descriptor,
            input,
            next_poll: Instant::now(),
            remove: false,
            path,
        });
    }

    pub fn add_watcher(&mut self, watcher: FileWatcher) {
        self.watchers.push(watcher);
    }

    /// True when any stash entry is pending.
    pub fn has_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Run until the shutdown signal flips. The current pass is completed
    /// before exiting (soft stop).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("worker {} started", self.id);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = Instant::now();
            self.tick().await;

            let nap = self.settings.poll.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("worker {} stopped", self.id);
    }

    /// One pipeline pass.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        if !self.watchers.is_empty() && now >= self.next_watch {
            self.rotate_watchers();
            self.next_watch = now + self.settings.log_watch_interval;
        }

        self.reap_inputs();

        for idx in 0..self.inputs.len() {
            if self.inputs[idx].remove || Instant::now() < self.inputs[idx].next_poll {
                continue;
            }

            let itype = self.inputs[idx].descriptor.event_type.clone();

            // With failures pending, events without a certain routing key
            // cannot be stashed deterministically; skip such inputs.
            if !self.failed.is_empty() && itype.is_none() {
                continue;
            }
            if let Some(t) = &itype {
                if self.failed.contains_key(t.as_str()) {
                    self.drain_stash(t.clone()).await;
                    if self.failed.contains_key(t.as_str()) {
                        continue;
                    }
                    // Offsets held back while the stash was pending are
                    // safe to persist now.
                    self.inputs[idx].input.commit();
                }
            }

            match self.inputs[idx].input.pull(self.settings.lines).await {
                None => {
                    warn!("worker {}: input fatal, destroying it", self.id);
                    self.inputs[idx].remove = true;
                }
                Some(records) if records.is_empty() => {
                    self.inputs[idx].next_poll = Instant::now() + self.settings.poll;
                }
                Some(records) => {
                    let events = self.enrich(idx, records);
                    self.bench_count += events.len() as u64;
                    let all_delivered = self.dispatch(itype.as_deref(), events).await;
                    if all_delivered {
                        self.inputs[idx].input.commit();
                    }
                }
            }
        }

        self.maybe_report_benchmark();
    }

    fn rotate_watchers(&mut self) {
        let mut new_inputs = Vec::new();
        for watcher in &mut self.watchers {
            let opened = watcher.expand();
            if opened.is_empty() {
                continue;
            }
            let descriptor_cfg = watcher.config().clone();
            for input in opened {
                match InputDescriptor::from_config(&descriptor_cfg) {
                    Ok(descriptor) => {
                        let path = PathBuf::from(input.path());
                        new_inputs.push((descriptor, input, path));
                    }
                    Err(e) => error!("worker {}: input descriptor: {}", self.id, e),
                }
            }
        }
        for (descriptor, input, path) in new_inputs {
            self.add_input(descriptor, Box::new(input), Some(path));
        }
    }

    fn reap_inputs(&mut self) {
        let mut removed = Vec::new();
        self.inputs.retain(|input| {
            if input.remove {
                if let Some(path) = &input.path {
                    removed.push(path.clone());
                }
                false
            } else {
                true
            }
        });
        for path in removed {
            info!("worker {}: dropped input {}", self.id, path.display());
            for watcher in &mut self.watchers {
                watcher.forget(&path);
            }
        }
    }

    fn enrich(&mut self, idx: usize, records: Vec<RawRecord>) -> Vec<Event> {
        let descriptor = &self.inputs[idx].descriptor;
        let timestamps = &mut self.timestamps;
        let hostname = &self.settings.hostname;

        let mut events = Vec::with_capacity(records.len());
        for record in records {
            let fields_have_tags = record.fields.iter().any(|(k, _)| k == "tags");

            let mut event = match descriptor.format {
                Format::Json => {
                    match serde_json::from_str::<Map<String, Value>>(&record.line) {
                        Ok(map) => {
                            Event::from_json_object(map, descriptor.event_type.as_deref())
                        }
                        Err(e) => {
                            error!(
                                "dropping malformed JSON line from {}: {}",
                                descriptor.source_label, e
                            );
                            continue;
                        }
                    }
                }
                Format::Plain => {
                    let path = record.path.as_deref().unwrap_or(&descriptor.source_label);
                    Event::plain(
                        &timestamps.now(),
                        hostname,
                        path,
                        descriptor.event_type.as_deref().unwrap_or(""),
                        &descriptor.tags,
                        record.line,
                    )
                }
            };

            for (key, value) in record.fields {
                event.insert(key, value);
            }
            // Plain events already carry the configured tags unless the
            // input's structured fields replaced the array.
            if descriptor.format == Format::Json || fields_have_tags {
                event.extend_tags(&descriptor.tags);
            }
            event.merge_fields(descriptor.add_field.iter().map(|(k, v)| (k, v)));
            for rule in &descriptor.rules {
                rule.apply(&mut event);
            }
            events.push(event);
        }
        events
    }

    /// Ship one pull's worth of events. Returns true when every event was
    /// delivered; false when at least one landed in the stash.
    async fn dispatch(&mut self, input_type: Option<&str>, events: Vec<Event>) -> bool {
        let mut groups: Vec<(String, Vec<Event>)> = Vec::new();
        for event in events {
            let etype = event.event_type().unwrap_or("").to_string();
            match groups.iter_mut().find(|(t, _)| *t == etype) {
                Some((_, group)) => group.push(event),
                None => groups.push((etype, vec![event])),
            }
        }

        let mut all_delivered = true;
        for (etype, group) in groups {
            let stash_key = input_type.unwrap_or(&etype).to_string();
            let targets: Vec<usize> = self
                .outputs
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.serves(&etype))
                .map(|(i, _)| i)
                .collect();
            if targets.is_empty() {
                debug!("no output bound to type '{}', {} events dropped", etype, group.len());
                continue;
            }

            for oidx in targets {
                // New events queue behind an existing stash entry so the
                // per-output order is preserved.
                if let Some(entries) = self.failed.get_mut(&stash_key) {
                    if let Some(entry) = entries.iter_mut().find(|e| e.output == oidx) {
                        entry.events.extend(group.iter().cloned());
                        all_delivered = false;
                        continue;
                    }
                }

                if let Err(done) = self.push_events(oidx, &group).await {
                    let name = self.outputs[oidx].adapter.name();
                    let pending: VecDeque<Event> = group[done..].iter().cloned().collect();
                    error!(
                        "worker {}: {} failed, stashing {} events of type '{}'",
                        self.id,
                        name,
                        pending.len(),
                        stash_key
                    );
                    self.failed
                        .entry(stash_key.clone())
                        .or_default()
                        .push_back(StashEntry {
                            output: oidx,
                            events: pending,
                        });
                    all_delivered = false;
                }
            }
        }
        all_delivered
    }

    /// Push `events` to one output, batched when it supports batching.
    /// On failure returns the count of events already delivered.
    async fn push_events(&mut self, oidx: usize, events: &[Event]) -> Result<(), usize> {
        let adapter = &mut self.outputs[oidx].adapter;
        let window = adapter.max_window_size();
        let mut done = 0;

        if window > 0 {
            for chunk in events.chunks(window) {
                if let Err(e) = adapter.push_batch(chunk).await {
                    warn!("{}: batch push failed: {}", adapter.name(), e);
                    return Err(done);
                }
                done += chunk.len();
            }
        } else {
            for event in events {
                if let Err(e) = adapter.push_line(&event.to_json()).await {
                    warn!("{}: push failed: {}", adapter.name(), e);
                    return Err(done);
                }
                done += 1;
            }
        }
        Ok(())
    }

    /// Retry stash entries for `key` in order. Entries that drain
    /// completely are removed; the first failure stops the drain.
    async fn drain_stash(&mut self, key: String) {
        let Some(mut entries) = self.failed.remove(&key) else {
            return;
        };

        while let Some(mut entry) = entries.pop_front() {
            let events: Vec<Event> = entry.events.iter().cloned().collect();
            match self.push_events(entry.output, &events).await {
                Ok(()) => continue,
                Err(done) => {
                    entry.events.drain(..done);
                    entries.push_front(entry);
                    self.failed.insert(key, entries);
                    return;
                }
            }
        }
        info!("worker {}: stash for type '{}' drained", self.id, key);
    }

    fn maybe_report_benchmark(&mut self) {
        if !self.settings.benchmark {
            return;
        }
        let elapsed = self.bench_since.elapsed();
        if elapsed < BENCH_REPORT_EVERY {
            return;
        }
        let rate = self.bench_count as f64 / elapsed.as_secs_f64();
        info!("worker {}: {:.1} events/s over the last {:?}", self.id, rate, elapsed);
        self.bench_count = 0;
        self.bench_since = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AddFieldRuleConfig, OneOrMany};
    use crate::inputs::file::FileInput;
    use async_trait::async_trait;
    use awesant_core::{ShipError, ShipResult};
    use awesant_tail::{PositionStore, StartPosition};
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn settings() -> WorkerSettings {
        WorkerSettings {
            poll: Duration::from_millis(500),
            lines: 100,
            benchmark: false,
            hostname: "testhost".to_string(),
            log_watch_interval: Duration::from_secs(10),
        }
    }

    /// Output double: records pushed lines, optionally failing on demand.
    #[derive(Clone)]
    struct ScriptedOutput {
        label: String,
        window: usize,
        failing: Arc<AtomicBool>,
        lines: Arc<Mutex<Vec<String>>>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl ScriptedOutput {
        fn new(label: &str, window: usize) -> Self {
            Self {
                label: label.to_string(),
                window,
                failing: Arc::new(AtomicBool::new(false)),
                lines: Arc::new(Mutex::new(Vec::new())),
                batch_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn pushed_lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        fn pushed_payloads(&self) -> Vec<String> {
            self.pushed_lines()
                .iter()
                .map(|l| {
                    serde_json::from_str::<Value>(l).unwrap()["line"]
                        .as_str()
                        .unwrap()
                        .to_string()
                })
                .collect()
        }
    }

    #[async_trait]
    impl Output for ScriptedOutput {
        fn name(&self) -> String {
            self.label.clone()
        }

        fn max_window_size(&self) -> usize {
            self.window
        }

        async fn push_line(&mut self, line: &str) -> ShipResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ShipError::communication("scripted failure"));
            }
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn push_batch(&mut self, events: &[Event]) -> ShipResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ShipError::communication("scripted failure"));
            }
            self.batch_sizes.lock().unwrap().push(events.len());
            let mut lines = self.lines.lock().unwrap();
            for event in events {
                lines.push(event.to_json());
            }
            Ok(())
        }
    }

    fn file_cfg(path: &std::path::Path) -> InputConfig {
        InputConfig {
            kind: "file".to_string(),
            event_type: Some("app".to_string()),
            path: Some(path.display().to_string()),
            start_position: "begin".to_string(),
            ..InputConfig::default()
        }
    }

    fn append(path: &std::path::Path, lines: &[&str]) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    fn worker_with_file(
        dir: &std::path::Path,
        log: &std::path::Path,
        outputs: Vec<(ScriptedOutput, &str)>,
    ) -> Worker {
        let slots = outputs
            .into_iter()
            .map(|(out, types)| OutputSlot {
                types: types.split(',').map(str::to_string).collect(),
                adapter: Box::new(out) as Box<dyn Output>,
            })
            .collect();
        let mut worker = Worker::new("w0", settings(), slots);
        let cfg = file_cfg(log);
        let input = FileInput::open(&cfg, log, StartPosition::Begin, dir).unwrap();
        let descriptor = InputDescriptor::from_config(&cfg).unwrap();
        worker.add_input(descriptor, Box::new(input), Some(log.to_path_buf()));
        worker
    }

    #[tokio::test]
    async fn plain_events_reach_the_matching_output_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["L1", "L2", "L3"]);

        let out = ScriptedOutput::new("screen", 0);
        let mut worker = worker_with_file(dir.path(), &log, vec![(out.clone(), "app")]);
        worker.tick().await;

        assert_eq!(out.pushed_payloads(), vec!["L1", "L2", "L3"]);
        let first: Value = serde_json::from_str(&out.pushed_lines()[0]).unwrap();
        assert_eq!(first["@version"], "1");
        assert_eq!(first["host"], "testhost");
        assert_eq!(first["type"], "app");
        assert_eq!(
            first["source"],
            format!("file://testhost{}", log.display())
        );

        // Position advances to the end of L3 once shipped.
        let store = PositionStore::for_source(dir.path(), &log);
        assert_eq!(store.load().unwrap().offset, 9);
    }

    #[tokio::test]
    async fn wildcard_outputs_receive_every_type() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["x"]);

        let typed = ScriptedOutput::new("typed", 0);
        let star = ScriptedOutput::new("star", 0);
        let other = ScriptedOutput::new("other", 0);
        let mut worker = worker_with_file(
            dir.path(),
            &log,
            vec![
                (typed.clone(), "app"),
                (star.clone(), "*"),
                (other.clone(), "web"),
            ],
        );
        worker.tick().await;

        assert_eq!(typed.pushed_payloads(), vec!["x"]);
        assert_eq!(star.pushed_payloads(), vec!["x"]);
        assert!(other.pushed_lines().is_empty());
    }

    #[tokio::test]
    async fn batch_outputs_receive_window_sized_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["1", "2", "3", "4", "5"]);

        let out = ScriptedOutput::new("batcher", 2);
        let mut worker = worker_with_file(dir.path(), &log, vec![(out.clone(), "app")]);
        worker.tick().await;

        assert_eq!(out.pushed_payloads().len(), 5);
        assert_eq!(*out.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn stash_on_failure_then_drain_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["E1", "E2"]);

        let out = ScriptedOutput::new("flaky", 0);
        let mut worker = worker_with_file(dir.path(), &log, vec![(out.clone(), "app")]);

        worker.tick().await;
        assert_eq!(out.pushed_payloads(), vec!["E1", "E2"]);

        // Downstream goes away; the next pull is stashed.
        out.failing.store(true, Ordering::SeqCst);
        append(&log, &["E3", "E4"]);
        worker.tick().await;
        assert!(worker.has_failed());
        assert_eq!(out.pushed_payloads(), vec!["E1", "E2"]);

        // While stashed, new lines are not pulled for this type.
        append(&log, &["E5"]);
        worker.tick().await;
        assert_eq!(out.pushed_payloads(), vec!["E1", "E2"]);

        // The committed offset stays at E2 until the stash clears.
        let store = PositionStore::for_source(dir.path(), &log);
        assert_eq!(store.load().unwrap().offset, 6);

        // Downstream recovers: stash drains in order, then pulls resume.
        out.failing.store(false, Ordering::SeqCst);
        worker.tick().await;
        assert!(!worker.has_failed());
        assert_eq!(out.pushed_payloads(), vec!["E1", "E2", "E3", "E4", "E5"]);
        assert_eq!(store.load().unwrap().offset, 15);
    }

    #[tokio::test]
    async fn partial_batch_failure_keeps_the_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["A", "B", "C"]);

        // Window 1 so each event is its own batch; fail after the first.
        struct FailAfterFirst {
            inner: ScriptedOutput,
            pushed: usize,
        }

        #[async_trait]
        impl Output for FailAfterFirst {
            fn name(&self) -> String {
                "fail-after-first".to_string()
            }
            fn max_window_size(&self) -> usize {
                1
            }
            async fn push_line(&mut self, line: &str) -> ShipResult<()> {
                self.inner.push_line(line).await
            }
            async fn push_batch(&mut self, events: &[Event]) -> ShipResult<()> {
                if self.pushed >= 1 {
                    return Err(ShipError::communication("down"));
                }
                self.pushed += events.len();
                self.inner.push_batch(events).await
            }
        }

        let probe = ScriptedOutput::new("probe", 1);
        let out = FailAfterFirst {
            inner: probe.clone(),
            pushed: 0,
        };

        let mut worker = Worker::new(
            "w0",
            settings(),
            vec![OutputSlot {
                types: vec!["app".to_string()],
                adapter: Box::new(out),
            }],
        );
        let cfg = file_cfg(&log);
        let input = FileInput::open(&cfg, &log, StartPosition::Begin, dir.path()).unwrap();
        worker.add_input(
            InputDescriptor::from_config(&cfg).unwrap(),
            Box::new(input),
            Some(log.clone()),
        );

        worker.tick().await;
        // A delivered, B and C stashed.
        assert_eq!(probe.pushed_payloads(), vec!["A"]);
        assert!(worker.has_failed());
        let entries = worker.failed.get("app").unwrap();
        assert_eq!(entries[0].events.len(), 2);
    }

    #[tokio::test]
    async fn add_field_and_rules_enrich_events() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(&log, &["[ERROR] boom"]);

        let out = ScriptedOutput::new("screen", 0);
        let slots = vec![OutputSlot {
            types: vec!["*".to_string()],
            adapter: Box::new(out.clone()) as Box<dyn Output>,
        }];
        let mut worker = Worker::new("w0", settings(), slots);

        let mut cfg = file_cfg(&log);
        cfg.tags = OneOrMany::Many(vec!["prod".to_string()]);
        cfg.add_field.insert("dc".to_string(), "fra1".to_string());
        cfg.add_field_rules.push(AddFieldRuleConfig {
            key: "level".to_string(),
            field: "line".to_string(),
            matcher: r"^\[(\w+)\]".to_string(),
            template: "$1".to_string(),
            default: None,
        });
        let input = FileInput::open(&cfg, &log, StartPosition::Begin, dir.path()).unwrap();
        worker.add_input(
            InputDescriptor::from_config(&cfg).unwrap(),
            Box::new(input),
            Some(log.clone()),
        );

        worker.tick().await;
        let event: Value = serde_json::from_str(&out.pushed_lines()[0]).unwrap();
        assert_eq!(event["dc"], "fra1");
        assert_eq!(event["level"], "ERROR");
        assert_eq!(event["tags"], serde_json::json!(["prod"]));
    }

    #[tokio::test]
    async fn json_format_overrides_the_declared_type() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("app.log");
        append(
            &log,
            &[
                r#"{"type":"web","line":"hello"}"#,
                r#"{"line":"fallback"}"#,
                "not json at all",
            ],
        );

        let web = ScriptedOutput::new("web", 0);
        let app = ScriptedOutput::new("app", 0);
        let mut cfg = file_cfg(&log);
        cfg.format = Format::Json;

        let mut worker = Worker::new(
            "w0",
            settings(),
            vec![
                OutputSlot {
                    types: vec!["web".to_string()],
                    adapter: Box::new(web.clone()),
                },
                OutputSlot {
                    types: vec!["app".to_string()],
                    adapter: Box::new(app.clone()),
                },
            ],
        );
        let input = FileInput::open(&cfg, &log, StartPosition::Begin, dir.path()).unwrap();
        worker.add_input(
            InputDescriptor::from_config(&cfg).unwrap(),
            Box::new(input),
            Some(log.clone()),
        );

        worker.tick().await;
        assert_eq!(web.pushed_payloads(), vec!["hello"]);
        // The malformed line is logged and dropped, not stashed.
        assert_eq!(app.pushed_payloads(), vec!["fallback"]);
        assert!(!worker.has_failed());
    }

    #[tokio::test]
    async fn typeless_inputs_are_skipped_while_failures_pend() {
        let dir = tempfile::tempdir().unwrap();
        let typed_log = dir.path().join("typed.log");
        let untyped_log = dir.path().join("untyped.log");
        append(&typed_log, &["T1"]);
        append(&untyped_log, &[r#"{"type":"web","line":"U1"}"#]);

        let out = ScriptedOutput::new("sink", 0);
        out.failing.store(true, Ordering::SeqCst);

        let mut worker = Worker::new(
            "w0",
            settings(),
            vec![OutputSlot {
                types: vec!["*".to_string()],
                adapter: Box::new(out.clone()),
            }],
        );

        let typed_cfg = file_cfg(&typed_log);
        let input = FileInput::open(&typed_cfg, &typed_log, StartPosition::Begin, dir.path())
            .unwrap();
        worker.add_input(
            InputDescriptor::from_config(&typed_cfg).unwrap(),
            Box::new(input),
            Some(typed_log.clone()),
        );

        let mut untyped_cfg = file_cfg(&untyped_log);
        untyped_cfg.event_type = None;
        untyped_cfg.format = Format::Json;
        let input =
            FileInput::open(&untyped_cfg, &untyped_log, StartPosition::Begin, dir.path())
                .unwrap();
        worker.add_input(
            InputDescriptor::from_config(&untyped_cfg).unwrap(),
            Box::new(input),
            Some(untyped_log.clone()),
        );

        worker.tick().await;
        assert!(worker.has_failed());

        // The typeless input must not be pulled while the stash pends.
        worker.tick().await;
        out.failing.store(false, Ordering::SeqCst);
        worker.tick().await;
        worker.tick().await;

        let payloads = out.pushed_payloads();
        assert!(payloads.contains(&"T1".to_string()));
        assert!(payloads.contains(&"U1".to_string()));
        // T1 was stashed first and must come out first.
        assert_eq!(payloads[0], "T1");
    }
}
