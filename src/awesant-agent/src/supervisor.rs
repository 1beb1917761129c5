// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Worker supervision: group inputs, spawn workers, respawn crashed ones,
//! drain on shutdown.
//!
//! Inputs without a `workers` setting share one implicit group running a
//! single worker; each input with `workers = N` forms its own group of N.
//! File-based inputs are pinned to one worker because the tailer state
//! (offset, inode) is per file. Lumberjack listeners are bound once per
//! input and shared by the workers of that input's group.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use awesant_core::DynResult;

use crate::config::{AgentConfig, InputConfig, OutputConfig};
use crate::inputs::lumberjack::{spawn_lumberjack_server, LumberjackInput, LumberjackServerHandle};
use crate::outputs::build_output;
use crate::pipeline::{InputDescriptor, OutputSlot, Worker, WorkerSettings};
use crate::watcher::FileWatcher;

/// Scan cadence for missing workers.
const SPAWN_SCAN: Duration = Duration::from_millis(500);
/// Minimum pause before a crashed worker is respawned.
const RESPAWN_DELAY: Duration = Duration::from_secs(1);
/// Soft-stop drain budget before survivors are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// One input assigned to a worker group.
enum GroupInput {
    /// Watcher-driven file tailing (plain or Oracle XML).
    File(InputConfig),
    /// A bound lumberjack listener, shared within the group.
    Lumberjack(InputConfig, LumberjackServerHandle),
}

struct WorkerGroup {
    name: String,
    workers: u32,
    inputs: Vec<GroupInput>,
}

pub struct Supervisor {
    settings: WorkerSettings,
    libdir: PathBuf,
    outputs: Vec<OutputConfig>,
    groups: Vec<WorkerGroup>,
}

/// One worker's supervision state: its running task, if any, and the
/// earliest instant a replacement may be spawned.
struct WorkerSlot {
    group: usize,
    index: u32,
    handle: Option<JoinHandle<()>>,
    not_before: Instant,
}

/// Partition inputs into groups: index `None` marks the shared implicit
/// group, `Some(i)` a dedicated group for input `i`.
fn group_assignment(inputs: &[InputConfig]) -> Vec<Option<usize>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| match input.workers.unwrap_or(0) {
            0 => None,
            _ => Some(i),
        })
        .collect()
}

impl Supervisor {
    /// Build groups from a validated config, binding network listeners.
    pub async fn from_config(cfg: &AgentConfig) -> DynResult<Self> {
        let settings = WorkerSettings {
            poll: cfg.agent.poll_interval(),
            lines: cfg.agent.lines,
            benchmark: cfg.agent.benchmark,
            hostname: cfg.agent.resolved_hostname(),
            log_watch_interval: Duration::from_secs(cfg.agent.log_watch_interval),
        };

        let mut implicit = WorkerGroup {
            name: "main".to_string(),
            workers: 1,
            inputs: Vec::new(),
        };
        let mut groups = Vec::new();

        let assignment = group_assignment(&cfg.inputs);
        for (input, slot) in cfg.inputs.iter().zip(assignment) {
            let group_input = match input.normalized_kind().as_str() {
                "lumberjack" => {
                    let handle = spawn_lumberjack_server(input).await?;
                    GroupInput::Lumberjack(input.clone(), handle)
                }
                _ => GroupInput::File(input.clone()),
            };
            match slot {
                None => implicit.inputs.push(group_input),
                Some(i) => {
                    let workers = match &group_input {
                        // Tailer state is per file; never share it.
                        GroupInput::File(_) => 1,
                        GroupInput::Lumberjack(cfg, _) => cfg.workers.unwrap_or(1).max(1),
                    };
                    groups.push(WorkerGroup {
                        name: format!("input{}", i + 1),
                        workers,
                        inputs: vec![group_input],
                    });
                }
            }
        }
        if !implicit.inputs.is_empty() {
            groups.insert(0, implicit);
        }

        Ok(Self {
            settings,
            libdir: PathBuf::from(&cfg.agent.libdir),
            outputs: cfg.outputs.clone(),
            groups,
        })
    }

    fn build_worker(&self, group: usize, index: u32) -> DynResult<Worker> {
        let group_spec = &self.groups[group];
        let id = format!("{}/{}", group_spec.name, index);

        let mut slots = Vec::new();
        for output in &self.outputs {
            slots.push(OutputSlot {
                types: output.route_types(),
                adapter: build_output(output)?,
            });
        }

        let mut worker = Worker::new(id, self.settings.clone(), slots);
        for input in &group_spec.inputs {
            match input {
                GroupInput::File(cfg) => {
                    worker.add_watcher(FileWatcher::new(cfg.clone(), self.libdir.clone()));
                }
                GroupInput::Lumberjack(cfg, handle) => {
                    worker.add_input(
                        InputDescriptor::from_config(cfg)?,
                        Box::new(LumberjackInput::new(handle.clone())),
                        None,
                    );
                }
            }
        }
        Ok(worker)
    }

    fn make_slots(&self) -> Vec<WorkerSlot> {
        let mut slots = Vec::new();
        for (g, group) in self.groups.iter().enumerate() {
            for index in 0..group.workers {
                slots.push(WorkerSlot {
                    group: g,
                    index,
                    handle: None,
                    not_before: Instant::now(),
                });
            }
        }
        slots
    }

    /// One supervision pass: reap exited workers and spawn missing ones.
    /// A reaped slot stays empty until `now + RESPAWN_DELAY`.
    fn poll_workers(
        &self,
        slots: &mut [WorkerSlot],
        now: Instant,
        shutdown: &watch::Receiver<bool>,
    ) {
        for slot in slots.iter_mut() {
            if slot
                .handle
                .as_ref()
                .is_some_and(JoinHandle::is_finished)
            {
                let name = &self.groups[slot.group].name;
                warn!(
                    "worker {}/{} exited unexpectedly, respawning in {:?}",
                    name, slot.index, RESPAWN_DELAY
                );
                slot.handle = None;
                slot.not_before = now + RESPAWN_DELAY;
            }
            if slot.handle.is_none() && now >= slot.not_before {
                match self.build_worker(slot.group, slot.index) {
                    Ok(worker) => {
                        slot.handle = Some(tokio::spawn(worker.run(shutdown.clone())));
                    }
                    Err(e) => {
                        let name = &self.groups[slot.group].name;
                        error!("worker {}/{} build failed: {}", name, slot.index, e);
                        slot.not_before = now + RESPAWN_DELAY;
                    }
                }
            }
        }
    }

    /// Run until the shutdown signal flips, then drain workers.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> DynResult<()> {
        let mut slots = self.make_slots();
        info!(
            "supervisor: {} worker(s) across {} group(s)",
            slots.len(),
            self.groups.len()
        );

        while !*shutdown.borrow() {
            self.poll_workers(&mut slots, Instant::now(), &shutdown);

            tokio::select! {
                _ = tokio::time::sleep(SPAWN_SCAN) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("supervisor: draining workers ({:?} grace)", SHUTDOWN_GRACE);
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for slot in &mut slots {
            let Some(mut handle) = slot.handle.take() else {
                continue;
            };
            let budget = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(budget, &mut handle).await.is_err() {
                warn!(
                    "worker {}/{} did not drain in time, aborting",
                    self.groups[slot.group].name, slot.index
                );
                handle.abort();
                let _ = handle.await;
            }
        }
        info!("supervisor: stopped");
        Ok(())
    }
}
