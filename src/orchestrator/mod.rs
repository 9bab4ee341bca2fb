//! Build orchestration: the controller state machine and its run loop.
//!
//! `BuildController` owns one build job end to end. Control requests
//! (pause, resume, stop, recovery) are validated against the state table in
//! [`state`], then signalled to the run task over a `watch` channel. The
//! loop observes the flags at yield points between placement steps, so a
//! pause parks the task on `changed()` with no polling, a stop winds down
//! after a final checkpoint save, and a recovery abandons the in-flight
//! cell and replays from the last durable checkpoint.

pub mod checkpoint;
pub mod events;
pub(crate) mod executor;
pub mod metrics;
pub mod state;

use crate::actuator::WorldActuator;
use crate::config::BotConfig;
use crate::error::{BuildError, Result};
use crate::inventory::InventoryTracker;
use crate::models::{Checkpoint, LogLevel};
use crate::planner::{layer_height, layer_tasks, BUILD_CEILING};
use crate::refill::RefillCoordinator;
use checkpoint::CheckpointStore;
use events::{BuildEvent, BuildStatus, EventBus};
use executor::{CellError, CellExecutor, CellOutcome, StepError};
use metrics::BuildMetrics;
use state::{ControllerState, RunOutcome};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Control intent shared with the run task over the watch channel.
#[derive(Debug, Clone, Default)]
struct ControlFlags {
    paused: bool,
    pause_reason: Option<String>,
    stop: bool,
    recover: bool,
}

/// Why the run loop is being interrupted at a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Stop,
    Recover,
}

/// Read-only view of the control flags for code deep in the placement path.
#[derive(Clone)]
pub(crate) struct ControlProbe {
    rx: watch::Receiver<ControlFlags>,
}

impl ControlProbe {
    pub(crate) fn interrupt(&self) -> Option<Interrupt> {
        let flags = self.rx.borrow();
        if flags.stop {
            Some(Interrupt::Stop)
        } else if flags.recover {
            Some(Interrupt::Recover)
        } else {
            None
        }
    }
}

/// Position of the run within the job, for the status surface.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// 1-based layer currently being built; 0 before the first.
    layer: u32,
    cell: u32,
    cells_total: u32,
}

/// How one pass of the run loop ended.
enum LoopEnd {
    Completed,
    /// Stop observed; the resume pointer to persist.
    Stopped { layer: u32, cell: u32 },
    /// Recovery observed; reload the checkpoint and go again.
    Recovered,
}

struct Shared {
    actuator: Arc<dyn WorldActuator>,
    cfg: Arc<BotConfig>,
    events: EventBus,
    control: watch::Sender<ControlFlags>,
    state: Mutex<ControllerState>,
    progress: Mutex<Progress>,
    metrics: Mutex<BuildMetrics>,
    inventory: Arc<InventoryTracker>,
    placement_in_flight: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<RunOutcome>>>,
}

/// Owner of a build job. Cheap to clone; all clones control the same job.
#[derive(Clone)]
pub struct BuildController {
    inner: Arc<Shared>,
}

impl BuildController {
    pub fn new(actuator: Arc<dyn WorldActuator>, cfg: BotConfig) -> Self {
        let (control, _) = watch::channel(ControlFlags::default());
        let cfg = Arc::new(cfg.validated());
        let inventory = Arc::new(InventoryTracker::new(actuator.clone(), cfg.clone()));
        BuildController {
            inner: Arc::new(Shared {
                actuator,
                cfg,
                events: EventBus::new(),
                control,
                state: Mutex::new(ControllerState::Idle),
                progress: Mutex::new(Progress::default()),
                metrics: Mutex::new(BuildMetrics::new()),
                inventory,
                placement_in_flight: Arc::new(AtomicBool::new(false)),
                handle: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.cfg
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state.lock().unwrap()
    }

    /// Subscribe to status and log events; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> BuildStatus {
        self.inner.status_snapshot()
    }

    /// Begin a run from the durable checkpoint. Starting while a run is
    /// already active succeeds trivially without spawning a second task.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.is_active() {
                return Ok(());
            }
            *state = ControllerState::Running;
        }

        self.inner.control.send_replace(ControlFlags::default());
        *self.inner.progress.lock().unwrap() = Progress {
            layer: 0,
            cell: 0,
            cells_total: self.inner.cfg.cells_per_layer(),
        };

        self.inner
            .events
            .emit(BuildEvent::State(self.inner.status_snapshot()));
        let task = tokio::spawn({
            let shared = self.inner.clone();
            async move { shared.run().await }
        });
        *self.inner.handle.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Park the run at its next yield point. True iff the request applied.
    pub fn pause(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if !self.inner.transition(ControllerState::Paused) {
            return false;
        }
        self.inner.control.send_modify(|flags| {
            flags.paused = true;
            flags.pause_reason = Some(reason.clone());
        });
        self.inner
            .events
            .emit_log(LogLevel::Info, format!("Build paused: {}", reason));
        true
    }

    /// Wake a paused run. True iff the request applied.
    pub fn resume(&self) -> bool {
        // Idle -> Running is a valid table edge, but it belongs to start.
        if self.state() != ControllerState::Paused {
            return false;
        }
        if !self.inner.transition(ControllerState::Running) {
            return false;
        }
        self.inner.control.send_modify(|flags| {
            flags.paused = false;
            flags.pause_reason = None;
        });
        self.inner.events.emit_log(LogLevel::Info, "Build resumed");
        true
    }

    /// Request a cooperative stop. The run saves a final checkpoint and
    /// settles to idle. Stopping an already-stopping run succeeds
    /// trivially; stopping an idle controller is rejected.
    pub fn stop(&self) -> bool {
        if self.state() == ControllerState::Stopping {
            return true;
        }
        if !self.inner.transition(ControllerState::Stopping) {
            return false;
        }
        self.inner.control.send_modify(|flags| {
            flags.stop = true;
            flags.paused = false;
        });
        self.inner.events.emit_log(LogLevel::Info, "Stop requested");
        true
    }

    /// Abandon the in-flight cell and replay from the last durable
    /// checkpoint. For externally detected faults (respawn, reconnect).
    pub fn request_recovery(&self, reason: impl Into<String>) -> bool {
        if !self.inner.transition(ControllerState::Recovering) {
            return false;
        }
        self.inner.control.send_modify(|flags| {
            flags.recover = true;
            flags.paused = false;
            flags.pause_reason = None;
        });
        self.inner.events.emit_log(
            LogLevel::Warn,
            format!("Recovery requested: {}", reason.into()),
        );
        true
    }

    /// Wait for the current run task to settle and return its outcome.
    pub async fn join(&self) -> Option<RunOutcome> {
        let task = self.inner.handle.lock().unwrap().take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(_) => Some(RunOutcome::Error),
        }
    }
}

impl Shared {
    /// Validated state transition. Emits a state event when it applies.
    fn transition(&self, next: ControllerState) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.can_transition_to(next) {
                return false;
            }
            *state = next;
        }
        self.events.emit(BuildEvent::State(self.status_snapshot()));
        true
    }

    fn status_snapshot(&self) -> BuildStatus {
        let state = *self.state.lock().unwrap();
        let progress = *self.progress.lock().unwrap();
        let flags = self.control.borrow().clone();
        let metrics = self.metrics.lock().unwrap().snapshot();

        let status = match state {
            ControllerState::Idle => "idle".to_string(),
            ControllerState::Paused => match &flags.pause_reason {
                Some(reason) => format!("paused: {}", reason),
                None => "paused".to_string(),
            },
            _ => format!(
                "layer {}/{}, cell {}/{}",
                progress.layer, self.cfg.layers, progress.cell, progress.cells_total
            ),
        };

        BuildStatus {
            state: state.as_str().to_string(),
            layer: progress.layer,
            layers_total: self.cfg.layers,
            cell: progress.cell,
            cells_total: progress.cells_total,
            status,
            stop_requested: flags.stop,
            pause_reason: flags.pause_reason,
            metrics,
            materials: self.inventory.snapshot(),
        }
    }

    /// Settle a finished run to idle unconditionally. A pause or recovery
    /// that lands after the loop's last yield point has nothing left to
    /// interrupt; the terminal outcome wins and the request is dropped, so
    /// the state table is bypassed here on purpose.
    fn settle_idle(&self) {
        self.control.send_replace(ControlFlags::default());
        *self.state.lock().unwrap() = ControllerState::Idle;
        self.events.emit(BuildEvent::State(self.status_snapshot()));
    }

    fn set_progress(&self, layer: u32, cell: u32) {
        let mut progress = self.progress.lock().unwrap();
        progress.layer = layer + 1;
        progress.cell = cell;
        progress.cells_total = self.cfg.cells_per_layer();
    }

    /// The run task. One pass of `build_from` per checkpoint load; recovery
    /// loops back for another pass.
    async fn run(self: Arc<Self>) -> RunOutcome {
        let store = CheckpointStore::new(
            self.cfg.checkpoint_path.clone(),
            self.cfg.layers,
            self.cfg.cells_per_layer(),
        );
        let mut control_rx = self.control.subscribe();
        let probe = ControlProbe {
            rx: self.control.subscribe(),
        };
        let executor = CellExecutor::new(
            self.actuator.clone(),
            self.cfg.clone(),
            self.events.clone(),
            probe,
            self.placement_in_flight.clone(),
        );
        let mut refill = RefillCoordinator::new(
            self.actuator.clone(),
            self.inventory.clone(),
            self.cfg.clone(),
            self.events.clone(),
            self.placement_in_flight.clone(),
        );

        let total_cells = self.cfg.layers as u64 * self.cfg.cells_per_layer() as u64;
        self.metrics.lock().unwrap().reset(total_cells);

        loop {
            let cp = store.load();
            self.events.emit_log(
                LogLevel::Info,
                format!(
                    "Starting build at layer {}, cell {} ({} layers total)",
                    cp.layer, cp.cell, self.cfg.layers
                ),
            );

            let pass = self
                .build_from(cp, &store, &executor, &mut refill, &mut control_rx)
                .await;

            match pass {
                Ok(LoopEnd::Completed) => {
                    store.clear();
                    self.metrics.lock().unwrap().set_remaining(0);
                    self.events
                        .emit_log(LogLevel::Info, "Build complete, checkpoint cleared");
                    self.settle_idle();
                    self.events
                        .emit(BuildEvent::Completed(self.status_snapshot()));
                    return RunOutcome::Completed;
                }
                Ok(LoopEnd::Stopped { layer, cell }) => {
                    store.save(layer, cell);
                    self.metrics.lock().unwrap().record_checkpoint();
                    self.events.emit_log(
                        LogLevel::Info,
                        format!("Build stopped at layer {}, cell {}", layer, cell),
                    );
                    self.settle_idle();
                    self.events.emit(BuildEvent::Stopped(self.status_snapshot()));
                    return RunOutcome::Stopped;
                }
                Ok(LoopEnd::Recovered) => {
                    refill.reset();
                    self.control.send_modify(|flags| flags.recover = false);
                    self.events.emit_log(
                        LogLevel::Warn,
                        "Recovering: replaying from last checkpoint",
                    );
                    self.transition(ControllerState::Running);
                    continue;
                }
                Err(err) => {
                    self.events
                        .emit_log(LogLevel::Error, format!("Build failed: {}", err));
                    self.settle_idle();
                    self.events.emit(BuildEvent::Failed(err.to_string()));
                    return RunOutcome::Error;
                }
            }
        }
    }

    /// One pass over the remaining layers from a loaded checkpoint.
    async fn build_from(
        &self,
        cp: Checkpoint,
        store: &CheckpointStore,
        executor: &CellExecutor,
        refill: &mut RefillCoordinator,
        control_rx: &mut watch::Receiver<ControlFlags>,
    ) -> Result<LoopEnd> {
        let cfg = &self.cfg;
        let origin = cfg.origin;
        let cells_total = cfg.cells_per_layer();

        for layer in cp.layer..cfg.layers {
            let start_cell = if layer == cp.layer { cp.cell } else { 0 };

            // Cactus and string sit one above the sand height.
            let top_y = layer_height(origin, layer) + 1;
            if top_y > BUILD_CEILING {
                return Err(BuildError::LimitExceeded {
                    layer,
                    target_y: top_y,
                    ceiling: BUILD_CEILING,
                });
            }

            if let Err(i) = self.yield_point(control_rx).await {
                return Ok(end_of_pass(i, layer, start_cell));
            }

            self.set_progress(layer, start_cell);
            self.events.emit_log(
                LogLevel::Info,
                format!("Layer {}/{}: building spine", layer + 1, cfg.layers),
            );
            match executor.ensure_vertical_spine(origin, layer).await {
                Ok(()) => {}
                Err(StepError::Interrupted(i)) => return Ok(end_of_pass(i, layer, start_cell)),
                Err(StepError::Actuator(err)) => return Err(err.into()),
            }
            self.inventory.require_support_for_layer(layer)?;

            let tasks = layer_tasks(origin, layer, cfg.grid_size);
            refill
                .ensure_sufficient_for(tasks.len() as u32 - start_cell)
                .await?;

            for cell in (start_cell as usize)..tasks.len() {
                let cell_index = cell as u32;
                if let Err(i) = self.yield_point(control_rx).await {
                    return Ok(end_of_pass(i, layer, cell_index));
                }

                // Periodic re-check so a mid-layer shortage surfaces at a
                // checkpoint boundary instead of as a failed placement.
                let layer_remaining = (tasks.len() - cell) as u32;
                if cell_index != start_cell && layer_remaining % 16 == 0 {
                    refill.ensure_sufficient_for(layer_remaining).await?;
                }

                match executor.execute_cell(layer, cell_index, &tasks[cell]).await {
                    Ok(CellOutcome::Placed) => {
                        self.metrics.lock().unwrap().record_placement();
                    }
                    Ok(CellOutcome::AlreadyComplete) => {}
                    Err(CellError::Interrupted(i)) => {
                        return Ok(end_of_pass(i, layer, cell_index))
                    }
                    Err(CellError::Fatal(err)) => return Err(err),
                }

                refill.try_replenish(false).await;

                let next_cell = cell_index + 1;
                let job_remaining = (cfg.layers - layer - 1) as u64 * cells_total as u64
                    + (tasks.len() as u64 - next_cell as u64);
                self.metrics.lock().unwrap().set_remaining(job_remaining);
                self.set_progress(layer, next_cell);
                self.events
                    .emit(BuildEvent::Progress(self.status_snapshot()));

                if next_cell as usize == tasks.len() {
                    // Rollover save: the next unit of work is the first cell
                    // of the next layer.
                    store.save(layer + 1, 0);
                    self.metrics.lock().unwrap().record_checkpoint();
                } else if next_cell % 16 == 0 {
                    store.save(layer, next_cell);
                    self.metrics.lock().unwrap().record_checkpoint();
                }
            }

            self.events.emit_log(
                LogLevel::Info,
                format!("Layer {}/{} complete", layer + 1, cfg.layers),
            );
        }

        Ok(LoopEnd::Completed)
    }

    /// Observe the control flags, parking on the watch channel while paused.
    async fn yield_point(
        &self,
        rx: &mut watch::Receiver<ControlFlags>,
    ) -> std::result::Result<(), Interrupt> {
        loop {
            let flags = rx.borrow_and_update().clone();
            if flags.stop {
                return Err(Interrupt::Stop);
            }
            if flags.recover {
                return Err(Interrupt::Recover);
            }
            if !flags.paused {
                return Ok(());
            }
            // All controller handles dropped counts as a stop.
            if rx.changed().await.is_err() {
                return Err(Interrupt::Stop);
            }
        }
    }
}

fn end_of_pass(interrupt: Interrupt, layer: u32, cell: u32) -> LoopEnd {
    match interrupt {
        Interrupt::Stop => LoopEnd::Stopped { layer, cell },
        Interrupt::Recover => LoopEnd::Recovered,
    }
}
