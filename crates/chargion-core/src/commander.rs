// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ChargION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! The charge commander: the single component allowed to issue wallbox
//! commands. Requests from any task enter a FIFO queue drained by one
//! worker, which enforces the minimum command interval, runs bounded
//! retries, and updates the confirmed-state cache only after success.
//!
//! All timing goes through `tokio::time`, so tests run under a paused clock
//! instead of wall-clock sleeping.

use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, sleep, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use chargion_types::charger::{ChargerCommand, CurrentLevel};
use chargion_types::config::ChargerConfig;

use crate::traits::ChargerDataSource;

// ============= Errors =============

#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("command queue closed")]
    QueueClosed,
    #[error("timed out waiting for command to complete")]
    Timeout,
    #[error("charger command failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
}

/// What `set_level` did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// The level change was executed (or a fresh start was issued)
    Executed,
    /// An increase is armed but has not been sustained long enough yet
    Deferred,
    /// The charger already runs at that level
    Unchanged,
}

// ============= Tuning =============

#[derive(Debug, Clone)]
pub struct CommanderTuning {
    /// Minimum spacing between executed queue operations
    pub min_interval: Duration,
    /// Pause between stopping and applying a lower level
    pub decrease_wait: Duration,
    /// Pause between applying a lower level and restarting
    pub stabilize_wait: Duration,
    /// How long a higher level must be continuously requested before commit
    pub increase_stability_delay: Duration,
    /// Bounded wait for a queued command to complete
    pub command_timeout: Duration,
    /// Retry bound per hardware operation
    pub max_attempts: u32,
    /// Initial retry backoff, doubled per attempt
    pub retry_backoff: Duration,
}

impl From<&ChargerConfig> for CommanderTuning {
    fn from(config: &ChargerConfig) -> Self {
        Self {
            min_interval: Duration::from_secs(config.min_command_interval_secs),
            decrease_wait: Duration::from_secs(config.decrease_wait_secs),
            stabilize_wait: Duration::from_secs(config.stabilize_wait_secs),
            increase_stability_delay: Duration::from_secs(config.increase_stability_delay_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

// ============= Internal State =============

/// Last *confirmed* hardware state; never updated on failed commands
#[derive(Debug, Clone, Copy, Default)]
struct CachedState {
    charging: bool,
    level: CurrentLevel,
}

#[derive(Debug, Clone, Copy)]
struct PendingIncrease {
    amps: u8,
    since: Instant,
}

struct CommanderShared {
    source: Arc<dyn ChargerDataSource>,
    tuning: CommanderTuning,
    cached: Mutex<CachedState>,
    pending_increase: Mutex<Option<PendingIncrease>>,
}

struct QueuedCommand {
    command: ChargerCommand,
    reason: String,
    reply: oneshot::Sender<Result<(), CommandError>>,
}

// ============= Commander =============

/// Handle to the command worker. Cheap to clone; dropping the last handle
/// closes the queue and the worker exits after the in-flight operation.
#[derive(Resource, Clone)]
pub struct ChargeCommander {
    shared: Arc<CommanderShared>,
    tx: mpsc::UnboundedSender<QueuedCommand>,
}

impl ChargeCommander {
    /// Create the commander and spawn its queue worker on the current
    /// tokio runtime.
    pub fn spawn(source: Arc<dyn ChargerDataSource>, tuning: CommanderTuning) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(CommanderShared {
            source,
            tuning,
            cached: Mutex::new(CachedState::default()),
            pending_increase: Mutex::new(None),
        });
        tokio::spawn(worker(Arc::clone(&shared), rx));
        Self { shared, tx }
    }

    // ============= Read Accessors =============

    /// Last confirmed charging state (not merely requested)
    pub fn is_charging(&self) -> bool {
        self.shared.cached.lock().charging
    }

    /// Last confirmed current level
    pub fn current_level(&self) -> CurrentLevel {
        self.shared.cached.lock().level
    }

    // ============= Async API =============

    pub async fn start(&self, amps: u8, reason: &str) -> Result<(), CommandError> {
        let rx = self.enqueue(ChargerCommand::Start(amps), reason)?;
        self.await_reply(rx).await
    }

    pub async fn stop(&self, reason: &str) -> Result<(), CommandError> {
        self.shared.pending_increase.lock().take();
        let rx = self.enqueue(ChargerCommand::Stop, reason)?;
        self.await_reply(rx).await
    }

    /// Request a level. Decreases and fresh starts execute immediately (via
    /// the safe-decrease sequence where applicable); increases must be
    /// sustained for the stability delay before they commit.
    pub async fn set_level(&self, amps: u8, reason: &str) -> Result<LevelOutcome, CommandError> {
        if !self.level_gate_open(amps) {
            debug!("Deferring increase to {amps} A until sustained ({reason})");
            return Ok(LevelOutcome::Deferred);
        }
        {
            let cached = *self.shared.cached.lock();
            if cached.charging && cached.level == CurrentLevel::Amps(amps) {
                return Ok(LevelOutcome::Unchanged);
            }
        }
        let rx = self.enqueue(ChargerCommand::SetLevel(amps), reason)?;
        self.await_reply(rx).await?;
        Ok(LevelOutcome::Executed)
    }

    // ============= Blocking API (schedule thread) =============
    //
    // The bevy schedule runs inside `spawn_blocking`, so blocking on the
    // runtime handle here is legal. Must not be called from async tasks.

    pub fn request_start(&self, amps: u8, reason: &str) -> Result<(), CommandError> {
        tokio::runtime::Handle::current().block_on(self.start(amps, reason))
    }

    pub fn request_stop(&self, reason: &str) -> Result<(), CommandError> {
        tokio::runtime::Handle::current().block_on(self.stop(reason))
    }

    pub fn request_level(&self, amps: u8, reason: &str) -> Result<LevelOutcome, CommandError> {
        tokio::runtime::Handle::current().block_on(self.set_level(amps, reason))
    }

    /// Fire-and-forget stop for callers that cannot usefully react to
    /// failure beyond logging
    pub fn request_stop_detached(&self, reason: &str) {
        let this = self.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            match this.stop(&reason).await {
                Ok(()) => info!("✅ Stop command succeeded ({reason})"),
                Err(e) => error!("❌ Stop command failed ({reason}): {e}"),
            }
        });
    }

    // ============= Internals =============

    fn enqueue(
        &self,
        command: ChargerCommand,
        reason: &str,
    ) -> Result<oneshot::Receiver<Result<(), CommandError>>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueuedCommand {
                command,
                reason: reason.to_string(),
                reply,
            })
            .map_err(|_| CommandError::QueueClosed)?;
        Ok(rx)
    }

    async fn await_reply(
        &self,
        rx: oneshot::Receiver<Result<(), CommandError>>,
    ) -> Result<(), CommandError> {
        match timeout(self.shared.tuning.command_timeout, rx).await {
            Err(_) => Err(CommandError::Timeout),
            Ok(Err(_)) => Err(CommandError::QueueClosed),
            Ok(Ok(result)) => result,
        }
    }

    /// Increase-stability gate. Returns false while an increase is armed but
    /// not yet sustained for the configured delay. Any other request resets
    /// the armed increase.
    fn level_gate_open(&self, amps: u8) -> bool {
        let cached = *self.shared.cached.lock();
        let increasing = cached.charging
            && matches!(cached.level.amps(), Some(current) if amps > current);

        let mut pending = self.shared.pending_increase.lock();
        if !increasing {
            pending.take();
            return true;
        }

        let now = Instant::now();
        let since = match *pending {
            Some(p) if p.amps == amps => p.since,
            _ => {
                *pending = Some(PendingIncrease { amps, since: now });
                now
            }
        };
        if now.duration_since(since) >= self.shared.tuning.increase_stability_delay {
            pending.take();
            true
        } else {
            false
        }
    }
}

// ============= Worker =============

async fn worker(shared: Arc<CommanderShared>, mut rx: mpsc::UnboundedReceiver<QueuedCommand>) {
    let mut last_executed: Option<Instant> = None;

    while let Some(queued) = rx.recv().await {
        if let Some(last) = last_executed {
            let earliest = last + shared.tuning.min_interval;
            if Instant::now() < earliest {
                debug!(
                    "Rate limit: holding '{}' until the minimum command interval elapses",
                    queued.command
                );
                sleep_until(earliest).await;
            }
        }

        let result = execute_command(&shared, queued.command, &queued.reason).await;
        last_executed = Some(Instant::now());

        if queued.reply.send(result).is_err() {
            debug!("Command requester went away before completion");
        }
    }

    debug!("Charge command worker stopped");
}

async fn execute_command(
    shared: &CommanderShared,
    command: ChargerCommand,
    reason: &str,
) -> Result<(), CommandError> {
    info!("⚡ Executing {command} ({reason})");

    match command {
        ChargerCommand::Start(amps) => {
            run_with_retries(shared, "start", || shared.source.start_charging(amps)).await?;
            let mut cached = shared.cached.lock();
            cached.charging = true;
            cached.level = CurrentLevel::Amps(amps);
            Ok(())
        }
        ChargerCommand::Stop => {
            run_with_retries(shared, "stop", || shared.source.stop_charging()).await?;
            let mut cached = shared.cached.lock();
            cached.charging = false;
            cached.level = CurrentLevel::Off;
            Ok(())
        }
        ChargerCommand::SetLevel(amps) => {
            let current = *shared.cached.lock();
            if !current.charging {
                // Not running: a level request is a fresh start
                run_with_retries(shared, "start", || shared.source.start_charging(amps)).await?;
                let mut cached = shared.cached.lock();
                cached.charging = true;
                cached.level = CurrentLevel::Amps(amps);
                return Ok(());
            }
            match current.level.amps() {
                Some(running) if amps < running => safe_decrease(shared, amps).await,
                Some(running) if amps == running => Ok(()),
                // Increase (the stability gate already passed) or unknown level
                Some(_) | None => {
                    run_with_retries(shared, "set current", || shared.source.set_current(amps))
                        .await?;
                    shared.cached.lock().level = CurrentLevel::Amps(amps);
                    Ok(())
                }
            }
        }
    }
}

// ============= Safe-decrease Sequence =============

/// Phases of the safe current decrease. An explicit machine rather than
/// inline sleeps, so the flow is steppable under a paused test clock and the
/// cache reflects confirmed hardware state at every phase boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecreasePhase {
    Stopping,
    Waiting,
    Setting,
    Stabilizing,
    Starting,
    Done,
}

async fn safe_decrease(shared: &CommanderShared, amps: u8) -> Result<(), CommandError> {
    let mut phase = DecreasePhase::Stopping;
    loop {
        phase = match phase {
            DecreasePhase::Stopping => {
                run_with_retries(shared, "stop (decrease)", || shared.source.stop_charging())
                    .await?;
                let mut cached = shared.cached.lock();
                cached.charging = false;
                cached.level = CurrentLevel::Off;
                DecreasePhase::Waiting
            }
            DecreasePhase::Waiting => {
                sleep(shared.tuning.decrease_wait).await;
                DecreasePhase::Setting
            }
            DecreasePhase::Setting => {
                run_with_retries(shared, "set current (decrease)", || {
                    shared.source.set_current(amps)
                })
                .await?;
                DecreasePhase::Stabilizing
            }
            DecreasePhase::Stabilizing => {
                sleep(shared.tuning.stabilize_wait).await;
                DecreasePhase::Starting
            }
            DecreasePhase::Starting => {
                run_with_retries(shared, "start (decrease)", || {
                    shared.source.start_charging(amps)
                })
                .await?;
                let mut cached = shared.cached.lock();
                cached.charging = true;
                cached.level = CurrentLevel::Amps(amps);
                DecreasePhase::Done
            }
            DecreasePhase::Done => return Ok(()),
        };
    }
}

// ============= Retry =============

async fn run_with_retries<F, Fut>(
    shared: &CommanderShared,
    what: &str,
    mut op: F,
) -> Result<(), CommandError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut attempts = 0;
    let mut delay = shared.tuning.retry_backoff;

    loop {
        attempts += 1;
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempts >= shared.tuning.max_attempts => {
                error!("❌ Charger {what} failed after {attempts} attempts: {e}");
                return Err(CommandError::Exhausted {
                    attempts,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    "Charger {what} failed (attempt {attempts}/{}): {e}. Retrying in {delay:?}",
                    shared.tuning.max_attempts
                );
                sleep(delay).await;
                delay *= 2;
            }
        }
    }
}
