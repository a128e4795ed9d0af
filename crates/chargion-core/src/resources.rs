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

use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{debug, error};

use chargion_types::decision::{BlockingDecision, PriorityDecision, StatusSnapshot};
use chargion_types::session::ChargeSession;

use crate::traits::{Notifier, SiteSample};

// ============= Site Readings =============

/// Latest site-level sensor sample plus its age. Consumers read through
/// `view`, which hides readings older than the configured TTL so stale
/// sensors degrade to the conservative `None` defaults.
#[derive(Resource, Debug, Clone, Default)]
pub struct SiteReadings {
    sample: SiteSample,
    updated_at: Option<DateTime<Utc>>,
}

impl SiteReadings {
    pub fn update(&mut self, sample: SiteSample, now: DateTime<Utc>) {
        self.sample = sample;
        self.updated_at = Some(now);
    }

    /// The sample if fresh, an all-`None` sample otherwise
    pub fn view(&self, now: DateTime<Utc>, ttl: Duration) -> SiteSample {
        match self.updated_at {
            Some(at) if now.signed_duration_since(at).to_std().is_ok_and(|age| age <= ttl) => {
                self.sample
            }
            Some(_) | None => SiteSample::default(),
        }
    }
}

// ============= Night Session =============

/// The night scheduler's owned state. Mutated only by the scheduler systems,
/// which run on the single-threaded schedule - that thread is the owning
/// actor the session record needs.
#[derive(Resource, Debug, Clone, Default)]
pub struct NightSession {
    pub session: ChargeSession,
    /// Set once the hardware has reported Charging for this session
    pub hardware_confirmed: bool,
    /// Morning date of the last night for which the scheduled trigger fired,
    /// so the clock trigger fires once per night
    pub last_trigger_night: Option<NaiveDate>,
}

// ============= Manual Override =============

/// User-engaged override: the automation keeps its hands off the charger
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct ManualOverride(pub bool);

// ============= Last Decisions =============

/// Most recent decision values, cached for the read-only status surface.
/// Never treated as authoritative by the control systems themselves.
#[derive(Resource, Debug, Clone, Default)]
pub struct LastDecisions {
    pub priority: Option<PriorityDecision>,
    pub blocking: Option<BlockingDecision>,
}

// ============= Interval Timers =============

/// Elapsed-interval gate in the style of the periodic fetch timers:
/// `due` returns true at most once per interval.
#[derive(Debug, Clone)]
pub struct Ticker {
    last: Option<Instant>,
    interval: Duration,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: None,
            interval,
        }
    }

    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            Some(_) | None => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forget the last tick so the next `due` fires immediately
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Gate for the night-session monitor loop
#[derive(Resource, Debug, Clone)]
pub struct MonitorTimer(pub Ticker);

/// Gate for the surplus recomputation loop
#[derive(Resource, Debug, Clone)]
pub struct SurplusTimer(pub Ticker);

// ============= Notifier =============

/// Fire-and-forget notification handle. Failures are logged and dropped;
/// a broken notification channel must never stall a control decision.
#[derive(Resource, Clone)]
pub struct NotifierHandle(Arc<dyn Notifier>);

impl NotifierHandle {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self(notifier)
    }

    pub fn send(&self, title: &str, message: &str) {
        let notifier = Arc::clone(&self.0);
        let title = title.to_string();
        let message = message.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&title, &message).await {
                error!("❌ Notification '{title}' failed: {e}");
            } else {
                debug!("Notification sent: {title}");
            }
        });
    }
}

// ============= Status Snapshot Publisher =============

/// Publishes the read-only status surface to the host side over a watch
/// channel. The host holds the receiver; every schedule pass replaces the
/// value.
#[derive(Resource, Debug)]
pub struct SnapshotPublisher {
    tx: watch::Sender<StatusSnapshot>,
}

impl SnapshotPublisher {
    pub fn new() -> (Self, watch::Receiver<StatusSnapshot>) {
        let (tx, rx) = watch::channel(StatusSnapshot::default());
        (Self { tx }, rx)
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(snapshot);
    }
}
