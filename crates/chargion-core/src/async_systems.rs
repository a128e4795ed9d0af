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

//! Background reading: tokio tasks poll the data sources and ship results
//! to the ECS over crossbeam channels; drain systems fold them into
//! resources every schedule pass. Control systems never do I/O themselves.

use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::prelude::*;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use chargion_types::charger::{ChargerState, ChargerStatus, GenericChargerState};
use chargion_types::config::SystemConfig;

use crate::resources::SiteReadings;
use crate::traits::{ChargerDataSource, SiteDataSource, SiteSample};

// ============= Channels =============

/// Channel ends owned by the ECS side
#[derive(Resource)]
pub struct ReaderChannels {
    charger_rx: Receiver<GenericChargerState>,
    site_rx: Receiver<SiteSample>,
}

/// Spawn the background reader task and hand back the ECS-side channels.
/// A read failure is shipped as a conservative value (charger disconnected,
/// site sample empty) rather than being swallowed, so downstream state ages
/// out honestly.
pub fn spawn_readers(
    charger_source: Arc<dyn ChargerDataSource>,
    site_source: Arc<dyn SiteDataSource>,
    poll_interval: Duration,
) -> ReaderChannels {
    let (charger_tx, charger_rx): (Sender<GenericChargerState>, _) = unbounded();
    let (site_tx, site_rx): (Sender<SiteSample>, _) = unbounded();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "📡 Reader task started: {} + {} every {:?}",
            charger_source.name(),
            site_source.name(),
            poll_interval
        );

        loop {
            interval.tick().await;

            let charger_state = match charger_source.read_state().await {
                Ok(state) => state,
                Err(e) => {
                    warn!("⚠️ Charger read failed: {e}");
                    GenericChargerState {
                        status: ChargerStatus::Disconnected,
                        online: false,
                        ..Default::default()
                    }
                }
            };
            if charger_tx.send(charger_state).is_err() {
                debug!("Charger channel closed, reader task exiting");
                return;
            }

            let site_sample = match site_source.read_site().await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("⚠️ Site read failed: {e}");
                    SiteSample::default()
                }
            };
            if site_tx.send(site_sample).is_err() {
                debug!("Site channel closed, reader task exiting");
                return;
            }
        }
    });

    ReaderChannels {
        charger_rx,
        site_rx,
    }
}

// ============= Drain Systems =============

/// Fold queued charger readings into the `ChargerState` resource. The
/// previous status is the status before this frame's batch, so transition
/// detection (`just_started_charging`, `just_connected`) sees the change
/// exactly once.
pub fn poll_charger_state_system(
    channels: Res<ReaderChannels>,
    mut charger: ResMut<ChargerState>,
) {
    let mut latest = None;
    while let Ok(state) = channels.charger_rx.try_recv() {
        latest = Some(state);
    }

    if let Some(state) = latest {
        let previous = charger.state.status;
        if state.status != previous {
            info!("🔌 Charger status: {} -> {}", previous, state.status);
        }
        charger.previous_status = previous;
        charger.state = state;
        charger.last_updated = Some(Utc::now());
    } else {
        // No fresh sample this frame: the last transition has been observed
        charger.previous_status = charger.state.status;
    }
}

/// Fold queued site samples into the `SiteReadings` resource
pub fn poll_site_readings_system(
    channels: Res<ReaderChannels>,
    mut readings: ResMut<SiteReadings>,
    config: Res<SystemConfig>,
) {
    let mut latest = None;
    while let Ok(sample) = channels.site_rx.try_recv() {
        latest = Some(sample);
    }

    if let Some(sample) = latest {
        readings.update(sample, Utc::now());
        debug!(
            "📊 Site: vehicle {:?}%, buffer {:?}%, pv {:?} W, load {:?} W (ttl {}s)",
            sample.vehicle_soc,
            sample.buffer_soc,
            sample.pv_power_w,
            sample.site_consumption_w,
            config.site.reading_ttl_secs
        );
    }
}
