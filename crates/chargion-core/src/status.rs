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

//! Status bridge: every schedule pass publishes the read-only decision
//! surface (session, priority, blocked, reasons) over a watch channel for
//! the host and diagnostic collaborators.

use bevy_ecs::prelude::*;
use chrono::Utc;
use tracing::error;

use chargion_types::config::SystemConfig;
use chargion_types::decision::StatusSnapshot;

use crate::commander::ChargeCommander;
use crate::resources::{LastDecisions, NightSession, SnapshotPublisher};
use crate::windows::WindowCalculator;

pub fn publish_snapshot_system(
    config: Res<SystemConfig>,
    windows: Res<WindowCalculator>,
    night: Res<NightSession>,
    decisions: Res<LastDecisions>,
    commander: Res<ChargeCommander>,
    publisher: Res<SnapshotPublisher>,
) {
    let now = Utc::now().with_timezone(&windows.timezone());

    // Recompute containment rather than trusting the last guard verdict;
    // the guard only runs on draw events
    let blocked = if config.guard.enabled {
        match windows.nightly_block_window(
            now,
            config.night_charge.scheduled_time,
            config.night_charge.enabled,
        ) {
            Ok(window) => window.contains(now),
            Err(e) => {
                error!("❌ Block window computation failed: {e:#}");
                false
            }
        }
    } else {
        false
    };

    publisher.publish(StatusSnapshot {
        session_active: night.session.mode.is_active(),
        active_mode: night.session.mode,
        priority: decisions.priority.clone(),
        blocked,
        last_block_reason: decisions.blocking.as_ref().map(|b| b.reason.clone()),
        last_session_reason: night
            .session
            .last_stop_reason
            .as_ref()
            .map(ToString::to_string),
        charging: commander.is_charging(),
        current_amps: commander.current_level().amps(),
    });
}
