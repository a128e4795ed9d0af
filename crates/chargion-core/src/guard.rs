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

//! Nighttime guard: an event-triggered veto that fires whenever the
//! hardware reports it started drawing power. Legitimate draw (manual
//! override, an active scheduled session, guard disabled) is allowed;
//! anything else inside the block window or in the dark is stopped through
//! the charge commander.

use std::time::{Duration, Instant};

use bevy_ecs::prelude::*;
use chrono::Utc;
use tracing::{debug, error, info};

use chargion_types::charger::ChargerState;
use chargion_types::config::SystemConfig;
use chargion_types::decision::BlockingDecision;

use crate::commander::ChargeCommander;
use crate::resources::{LastDecisions, ManualOverride, NightSession, NotifierHandle, SiteReadings};
use crate::windows::WindowCalculator;

/// Suppression bookkeeping so a stuck charger does not produce a
/// stop/notification storm
#[derive(Resource, Debug, Default)]
pub struct GuardState {
    last_block: Option<Instant>,
}

/// Decide whether a draw that just started is legitimate. Pure in its
/// inputs; the system gathers them and applies the verdict.
pub fn evaluate_draw(
    manual_override: bool,
    session_active: bool,
    guard_enabled: bool,
    in_block_window: bool,
    pv_power_w: Option<f32>,
    min_production_w: f32,
) -> BlockingDecision {
    if manual_override {
        return BlockingDecision::allowed("manual override active");
    }
    if session_active {
        return BlockingDecision::allowed("scheduled night session active");
    }
    if !guard_enabled {
        return BlockingDecision::allowed("nighttime guard disabled");
    }
    if in_block_window {
        return BlockingDecision::blocked("inside the nightly block window");
    }
    // An unknown production reading cannot justify a block on its own; the
    // window check above is the authoritative night test
    if pv_power_w.is_some_and(|p| p < min_production_w) {
        return BlockingDecision::blocked(format!(
            "solar production {:.0} W below minimum {:.0} W",
            pv_power_w.unwrap_or(0.0),
            min_production_w
        ));
    }
    BlockingDecision::allowed("outside the block window with sufficient production")
}

/// Event-triggered veto on the Connected/idle -> Charging transition
pub fn nighttime_guard_system(
    config: Res<SystemConfig>,
    windows: Res<WindowCalculator>,
    charger: Res<ChargerState>,
    night: Res<NightSession>,
    manual_override: Res<ManualOverride>,
    readings: Res<SiteReadings>,
    commander: Res<ChargeCommander>,
    notifier: Res<NotifierHandle>,
    mut guard: ResMut<GuardState>,
    mut decisions: ResMut<LastDecisions>,
) {
    if !charger.just_started_charging() {
        return;
    }

    let now_utc = Utc::now();
    let now = now_utc.with_timezone(&windows.timezone());

    let in_block_window = match windows.nightly_block_window(
        now,
        config.night_charge.scheduled_time,
        config.night_charge.enabled,
    ) {
        Ok(window) => window.contains(now),
        Err(e) => {
            error!("❌ Block window computation failed: {e:#}");
            return;
        }
    };

    let view = readings.view(
        now_utc,
        std::time::Duration::from_secs(config.site.reading_ttl_secs),
    );

    let decision = evaluate_draw(
        manual_override.0,
        night.session.mode.is_active(),
        config.guard.enabled,
        in_block_window,
        view.pv_power_w,
        config.guard.min_production_w,
    );

    if !decision.blocked {
        debug!("🛡️ Charging draw allowed: {}", decision.reason);
        decisions.blocking = Some(decision);
        return;
    }

    info!("🛡️ Charging draw blocked: {}", decision.reason);

    let suppression = Duration::from_secs(config.guard.suppression_minutes * 60);
    let suppressed = guard
        .last_block
        .is_some_and(|last| last.elapsed() < suppression);

    if suppressed {
        debug!("🛡️ Block action suppressed (within the suppression window)");
    } else {
        guard.last_block = Some(Instant::now());
        if let Err(e) =
            commander.request_stop(&format!("nighttime guard: {}", decision.reason))
        {
            error!("❌ Guard stop command failed: {e}");
        }
        notifier.send(
            "Nighttime charging blocked",
            &format!("Charging was stopped: {}", decision.reason),
        );
    }

    decisions.blocking = Some(decision);
}
