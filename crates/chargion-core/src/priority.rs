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

//! Priority arbiter: which of the two consumers (vehicle, house battery)
//! should receive surplus energy right now.

use chrono::Weekday;
use tracing::debug;

use chargion_types::config::TargetsConfig;
use chargion_types::decision::{PriorityDecision, PriorityState};

/// A reading counts as "below target" when it is missing or not a number:
/// a transient sensor outage must never silently disable charging.
fn below_target(soc: Option<f32>, target: u8) -> bool {
    match soc {
        Some(v) if v.is_finite() => v < f32::from(target),
        Some(_) | None => true,
    }
}

/// Compute the current priority from both SOC readings and the weekday's
/// targets. Total for all inputs and idempotent for unchanged inputs.
pub fn calculate_priority(
    vehicle_soc: Option<f32>,
    buffer_soc: Option<f32>,
    targets: &TargetsConfig,
    weekday: Weekday,
) -> PriorityDecision {
    let vehicle_target = *targets.vehicle_by_weekday.for_day(weekday);
    let buffer_target = *targets.buffer_by_weekday.for_day(weekday);

    let fmt_soc = |soc: Option<f32>| match soc {
        Some(v) if v.is_finite() => format!("{v:.1}%"),
        Some(_) | None => "unavailable".to_string(),
    };

    let (state, reason) = if below_target(vehicle_soc, vehicle_target) {
        (
            PriorityState::FavorVehicle,
            format!(
                "vehicle SOC {} below target {vehicle_target}%",
                fmt_soc(vehicle_soc)
            ),
        )
    } else if below_target(buffer_soc, buffer_target) {
        (
            PriorityState::FavorBuffer,
            format!(
                "vehicle satisfied, buffer SOC {} below target {buffer_target}%",
                fmt_soc(buffer_soc)
            ),
        )
    } else {
        (
            PriorityState::BothSatisfied,
            format!(
                "vehicle {} >= {vehicle_target}%, buffer {} >= {buffer_target}%",
                fmt_soc(vehicle_soc),
                fmt_soc(buffer_soc)
            ),
        )
    };

    debug!("Priority: {state} ({reason})");

    PriorityDecision {
        state,
        vehicle_soc,
        vehicle_target,
        buffer_soc,
        buffer_target,
        reason,
    }
}
