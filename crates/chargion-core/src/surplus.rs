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

//! Daytime surplus controller: periodically recomputes the available
//! renewable surplus and adjusts the charge current through the commander.
//! Shares the command/rate-limit contract with the night logic but owns no
//! session state of its own.

use bevy_ecs::prelude::*;
use chrono::{Datelike, Duration, Utc};
use tracing::{debug, info};

use chargion_types::charger::CurrentLevel;
use chargion_types::config::{ChargerConfig, SurplusConfig, SystemConfig};
use chargion_types::decision::PriorityState;

use crate::commander::{ChargeCommander, LevelOutcome};
use crate::priority::calculate_priority;
use crate::resources::{
    LastDecisions, ManualOverride, NightSession, SiteReadings, SurplusTimer,
};
use crate::windows::WindowCalculator;

/// What the surplus pass decided to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurplusAction {
    /// Run at this level (start if needed)
    Level(u8),
    /// Stop charging, with the reason
    Stop(&'static str),
    /// Leave the charger exactly as it is
    Hold,
}

/// Map the current surplus to an action. The charger's own confirmed draw
/// is added back before comparing against the levels, since it is part of
/// the measured site consumption.
pub fn plan_surplus_action(
    pv_power_w: Option<f32>,
    site_consumption_w: Option<f32>,
    charging_level: CurrentLevel,
    charger: &ChargerConfig,
    surplus: &SurplusConfig,
) -> SurplusAction {
    let (Some(pv), Some(consumption)) = (pv_power_w, site_consumption_w) else {
        // Stale power readings: hold rather than thrash the hardware
        return SurplusAction::Hold;
    };

    let watts_per_amp = surplus.grid_voltage_v * f32::from(surplus.phases);
    let own_draw = charging_level
        .amps()
        .map_or(0.0, |amps| f32::from(amps) * watts_per_amp);

    let available = pv - consumption + own_draw - surplus.reserve_w;
    let amps = available / watts_per_amp;

    match charger.level_at_most(amps) {
        Some(level) => SurplusAction::Level(level),
        None => SurplusAction::Stop("surplus below the minimum charge current"),
    }
}

/// Periodic surplus recomputation. Abstains whenever another decision-maker
/// owns the charger: an active or cooling-down night session, the manual
/// override, the block window, or an unplugged cable.
pub fn surplus_control_system(
    config: Res<SystemConfig>,
    windows: Res<WindowCalculator>,
    charger: Res<chargion_types::charger::ChargerState>,
    night: Res<NightSession>,
    manual_override: Res<ManualOverride>,
    readings: Res<SiteReadings>,
    commander: Res<ChargeCommander>,
    mut timer: ResMut<SurplusTimer>,
    mut decisions: ResMut<LastDecisions>,
) {
    if !timer.0.due() {
        return;
    }

    if manual_override.0 || night.session.mode.is_active() {
        return;
    }

    let now_utc = Utc::now();
    let cooldown = Duration::minutes(config.night_charge.cooldown_minutes as i64);
    if night.session.in_cooldown(now_utc, cooldown) {
        debug!("Surplus control suppressed: session cooldown active");
        return;
    }

    if !charger.state.status.is_plugged() {
        return;
    }

    let now = now_utc.with_timezone(&windows.timezone());
    match windows.nightly_block_window(
        now,
        config.night_charge.scheduled_time,
        config.night_charge.enabled,
    ) {
        Ok(window) if window.contains(now) => {
            debug!("Surplus control suppressed: inside the block window");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("❌ Block window computation failed: {e:#}");
            return;
        }
    }

    let view = readings.view(
        now_utc,
        std::time::Duration::from_secs(config.site.reading_ttl_secs),
    );

    let priority = calculate_priority(
        view.vehicle_soc,
        view.buffer_soc,
        &config.targets,
        now.weekday(),
    );
    let state = priority.state;
    decisions.priority = Some(priority);

    if state != PriorityState::FavorVehicle {
        // Surplus belongs to the buffer (or nobody); get the charger out of
        // the way
        if commander.is_charging() {
            info!("☀️ Surplus handover: {state}, stopping vehicle charging");
            if let Err(e) = commander.request_stop(&format!("surplus priority: {state}")) {
                tracing::error!("❌ Surplus stop failed: {e}");
            }
        }
        return;
    }

    let action = plan_surplus_action(
        view.pv_power_w,
        view.site_consumption_w,
        commander.current_level(),
        &config.charger,
        &config.surplus,
    );

    match action {
        SurplusAction::Hold => debug!("☀️ Surplus: power readings stale, holding"),
        SurplusAction::Level(amps) => {
            match commander.request_level(amps, "solar surplus available") {
                Ok(LevelOutcome::Executed) => info!("☀️ Surplus charging at {amps} A"),
                Ok(LevelOutcome::Deferred) => {
                    debug!("☀️ Surplus increase to {amps} A pending stability");
                }
                Ok(LevelOutcome::Unchanged) => {}
                Err(e) => tracing::error!("❌ Surplus level change failed: {e}"),
            }
        }
        SurplusAction::Stop(reason) => {
            if commander.is_charging() {
                info!("☀️ {reason}, stopping");
                if let Err(e) = commander.request_stop(reason) {
                    tracing::error!("❌ Surplus stop failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargion_types::config::ChargerConfig;

    fn charger_config() -> ChargerConfig {
        ChargerConfig {
            status_entity: String::new(),
            switch_entity: String::new(),
            current_entity: String::new(),
            allowed_amps: vec![6, 8, 10, 13, 16],
            min_command_interval_secs: 30,
            decrease_wait_secs: 5,
            stabilize_wait_secs: 3,
            increase_stability_delay_secs: 120,
            command_timeout_secs: 60,
        }
    }

    fn surplus_config() -> SurplusConfig {
        SurplusConfig {
            update_interval_secs: 60,
            reserve_w: 0.0,
            grid_voltage_v: 230.0,
            phases: 1,
        }
    }

    #[test]
    fn surplus_maps_to_the_largest_covered_level() {
        // 2.4 kW free at 230 V -> 10.4 A -> 10 A level
        let action = plan_surplus_action(
            Some(3000.0),
            Some(600.0),
            CurrentLevel::Off,
            &charger_config(),
            &surplus_config(),
        );
        assert_eq!(action, SurplusAction::Level(10));
    }

    #[test]
    fn own_draw_is_added_back() {
        // House load includes the charger's 10 A (2300 W). Net surplus
        // unchanged -> keep 10 A rather than spiraling down.
        let action = plan_surplus_action(
            Some(3000.0),
            Some(2900.0),
            CurrentLevel::Amps(10),
            &charger_config(),
            &surplus_config(),
        );
        assert_eq!(action, SurplusAction::Level(10));
    }

    #[test]
    fn below_minimum_level_stops() {
        let action = plan_surplus_action(
            Some(800.0),
            Some(400.0),
            CurrentLevel::Off,
            &charger_config(),
            &surplus_config(),
        );
        assert!(matches!(action, SurplusAction::Stop(_)));
    }

    #[test]
    fn stale_readings_hold() {
        let action = plan_surplus_action(
            None,
            Some(400.0),
            CurrentLevel::Amps(6),
            &charger_config(),
            &surplus_config(),
        );
        assert_eq!(action, SurplusAction::Hold);
    }

    #[test]
    fn reserve_is_held_back() {
        let mut surplus = surplus_config();
        surplus.reserve_w = 1000.0;
        // 2.4 kW free minus 1 kW reserve -> 6.1 A -> 6 A level
        let action = plan_surplus_action(
            Some(3000.0),
            Some(600.0),
            CurrentLevel::Off,
            &charger_config(),
            &surplus,
        );
        assert_eq!(action, SurplusAction::Level(6));
    }

    #[test]
    fn three_phase_scales_the_conversion() {
        let mut surplus = surplus_config();
        surplus.phases = 3;
        // 6.9 kW over 3 phases -> 10 A
        let action = plan_surplus_action(
            Some(7500.0),
            Some(600.0),
            CurrentLevel::Off,
            &charger_config(),
            &surplus,
        );
        assert_eq!(action, SurplusAction::Level(10));
    }
}
