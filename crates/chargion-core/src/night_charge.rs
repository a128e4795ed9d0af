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

//! Night charge scheduler: a time- and event-triggered state machine that
//! starts at most one overnight session per night (Battery or Grid backed)
//! and monitors it to completion.
//!
//! The decision logic lives in pure functions of explicit inputs; the ECS
//! systems only gather inputs, apply the verdicts, and route hardware
//! changes through the charge commander. The session record is written
//! *before* the start command is issued, so the nighttime guard can never
//! observe a stale Idle for a scheduler-initiated start.

use bevy_ecs::prelude::*;
use chrono::{Datelike, Duration, TimeZone, Utc};
use tracing::{debug, error, info, warn};

use chargion_types::charger::{ChargerState, ChargerStatus};
use chargion_types::config::{NightChargeConfig, SystemConfig};
use chargion_types::decision::CarReadyPolicy;
use chargion_types::session::{SessionMode, SessionStopReason};

use crate::commander::ChargeCommander;
use crate::resources::{ManualOverride, MonitorTimer, NightSession, NotifierHandle, SiteReadings};
use crate::windows::WindowCalculator;

pub fn car_ready_policy(config: &SystemConfig) -> CarReadyPolicy {
    CarReadyPolicy {
        days: config.car_ready.days,
        deadline: config.car_ready.deadline,
    }
}

// ============= Mode Choice =============

/// Outcome of the pre-start decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChoice {
    Battery,
    Grid,
    Skip(String),
}

/// Decide the session mode for tonight.
///
/// Battery is attempted when tomorrow's forecast justifies draining the
/// house battery; the buffer pre-check runs *before* any command so a
/// too-low buffer never produces a brief discharge-then-abort cycle. Grid
/// sessions run only on car-ready mornings - there is no reason to pay for
/// grid energy when the car does not have to be ready.
pub fn choose_mode(
    forecast_tomorrow_kwh: Option<f32>,
    buffer_soc: Option<f32>,
    night: &NightChargeConfig,
    buffer_floor: u8,
    car_ready_morning: bool,
) -> ModeChoice {
    let battery_candidate = night.buffer_assist_enabled
        && forecast_tomorrow_kwh.is_some_and(|kwh| kwh >= night.forecast_threshold_kwh);

    if battery_candidate {
        // An unknown buffer SOC counts as at the floor: never discharge a
        // battery we cannot verify
        let at_floor = match buffer_soc {
            Some(soc) if soc.is_finite() => soc <= f32::from(buffer_floor),
            Some(_) | None => true,
        };
        if !at_floor {
            return ModeChoice::Battery;
        }
        if car_ready_morning {
            return ModeChoice::Grid;
        }
        return ModeChoice::Skip(format!(
            "buffer at protection floor ({buffer_soc:?} <= {buffer_floor}%) and car-ready is off"
        ));
    }

    if car_ready_morning {
        ModeChoice::Grid
    } else {
        ModeChoice::Skip(format!(
            "forecast {forecast_tomorrow_kwh:?} kWh below threshold {} kWh and car-ready is off",
            night.forecast_threshold_kwh
        ))
    }
}

// ============= Stop Conditions =============

/// Inputs for one stop-condition evaluation, gathered by the monitor system
#[derive(Debug, Clone)]
pub struct StopContext {
    pub mode: SessionMode,
    pub charger_status: ChargerStatus,
    pub manual_override: bool,
    pub vehicle_soc: Option<f32>,
    pub vehicle_target: u8,
    pub buffer_soc: Option<f32>,
    pub buffer_floor: u8,
    pub car_ready_morning: bool,
    /// True while the reference lies between today's sunrise and sunset
    pub sunrise_passed: bool,
    /// True once the morning's car-ready deadline has passed
    pub deadline_passed: bool,
}

/// Evaluate the autonomous stop conditions for whichever mode is active.
/// Both Battery and Grid run through the same evaluation; only the buffer
/// floor is Battery-specific. Target-reached is checked first, so it
/// outranks deadline-reached when both hold in the same tick.
pub fn evaluate_stop(ctx: &StopContext) -> Option<SessionStopReason> {
    if !ctx.mode.is_active() {
        return None;
    }

    if ctx
        .vehicle_soc
        .is_some_and(|soc| soc.is_finite() && soc >= f32::from(ctx.vehicle_target))
    {
        return Some(SessionStopReason::TargetReached);
    }

    if ctx.mode == SessionMode::Battery {
        let at_floor = match ctx.buffer_soc {
            Some(soc) if soc.is_finite() => soc <= f32::from(ctx.buffer_floor),
            Some(_) | None => true,
        };
        if at_floor {
            return Some(SessionStopReason::BufferFloorReached);
        }
    }

    if !ctx.charger_status.is_plugged() {
        return Some(SessionStopReason::Disconnected);
    }

    if ctx.manual_override {
        return Some(SessionStopReason::ManualOverride);
    }

    if ctx.sunrise_passed && !ctx.car_ready_morning {
        return Some(SessionStopReason::SunriseReached);
    }

    if ctx.car_ready_morning && ctx.deadline_passed {
        return Some(SessionStopReason::DeadlineReached);
    }

    None
}

// ============= Trigger System =============

/// Start a session at the scheduled clock time (once per night) or on a
/// late arrival (charger newly connected), when inside the activation
/// window and not in the completion cooldown.
pub fn night_charge_trigger_system(
    config: Res<SystemConfig>,
    windows: Res<WindowCalculator>,
    charger: Res<ChargerState>,
    readings: Res<SiteReadings>,
    manual_override: Res<ManualOverride>,
    commander: Res<ChargeCommander>,
    notifier: Res<NotifierHandle>,
    mut night: ResMut<NightSession>,
    mut monitor_timer: ResMut<MonitorTimer>,
) {
    if !config.night_charge.enabled || manual_override.0 || night.session.mode.is_active() {
        return;
    }

    let now_utc = Utc::now();
    let cooldown = Duration::minutes(config.night_charge.cooldown_minutes as i64);
    if night.session.in_cooldown(now_utc, cooldown) {
        debug!("Night trigger suppressed: completion cooldown active");
        return;
    }

    let now = now_utc.with_timezone(&windows.timezone());
    let policy = car_ready_policy(&config);
    let window = match windows.activation_window(now, config.night_charge.scheduled_time, &policy)
    {
        Ok(w) => w,
        Err(e) => {
            error!("❌ Activation window computation failed: {e:#}");
            return;
        }
    };

    if !window.contains(now) {
        return;
    }

    let morning = window.end.date_naive();
    let scheduled_due = night.last_trigger_night != Some(morning);
    let late_arrival = charger.just_connected();
    if !scheduled_due && !late_arrival {
        return;
    }

    // Either trigger consumes this night's scheduled evaluation
    night.last_trigger_night = Some(morning);

    if !charger.state.status.is_plugged() {
        info!("🌙 Night charge trigger: charger not connected, staying idle");
        return;
    }

    let view = readings.view(
        now_utc,
        std::time::Duration::from_secs(config.site.reading_ttl_secs),
    );
    let car_ready_morning = policy.applies_on(morning.weekday());

    let choice = choose_mode(
        view.forecast_tomorrow_kwh,
        view.buffer_soc,
        &config.night_charge,
        config.targets.buffer_floor_percent,
        car_ready_morning,
    );

    let (mode, amps) = match choice {
        ModeChoice::Battery => (SessionMode::Battery, config.night_charge.battery_amps),
        ModeChoice::Grid => (SessionMode::Grid, config.night_charge.grid_amps),
        ModeChoice::Skip(reason) => {
            info!("🌙 Night charge skipped: {reason}");
            return;
        }
    };

    // Session state first, hardware second: the guard must see an active
    // session before the charger reports it started drawing power
    night.session.start(mode, now_utc);
    night.hardware_confirmed = false;
    monitor_timer.0.reset();

    let trigger = if late_arrival && !scheduled_due {
        "late arrival"
    } else {
        "scheduled time"
    };
    let reason = format!("night charge ({mode} mode, {trigger})");
    info!("🌙 Starting night charge session: {mode} @ {amps} A ({trigger})");

    if let Err(e) = commander.request_start(amps, &reason) {
        error!("❌ Night charge start failed: {e}");
        night
            .session
            .complete(SessionStopReason::StartFailed, Utc::now());
        notifier.send(
            "Night charge failed to start",
            &format!("The {mode} session could not start the charger: {e}"),
        );
    }
}

// ============= Monitor System =============

/// Evaluate the stop conditions of the running session on a short fixed
/// period. One loop serves both Battery and Grid modes; the tick interval
/// must stay well below the time a fast-draining buffer needs to cross its
/// protection floor.
pub fn night_charge_monitor_system(
    config: Res<SystemConfig>,
    windows: Res<WindowCalculator>,
    charger: Res<ChargerState>,
    readings: Res<SiteReadings>,
    manual_override: Res<ManualOverride>,
    commander: Res<ChargeCommander>,
    notifier: Res<NotifierHandle>,
    mut night: ResMut<NightSession>,
    mut monitor_timer: ResMut<MonitorTimer>,
) {
    if !night.session.mode.is_active() {
        return;
    }
    if !monitor_timer.0.due() {
        return;
    }

    let now_utc = Utc::now();
    let now = now_utc.with_timezone(&windows.timezone());
    let today = now.date_naive();

    if charger.state.status == ChargerStatus::Charging {
        night.hardware_confirmed = true;
    }

    let (sunrise_today, sunset_today) =
        match (windows.sunrise_on(today), windows.sunset_on(today)) {
            (Ok(rise), Ok(set)) => (rise, set),
            (Err(e), _) | (_, Err(e)) => {
                error!("❌ Sun time computation failed: {e:#}");
                return;
            }
        };
    let sunrise_passed = now >= sunrise_today && now < sunset_today;

    let morning = if now >= sunset_today {
        today + Duration::days(1)
    } else {
        today
    };
    let policy = car_ready_policy(&config);
    let car_ready_morning = policy.applies_on(morning.weekday());
    let deadline_passed = windows
        .timezone()
        .from_local_datetime(&morning.and_time(policy.deadline))
        .earliest()
        .is_some_and(|deadline| now >= deadline);

    let view = readings.view(
        now_utc,
        std::time::Duration::from_secs(config.site.reading_ttl_secs),
    );
    let weekday = now.weekday();

    let ctx = StopContext {
        mode: night.session.mode,
        charger_status: charger.state.status,
        manual_override: manual_override.0,
        vehicle_soc: view.vehicle_soc,
        vehicle_target: *config.targets.vehicle_by_weekday.for_day(weekday),
        buffer_soc: view.buffer_soc,
        buffer_floor: config.targets.buffer_floor_percent,
        car_ready_morning,
        sunrise_passed,
        deadline_passed,
    };

    let mut stop = evaluate_stop(&ctx);

    // Consistency timeout: a session that never saw the hardware confirm
    // within the grace period is re-verified against the actual device
    // state instead of trusting its own flag
    if stop.is_none() && !night.hardware_confirmed {
        let grace = Duration::seconds(config.night_charge.confirmation_grace_secs as i64);
        let overdue = night
            .session
            .started_at
            .is_some_and(|started| now_utc - started > grace);
        if overdue && charger.state.status != ChargerStatus::Charging {
            warn!(
                "⚠️ Session active for >{}s without hardware confirmation (charger reports {})",
                config.night_charge.confirmation_grace_secs, charger.state.status
            );
            stop = Some(SessionStopReason::NeverConfirmed);
        }
    }

    let Some(reason) = stop else {
        debug!(
            "🌙 Session check ({}): vehicle {:?}/{:?}%, buffer {:?}%, status {}",
            night.session.mode,
            ctx.vehicle_soc,
            ctx.vehicle_target,
            ctx.buffer_soc,
            ctx.charger_status
        );
        return;
    };

    let mode = night.session.mode;
    info!("🌙 Night charge session ({mode}) complete: {reason}");

    // Disconnected chargers need no stop command; an engaged override hands
    // the charger to the user
    let needs_stop = !matches!(
        reason,
        SessionStopReason::Disconnected | SessionStopReason::ManualOverride
    );
    if needs_stop
        && let Err(e) = commander.request_stop(&format!("night session complete: {reason}"))
    {
        // Fail-closed: the session still completes; the guard re-verifies
        // actual hardware state on its next event
        error!("❌ Stop command failed at session completion: {e}");
    }

    night.session.complete(reason.clone(), Utc::now());
    notifier.send(
        "Night charge session ended",
        &format!("The {mode} session ended: {reason}"),
    );
}
