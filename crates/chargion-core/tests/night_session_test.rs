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

// End-to-end night session scenarios: mode choice -> commands through the
// charge commander -> monitoring -> completion, against a scripted charger.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;

use chargion_core::commander::{ChargeCommander, CommanderTuning};
use chargion_core::night_charge::{ModeChoice, StopContext, choose_mode, evaluate_stop};
use chargion_core::traits::ChargerDataSource;
use chargion_types::charger::{ChargerStatus, GenericChargerState};
use chargion_types::config::NightChargeConfig;
use chargion_types::session::{ChargeSession, SessionMode, SessionStopReason};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start(u8),
    Stop,
    SetCurrent(u8),
}

#[derive(Default)]
struct ScriptedCharger {
    calls: Mutex<Vec<Call>>,
}

#[async_trait]
impl ChargerDataSource for ScriptedCharger {
    async fn read_state(&self) -> Result<GenericChargerState> {
        Ok(GenericChargerState::default())
    }
    async fn start_charging(&self, amps: u8) -> Result<()> {
        self.calls.lock().push(Call::Start(amps));
        Ok(())
    }
    async fn stop_charging(&self) -> Result<()> {
        self.calls.lock().push(Call::Stop);
        Ok(())
    }
    async fn set_current(&self, amps: u8) -> Result<()> {
        self.calls.lock().push(Call::SetCurrent(amps));
        Ok(())
    }
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
    fn name(&self) -> &str {
        "scripted-charger"
    }
}

fn night_config() -> NightChargeConfig {
    NightChargeConfig {
        enabled: true,
        scheduled_time: NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
        forecast_threshold_kwh: 20.0,
        buffer_assist_enabled: true,
        grid_amps: 16,
        battery_amps: 8,
        cooldown_minutes: 30,
        monitor_interval_secs: 15,
        confirmation_grace_secs: 120,
    }
}

fn tuning() -> CommanderTuning {
    CommanderTuning {
        min_interval: tokio::time::Duration::from_secs(30),
        decrease_wait: tokio::time::Duration::from_secs(5),
        stabilize_wait: tokio::time::Duration::from_secs(3),
        increase_stability_delay: tokio::time::Duration::from_secs(120),
        command_timeout: tokio::time::Duration::from_secs(600),
        max_attempts: 3,
        retry_backoff: tokio::time::Duration::from_millis(500),
    }
}

fn stop_ctx(mode: SessionMode, vehicle_soc: f32, buffer_soc: f32) -> StopContext {
    StopContext {
        mode,
        charger_status: ChargerStatus::Charging,
        manual_override: false,
        vehicle_soc: Some(vehicle_soc),
        vehicle_target: 80,
        buffer_soc: Some(buffer_soc),
        buffer_floor: 20,
        car_ready_morning: false,
        sunrise_passed: false,
        deadline_passed: false,
    }
}

/// Forecast 25 kWh >= threshold 20, buffer 50% > floor 20%, vehicle 40% <
/// target 80%: the scheduler selects Battery and starts; when the buffer
/// drains to the floor, the session stops with the buffer-protection reason.
#[tokio::test(start_paused = true)]
async fn battery_session_runs_until_buffer_floor() {
    let charger = Arc::new(ScriptedCharger::default());
    let commander = ChargeCommander::spawn(charger.clone(), tuning());
    let config = night_config();
    let mut session = ChargeSession::default();

    println!("\n=== Battery Session Scenario ===");
    println!("forecast 25 kWh >= 20, buffer 50% > 20%, vehicle 40% < 80%");

    let choice = choose_mode(Some(25.0), Some(50.0), &config, 20, false);
    assert_eq!(choice, ModeChoice::Battery);

    let t0 = Utc.with_ymd_and_hms(2025, 1, 15, 0, 1, 0).unwrap();
    session.start(SessionMode::Battery, t0);
    commander.start(config.battery_amps, "night charge").await.unwrap();
    assert!(commander.is_charging());

    // Monitoring ticks while the buffer holds
    let ctx = stop_ctx(SessionMode::Battery, 45.0, 35.0);
    assert_eq!(evaluate_stop(&ctx), None);

    // Buffer drops to the protection floor: the very next tick stops
    let ctx = stop_ctx(SessionMode::Battery, 55.0, 20.0);
    let reason = evaluate_stop(&ctx).expect("floor must end the session");
    assert_eq!(reason, SessionStopReason::BufferFloorReached);
    assert_eq!(reason.to_string(), "buffer protection floor reached");

    commander
        .stop(&format!("night session complete: {reason}"))
        .await
        .unwrap();
    session.complete(reason, t0 + Duration::minutes(45));

    assert_eq!(
        charger.calls.lock().clone(),
        vec![Call::Start(8), Call::Stop]
    );
    assert_eq!(session.mode, SessionMode::Idle);
    assert!(!commander.is_charging());

    // A completed session does not re-fire: evaluation is suppressed for
    // the cooldown, and an Idle session never produces another stop
    assert!(session.in_cooldown(t0 + Duration::minutes(50), Duration::minutes(30)));
    let ctx = StopContext {
        mode: SessionMode::Idle,
        ..stop_ctx(SessionMode::Idle, 55.0, 20.0)
    };
    assert_eq!(evaluate_stop(&ctx), None);
}

/// Forecast 15 kWh < threshold, car-ready false, buffer 15% < floor 20%:
/// the scheduler stays Idle and not a single command reaches the hardware.
#[tokio::test(start_paused = true)]
async fn poor_night_is_skipped_without_any_command() {
    let charger = Arc::new(ScriptedCharger::default());
    let _commander = ChargeCommander::spawn(charger.clone(), tuning());
    let config = night_config();

    println!("\n=== Skip Scenario ===");
    println!("forecast 15 kWh < 20, car-ready false, buffer 15% < floor 20%");

    let choice = choose_mode(Some(15.0), Some(15.0), &config, 20, false);
    assert!(matches!(choice, ModeChoice::Skip(_)));

    assert!(charger.calls.lock().is_empty(), "no command may be issued");
}

/// Grid sessions run the same monitoring loop as Battery sessions: a
/// disconnect ends them within one tick.
#[tokio::test(start_paused = true)]
async fn grid_session_monitoring_catches_disconnect() {
    let charger = Arc::new(ScriptedCharger::default());
    let commander = ChargeCommander::spawn(charger.clone(), tuning());
    let config = night_config();
    let mut session = ChargeSession::default();

    let choice = choose_mode(Some(15.0), Some(80.0), &config, 20, true);
    assert_eq!(choice, ModeChoice::Grid);

    let t0 = Utc.with_ymd_and_hms(2025, 1, 15, 1, 0, 30).unwrap();
    session.start(SessionMode::Grid, t0);
    commander.start(config.grid_amps, "night charge").await.unwrap();

    let ctx = StopContext {
        charger_status: ChargerStatus::Disconnected,
        ..stop_ctx(SessionMode::Grid, 50.0, 80.0)
    };
    let reason = evaluate_stop(&ctx).expect("disconnect must end the session");
    assert_eq!(reason, SessionStopReason::Disconnected);

    // No stop command for an unplugged charger, the session just closes
    session.complete(reason, t0 + Duration::minutes(10));
    assert_eq!(charger.calls.lock().clone(), vec![Call::Start(16)]);
    assert_eq!(session.mode, SessionMode::Idle);
}

/// The documented precedence choice: when the vehicle reaches its target in
/// the same tick as the car-ready deadline, the session reports
/// target-reached - charging stops because it is no longer needed, not
/// because time ran out.
#[tokio::test(start_paused = true)]
async fn target_and_deadline_in_one_tick_reports_target() {
    let ctx = StopContext {
        vehicle_soc: Some(80.0),
        car_ready_morning: true,
        sunrise_passed: true,
        deadline_passed: true,
        ..stop_ctx(SessionMode::Grid, 80.0, 60.0)
    };
    assert_eq!(evaluate_stop(&ctx), Some(SessionStopReason::TargetReached));
}
