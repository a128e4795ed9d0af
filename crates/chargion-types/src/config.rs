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

use anyhow::{Result, bail};
use bevy_ecs::prelude::Resource;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============= Weekday Table =============

/// Seven values indexed by weekday, 0 = Monday .. 6 = Sunday.
/// Replaces seven independent per-day lookups with one fixed-size array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayTable<T>(pub [T; 7]);

impl<T> WeekdayTable<T> {
    pub fn for_day(&self, weekday: Weekday) -> &T {
        &self.0[weekday.num_days_from_monday() as usize]
    }
}

impl<T: Copy> WeekdayTable<T> {
    pub fn uniform(value: T) -> Self {
        Self([value; 7])
    }
}

// ============= Time-of-day serde ("HH:MM") =============

/// Serde helper for clock times written as "HH:MM" in the config file
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(de)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .map_err(|e| D::Error::custom(format!("invalid clock time '{raw}': {e}")))
    }
}

// ============= Sections =============

/// Central configuration resource for the ChargION system
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub location: LocationConfig,
    pub charger: ChargerConfig,
    pub night_charge: NightChargeConfig,
    pub targets: TargetsConfig,
    pub car_ready: CarReadyConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub surplus: SurplusConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub system: SystemSettingsConfig,
}

/// Observer location for the sunrise/sunset arithmetic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name (e.g. "Europe/Prague")
    pub timezone: String,
}

impl LocationConfig {
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        chrono_tz::Tz::from_str(&self.timezone)
            .map_err(|_| anyhow::anyhow!("unknown timezone '{}'", self.timezone))
    }
}

/// Wallbox entities and command-controller tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerConfig {
    /// Status sensor (e.g. "sensor.wallbox_status")
    pub status_entity: String,
    /// On/off switch (e.g. "switch.wallbox_charging")
    pub switch_entity: String,
    /// Charge current number entity (e.g. "number.wallbox_max_current")
    pub current_entity: String,

    /// Discrete allowed current levels in amps, ascending
    #[serde(default = "default_allowed_amps")]
    pub allowed_amps: Vec<u8>,

    /// Minimum spacing between executed hardware commands (seconds)
    #[serde(default = "default_min_command_interval")]
    pub min_command_interval_secs: u64,

    /// Pause after stopping before applying a lower level (seconds)
    #[serde(default = "default_decrease_wait")]
    pub decrease_wait_secs: u64,

    /// Pause after applying a lower level before restarting (seconds)
    #[serde(default = "default_stabilize_wait")]
    pub stabilize_wait_secs: u64,

    /// A higher level must have been requested continuously this long
    /// before it is committed (seconds)
    #[serde(default = "default_increase_stability_delay")]
    pub increase_stability_delay_secs: u64,

    /// Bounded wait for a queued command to complete (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl ChargerConfig {
    /// Smallest configured level, the floor for surplus charging
    pub fn min_amps(&self) -> u8 {
        self.allowed_amps.first().copied().unwrap_or(6)
    }

    /// Largest configured level
    pub fn max_amps(&self) -> u8 {
        self.allowed_amps.last().copied().unwrap_or(16)
    }

    /// Largest allowed level not exceeding `amps`, if any
    pub fn level_at_most(&self, amps: f32) -> Option<u8> {
        self.allowed_amps
            .iter()
            .rev()
            .find(|&&a| f32::from(a) <= amps)
            .copied()
    }
}

/// Overnight charging schedule and mode-choice tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightChargeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Clock time at which the night session is evaluated
    #[serde(with = "hhmm")]
    pub scheduled_time: NaiveTime,

    /// Tomorrow's solar forecast at or above this chooses Battery mode (kWh)
    #[serde(default = "default_forecast_threshold")]
    pub forecast_threshold_kwh: f32,

    /// Allow drawing the house battery down for the vehicle at all
    #[serde(default = "default_true")]
    pub buffer_assist_enabled: bool,

    /// Charge current for grid-backed sessions
    #[serde(default = "default_grid_amps")]
    pub grid_amps: u8,

    /// Charge current for battery-backed sessions
    #[serde(default = "default_battery_amps")]
    pub battery_amps: u8,

    /// Suppress re-evaluation this long after a session completes (minutes)
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    /// Stop-condition evaluation period (seconds). 60 s is documented as too
    /// slow to catch a fast-draining buffer; 15 s is the practical floor.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// A session must see hardware confirmation within this long (seconds)
    #[serde(default = "default_confirmation_grace")]
    pub confirmation_grace_secs: u64,
}

/// Daily SOC targets and the buffer protection floor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Vehicle target SOC by weekday (percent, Monday first)
    pub vehicle_by_weekday: WeekdayTable<u8>,

    /// House-battery target SOC by weekday (percent, Monday first)
    pub buffer_by_weekday: WeekdayTable<u8>,

    /// SOC below which the house battery must not be discharged further
    #[serde(default = "default_buffer_floor")]
    pub buffer_floor_percent: u8,
}

/// Per-weekday "car must be ready by" policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarReadyConfig {
    pub days: WeekdayTable<bool>,
    #[serde(with = "hhmm")]
    pub deadline: NaiveTime,
}

/// Nighttime guard tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Solar production below this counts as "dark" for the guard (watts)
    #[serde(default = "default_min_production")]
    pub min_production_w: f32,

    /// Suppress repeated block actions/notifications this long (minutes)
    #[serde(default = "default_suppression_minutes")]
    pub suppression_minutes: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_production_w: default_min_production(),
            suppression_minutes: default_suppression_minutes(),
        }
    }
}

/// Daytime surplus controller tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurplusConfig {
    /// Recomputation period (seconds)
    #[serde(default = "default_surplus_interval")]
    pub update_interval_secs: u64,

    /// Watts held back from the surplus before mapping to a current level
    #[serde(default)]
    pub reserve_w: f32,

    /// Nominal grid voltage used to convert watts to amps
    #[serde(default = "default_grid_voltage")]
    pub grid_voltage_v: f32,

    /// Number of powered phases the wallbox charges on
    #[serde(default = "default_phases")]
    pub phases: u8,
}

impl Default for SurplusConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_surplus_interval(),
            reserve_w: 0.0,
            grid_voltage_v: default_grid_voltage(),
            phases: default_phases(),
        }
    }
}

/// Site sensor entities and reader tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub vehicle_soc_entity: String,
    pub buffer_soc_entity: String,
    pub pv_power_entity: String,
    pub site_consumption_entity: String,
    pub forecast_tomorrow_entity: String,

    /// Readings older than this are treated as absent (seconds)
    #[serde(default = "default_reading_ttl")]
    pub reading_ttl_secs: u64,

    /// Background poll period (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettingsConfig {
    /// Home Assistant base URL; falls back to HA_BASE_URL / Supervisor
    #[serde(default)]
    pub ha_base_url: Option<String>,

    /// Home Assistant long-lived token; falls back to HA_TOKEN / Supervisor
    #[serde(default)]
    pub ha_token: Option<String>,

    /// Main schedule update interval (seconds)
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
}

impl Default for SystemSettingsConfig {
    fn default() -> Self {
        Self {
            ha_base_url: None,
            ha_token: None,
            update_interval_secs: default_update_interval(),
        }
    }
}

// ============= Validation =============

impl SystemConfig {
    /// Fail-fast startup validation. Anything wrong here is a configuration
    /// error, fatal at the boundary where detected.
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.location.latitude) {
            bail!(
                "location.latitude {} out of range -90..=90",
                self.location.latitude
            );
        }
        if !(-180.0..=180.0).contains(&self.location.longitude) {
            bail!(
                "location.longitude {} out of range -180..=180",
                self.location.longitude
            );
        }
        // Sunrise/sunset must exist year-round at the configured latitude
        if self.location.latitude.abs() > 66.0 {
            bail!(
                "location.latitude {} is inside the polar circle; \
                 sunrise/sunset windows are undefined there",
                self.location.latitude
            );
        }
        self.location.tz()?;

        if self.charger.allowed_amps.is_empty() {
            bail!("charger.allowed_amps must not be empty");
        }
        if !self.charger.allowed_amps.is_sorted() {
            bail!("charger.allowed_amps must be ascending");
        }
        if self.charger.min_command_interval_secs == 0 {
            bail!("charger.min_command_interval_secs must be non-zero");
        }

        for (name, table) in [
            ("targets.vehicle_by_weekday", &self.targets.vehicle_by_weekday),
            ("targets.buffer_by_weekday", &self.targets.buffer_by_weekday),
        ] {
            if let Some(p) = table.0.iter().find(|&&p| p > 100) {
                bail!("{name} contains {p}% (> 100)");
            }
        }
        if self.targets.buffer_floor_percent > 100 {
            bail!(
                "targets.buffer_floor_percent {}% > 100",
                self.targets.buffer_floor_percent
            );
        }

        for (name, amps) in [
            ("night_charge.grid_amps", self.night_charge.grid_amps),
            ("night_charge.battery_amps", self.night_charge.battery_amps),
        ] {
            if !self.charger.allowed_amps.contains(&amps) {
                bail!("{name} = {amps} is not one of charger.allowed_amps");
            }
        }
        if self.night_charge.monitor_interval_secs == 0 {
            bail!("night_charge.monitor_interval_secs must be non-zero");
        }

        if self.surplus.phases == 0 || self.surplus.phases > 3 {
            bail!("surplus.phases must be 1..=3");
        }
        if self.site.poll_interval_secs == 0 {
            bail!("site.poll_interval_secs must be non-zero");
        }

        Ok(())
    }
}

// ============= Defaults =============

fn default_true() -> bool {
    true
}

fn default_allowed_amps() -> Vec<u8> {
    vec![6, 8, 10, 13, 16]
}

fn default_min_command_interval() -> u64 {
    30
}

fn default_decrease_wait() -> u64 {
    5
}

fn default_stabilize_wait() -> u64 {
    3
}

fn default_increase_stability_delay() -> u64 {
    120
}

fn default_command_timeout() -> u64 {
    60
}

fn default_forecast_threshold() -> f32 {
    20.0
}

fn default_grid_amps() -> u8 {
    16
}

fn default_battery_amps() -> u8 {
    8
}

fn default_cooldown_minutes() -> u64 {
    30
}

fn default_monitor_interval() -> u64 {
    15
}

fn default_confirmation_grace() -> u64 {
    120
}

fn default_buffer_floor() -> u8 {
    20
}

fn default_min_production() -> f32 {
    200.0
}

fn default_suppression_minutes() -> u64 {
    10
}

fn default_surplus_interval() -> u64 {
    60
}

fn default_grid_voltage() -> f32 {
    230.0
}

fn default_phases() -> u8 {
    1
}

fn default_reading_ttl() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    30
}

fn default_update_interval() -> u64 {
    5
}
