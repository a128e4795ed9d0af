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

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============= Charger Status =============

/// Connectivity/activity state reported by the wallbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChargerStatus {
    /// Cable plugged, current flowing
    Charging,
    /// Cable plugged, not drawing power
    Connected,
    /// No cable / unavailable upstream (conservative default)
    #[default]
    Disconnected,
    /// Charger reports the vehicle stopped accepting energy
    Finished,
}

impl ChargerStatus {
    /// True whenever a cable is attached, regardless of current flow
    pub fn is_plugged(self) -> bool {
        matches!(self, Self::Charging | Self::Connected | Self::Finished)
    }
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charging => write!(f, "Charging"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

impl FromStr for ChargerStatus {
    type Err = anyhow::Error;

    /// Parses the raw status string of the wallbox status sensor.
    /// Unknown and unavailable values map to `Disconnected` so that a flaky
    /// sensor ends sessions instead of keeping a phantom session alive.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "charging" | "on" => Ok(Self::Charging),
            "connected" | "ready" | "plugged" | "awaiting_start" | "paused" => Ok(Self::Connected),
            "finished" | "complete" | "completed" => Ok(Self::Finished),
            _ => Ok(Self::Disconnected),
        }
    }
}

// ============= Current Level =============

/// Commanded charge current: either off or one of the configured amp levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CurrentLevel {
    #[default]
    Off,
    Amps(u8),
}

impl CurrentLevel {
    pub fn amps(self) -> Option<u8> {
        match self {
            Self::Off => None,
            Self::Amps(a) => Some(a),
        }
    }

    pub fn is_off(self) -> bool {
        matches!(self, Self::Off)
    }
}

impl fmt::Display for CurrentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Amps(a) => write!(f, "{a} A"),
        }
    }
}

// ============= Commands =============

/// Operations the command controller may execute against the wallbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargerCommand {
    /// Power the charger on at the given current
    Start(u8),
    /// Cut charging entirely
    Stop,
    /// Change the current of an already running charger
    SetLevel(u8),
}

impl fmt::Display for ChargerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(a) => write!(f, "start @ {a} A"),
            Self::Stop => write!(f, "stop"),
            Self::SetLevel(a) => write!(f, "set level {a} A"),
        }
    }
}

// ============= Generic Charger State =============

/// Vendor-agnostic charger state read from the data source.
/// This is what all business logic works with.
#[derive(Debug, Clone, Default)]
pub struct GenericChargerState {
    /// Connectivity/activity status
    pub status: ChargerStatus,

    /// Current the charger reports it is set to, if exposed
    pub current_a: Option<f32>,

    /// Charger-side power draw (W), if exposed
    pub power_w: Option<f32>,

    /// Is the charger reachable?
    pub online: bool,
}

/// Resource holding the latest charger reading plus the previous status,
/// so event-style systems can detect transitions.
#[derive(Resource, Debug, Clone, Default)]
pub struct ChargerState {
    pub state: GenericChargerState,
    pub previous_status: ChargerStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ChargerState {
    /// True exactly on the frame where the charger began drawing power
    pub fn just_started_charging(&self) -> bool {
        self.state.status == ChargerStatus::Charging
            && self.previous_status != ChargerStatus::Charging
    }

    /// True exactly on the frame where a cable was plugged in
    pub fn just_connected(&self) -> bool {
        self.state.status.is_plugged() && !self.previous_status.is_plugged()
    }
}
