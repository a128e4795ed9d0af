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

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::WeekdayTable;
use crate::session::SessionMode;

// ============= Priority =============

/// Which consumer gets surplus energy right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityState {
    /// The vehicle is below today's target
    FavorVehicle,
    /// The vehicle is satisfied, the house battery is not
    FavorBuffer,
    /// Both consumers are at or above their targets
    BothSatisfied,
}

impl fmt::Display for PriorityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FavorVehicle => write!(f, "favor vehicle"),
            Self::FavorBuffer => write!(f, "favor buffer"),
            Self::BothSatisfied => write!(f, "both satisfied"),
        }
    }
}

/// Full arbiter output: the verdict plus the readings and targets that
/// produced it, and a human-readable reason. Cached for read-only consumers,
/// always recomputed before acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityDecision {
    pub state: PriorityState,
    pub vehicle_soc: Option<f32>,
    pub vehicle_target: u8,
    pub buffer_soc: Option<f32>,
    pub buffer_target: u8,
    pub reason: String,
}

// ============= Blocking =============

/// Transient verdict of the nighttime guard for one evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingDecision {
    pub blocked: bool,
    pub reason: String,
}

impl BlockingDecision {
    pub fn allowed(reason: impl Into<String>) -> Self {
        Self {
            blocked: false,
            reason: reason.into(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: reason.into(),
        }
    }
}

// ============= Car-ready Policy =============

/// Per-weekday policy: may the night session keep running past sunrise,
/// and until when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarReadyPolicy {
    pub days: WeekdayTable<bool>,
    pub deadline: NaiveTime,
}

impl CarReadyPolicy {
    pub fn applies_on(&self, weekday: chrono::Weekday) -> bool {
        *self.days.for_day(weekday)
    }
}

// ============= Status Snapshot =============

/// Read-only view published to the host side (watch channel). Mirrors the
/// narrow query surface: session active?, active mode, priority, blocked?,
/// last decision reasons.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusSnapshot {
    pub session_active: bool,
    pub active_mode: SessionMode,
    pub priority: Option<PriorityDecision>,
    pub blocked: bool,
    pub last_block_reason: Option<String>,
    pub last_session_reason: Option<String>,
    pub charging: bool,
    pub current_amps: Option<u8>,
}
