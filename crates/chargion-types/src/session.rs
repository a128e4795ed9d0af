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

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============= Session Mode =============

/// Energy source of the overnight charge session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// No scheduled session running
    #[default]
    Idle,
    /// Charging the vehicle out of the house battery
    Battery,
    /// Charging the vehicle from the grid
    Grid,
}

impl SessionMode {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Battery => write!(f, "Battery"),
            Self::Grid => write!(f, "Grid"),
        }
    }
}

// ============= Stop Reasons =============

/// Why a running session was completed. Ordering of the variants documents
/// the evaluation precedence of the monitor: target-reached always wins over
/// deadline-reached when both hold in the same tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStopReason {
    /// Vehicle reached today's target SOC
    TargetReached,
    /// House battery hit its protection floor (Battery mode only)
    BufferFloorReached,
    /// Cable was unplugged mid-session
    Disconnected,
    /// User engaged the manual override
    ManualOverride,
    /// Sunrise arrived and today is not a car-ready day
    SunriseReached,
    /// Car-ready deadline arrived with the target still unmet
    DeadlineReached,
    /// Session never got hardware confirmation within the grace period
    NeverConfirmed,
    /// The start command itself failed after retries
    StartFailed,
}

impl fmt::Display for SessionStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetReached => write!(f, "vehicle target SOC reached"),
            Self::BufferFloorReached => write!(f, "buffer protection floor reached"),
            Self::Disconnected => write!(f, "charger disconnected"),
            Self::ManualOverride => write!(f, "manual override engaged"),
            Self::SunriseReached => write!(f, "sunrise reached on a non-car-ready day"),
            Self::DeadlineReached => write!(f, "car-ready deadline reached"),
            Self::NeverConfirmed => write!(f, "hardware never confirmed charging"),
            Self::StartFailed => write!(f, "start command failed"),
        }
    }
}

// ============= Charge Session =============

/// The night scheduler's central mutable record. Exactly one session exists
/// per charger; `mode == Idle` means no session is running.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChargeSession {
    pub mode: SessionMode,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Reason the last session ended, for the status surface
    pub last_stop_reason: Option<SessionStopReason>,
}

impl ChargeSession {
    /// Begin a new session. Resets completion bookkeeping.
    pub fn start(&mut self, mode: SessionMode, now: DateTime<Utc>) {
        self.mode = mode;
        self.started_at = Some(now);
        self.completed_at = None;
        self.last_stop_reason = None;
    }

    /// End the running session and record why.
    pub fn complete(&mut self, reason: SessionStopReason, now: DateTime<Utc>) {
        self.mode = SessionMode::Idle;
        self.completed_at = Some(now);
        self.last_stop_reason = Some(reason);
    }

    /// True while the post-completion cooldown suppresses re-evaluation.
    /// Prevents restart oscillation between the night scheduler and the
    /// daytime surplus controller.
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.completed_at
            .is_some_and(|done| now - done < cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cooldown_window() {
        let mut session = ChargeSession::default();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap();
        session.start(SessionMode::Grid, t0);
        assert!(session.mode.is_active());
        assert!(!session.in_cooldown(t0, Duration::minutes(30)));

        let t1 = t0 + Duration::hours(1);
        session.complete(SessionStopReason::TargetReached, t1);
        assert_eq!(session.mode, SessionMode::Idle);
        assert!(session.in_cooldown(t1 + Duration::minutes(29), Duration::minutes(30)));
        assert!(!session.in_cooldown(t1 + Duration::minutes(31), Duration::minutes(30)));
    }

    #[test]
    fn restart_clears_completion() {
        let mut session = ChargeSession::default();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 15, 1, 0, 0).unwrap();
        session.start(SessionMode::Battery, t0);
        session.complete(SessionStopReason::BufferFloorReached, t0);
        session.start(SessionMode::Grid, t0 + Duration::hours(2));
        assert!(session.completed_at.is_none());
        assert!(session.last_stop_reason.is_none());
    }
}
