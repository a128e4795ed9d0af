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

pub mod async_systems;
pub mod commander;
pub mod guard;
pub mod night_charge;
pub mod priority;
pub mod resources;
pub mod solar;
pub mod status;
pub mod surplus;
pub mod traits;
pub mod windows;

use bevy_app::prelude::*;
use bevy_ecs::prelude::*;

pub use commander::{ChargeCommander, CommandError, CommanderTuning, LevelOutcome};
pub use guard::{GuardState, evaluate_draw, nighttime_guard_system};
pub use night_charge::{
    ModeChoice, StopContext, choose_mode, evaluate_stop, night_charge_monitor_system,
    night_charge_trigger_system,
};
pub use priority::calculate_priority;
pub use resources::{
    LastDecisions, ManualOverride, MonitorTimer, NightSession, NotifierHandle, SiteReadings,
    SnapshotPublisher, SurplusTimer, Ticker,
};
pub use status::publish_snapshot_system;
pub use surplus::{SurplusAction, plan_surplus_action, surplus_control_system};
pub use traits::{ChargerDataSource, Notifier, SiteDataSource, SiteSample};
pub use windows::{OccurrenceDirection, TimeWindow, WindowCalculator, resolve_occurrence};

use chargion_types::charger::ChargerState;

/// Core plugin that registers the decision systems in their required order:
/// readings are drained first, then the guard sees transitions before the
/// schedulers can consume them, then the session logic, then the surplus
/// pass, and finally the status snapshot of whatever this frame decided.
///
/// The configuration-dependent resources (SystemConfig, WindowCalculator,
/// ChargeCommander, ReaderChannels, NotifierHandle, SnapshotPublisher,
/// MonitorTimer, SurplusTimer) are inserted by the binary before the app
/// runs.
pub struct ChargionCorePlugin;

impl Plugin for ChargionCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ChargerState>()
            .init_resource::<SiteReadings>()
            .init_resource::<NightSession>()
            .init_resource::<ManualOverride>()
            .init_resource::<LastDecisions>()
            .init_resource::<GuardState>()
            .add_systems(
                Update,
                (
                    async_systems::poll_charger_state_system,
                    async_systems::poll_site_readings_system,
                    nighttime_guard_system,
                    night_charge_trigger_system,
                    night_charge_monitor_system,
                    surplus_control_system,
                    publish_snapshot_system,
                )
                    .chain(),
            );
    }
}
