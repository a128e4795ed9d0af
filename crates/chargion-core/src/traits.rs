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

use anyhow::Result;
use async_trait::async_trait;

use chargion_types::charger::GenericChargerState;

// ============= ChargION Data Source Traits =============

/// Generic data source for reading charger state and issuing wallbox
/// commands. Business logic uses this trait, never knows about HA details.
/// All hardware mutation in the system funnels through the charge commander,
/// which is the only caller of the mutating methods here.
#[async_trait]
pub trait ChargerDataSource: Send + Sync {
    /// Read current generic charger state
    async fn read_state(&self) -> Result<GenericChargerState>;

    /// Power the charger on at the given current
    async fn start_charging(&self, amps: u8) -> Result<()>;

    /// Cut charging entirely
    async fn stop_charging(&self) -> Result<()>;

    /// Change the commanded current without toggling power
    async fn set_current(&self, amps: u8) -> Result<()>;

    /// Check if data source is available
    async fn health_check(&self) -> Result<bool>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

/// One poll of the site-level sensors. Every field is optional: a sensor
/// that is unavailable or unparsable reads as `None`, and the consumers
/// apply their own conservative defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteSample {
    /// Vehicle state of charge (0-100 %)
    pub vehicle_soc: Option<f32>,

    /// House battery state of charge (0-100 %)
    pub buffer_soc: Option<f32>,

    /// Current PV production (W)
    pub pv_power_w: Option<f32>,

    /// Current site consumption excluding nothing - whole-house load (W)
    pub site_consumption_w: Option<f32>,

    /// Solar forecast for tomorrow (kWh)
    pub forecast_tomorrow_kwh: Option<f32>,
}

/// Generic data source for site-level readings (SOC, power, forecast)
#[async_trait]
pub trait SiteDataSource: Send + Sync {
    /// Read the current site sample
    async fn read_site(&self) -> Result<SiteSample>;

    /// Check if data source is available
    async fn health_check(&self) -> Result<bool>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

/// Notification sink. Delivery is the host's job; failures are logged by the
/// caller and never propagated into control decisions.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> Result<()>;

    /// Get notifier name for logging
    fn name(&self) -> &str;
}
