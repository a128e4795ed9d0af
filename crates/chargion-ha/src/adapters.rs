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

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::HomeAssistantClient;
use chargion_core::traits::{ChargerDataSource, Notifier, SiteDataSource, SiteSample};
use chargion_types::charger::{ChargerStatus, GenericChargerState};
use chargion_types::config::{ChargerConfig, SiteConfig};

// ============= Charger Adapter =============

/// Home Assistant adapter implementing ChargerDataSource. Maps the
/// configured status/switch/current entities to the generic charger state
/// and to switch/number service calls.
pub struct HaChargerAdapter {
    client: Arc<HomeAssistantClient>,
    status_entity: String,
    switch_entity: String,
    current_entity: String,
}

impl HaChargerAdapter {
    pub fn new(client: Arc<HomeAssistantClient>, config: &ChargerConfig) -> Self {
        Self {
            client,
            status_entity: config.status_entity.clone(),
            switch_entity: config.switch_entity.clone(),
            current_entity: config.current_entity.clone(),
        }
    }
}

#[async_trait]
impl ChargerDataSource for HaChargerAdapter {
    async fn read_state(&self) -> Result<GenericChargerState> {
        let status_state = self
            .client
            .get_state(&self.status_entity)
            .await
            .with_context(|| format!("Failed to read charger status: {}", self.status_entity))?;

        // Unknown/unavailable parse to Disconnected, which is the
        // conservative reading for every consumer
        let status: ChargerStatus = status_state.state.parse().unwrap_or_default();
        if status_state.is_unavailable() {
            warn!(
                "⚠️ [ADAPTER] Charger status '{}' unavailable, treating as disconnected",
                self.status_entity
            );
        }

        // The commanded current is informative only; a missing entity must
        // not fail the whole read
        let current_a = match self.client.get_state(&self.current_entity).await {
            Ok(state) => state.as_f32(),
            Err(e) => {
                debug!("Current entity read failed: {e}");
                None
            }
        };

        let state = GenericChargerState {
            status,
            current_a,
            power_w: None,
            online: !status_state.is_unavailable(),
        };

        debug!(
            "✅ [ADAPTER] Charger: status={}, current={:?} A",
            state.status, state.current_a
        );
        Ok(state)
    }

    async fn start_charging(&self, amps: u8) -> Result<()> {
        info!("📝 [ADAPTER] Start charging @ {amps} A");
        self.client
            .set_number(&self.current_entity, f32::from(amps))
            .await
            .with_context(|| format!("Failed to set current to {amps} A"))?;
        self.client
            .turn_on(&self.switch_entity)
            .await
            .with_context(|| format!("Failed to turn on {}", self.switch_entity))?;
        Ok(())
    }

    async fn stop_charging(&self) -> Result<()> {
        info!("📝 [ADAPTER] Stop charging");
        self.client
            .turn_off(&self.switch_entity)
            .await
            .with_context(|| format!("Failed to turn off {}", self.switch_entity))?;
        Ok(())
    }

    async fn set_current(&self, amps: u8) -> Result<()> {
        info!("📝 [ADAPTER] Set current @ {amps} A");
        self.client
            .set_number(&self.current_entity, f32::from(amps))
            .await
            .with_context(|| format!("Failed to set current to {amps} A"))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.client.ping().await?)
    }

    fn name(&self) -> &str {
        "home-assistant-charger"
    }
}

// ============= Site Adapter =============

/// Home Assistant adapter implementing SiteDataSource. Each sensor is read
/// independently; a failing or unavailable sensor degrades that field to
/// `None` instead of failing the sample.
pub struct HaSiteAdapter {
    client: Arc<HomeAssistantClient>,
    vehicle_soc_entity: String,
    buffer_soc_entity: String,
    pv_power_entity: String,
    site_consumption_entity: String,
    forecast_tomorrow_entity: String,
}

impl HaSiteAdapter {
    pub fn new(client: Arc<HomeAssistantClient>, config: &SiteConfig) -> Self {
        Self {
            client,
            vehicle_soc_entity: config.vehicle_soc_entity.clone(),
            buffer_soc_entity: config.buffer_soc_entity.clone(),
            pv_power_entity: config.pv_power_entity.clone(),
            site_consumption_entity: config.site_consumption_entity.clone(),
            forecast_tomorrow_entity: config.forecast_tomorrow_entity.clone(),
        }
    }

    async fn read_sensor_float(&self, entity_id: &str) -> Option<f32> {
        match self.client.get_state(entity_id).await {
            Ok(state) => {
                let value = state.as_f32();
                if value.is_none() {
                    debug!("Sensor {entity_id} has no numeric value ('{}')", state.state);
                }
                value
            }
            Err(e) => {
                warn!("⚠️ [ADAPTER] Failed to read {entity_id}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl SiteDataSource for HaSiteAdapter {
    async fn read_site(&self) -> Result<SiteSample> {
        let sample = SiteSample {
            vehicle_soc: self.read_sensor_float(&self.vehicle_soc_entity).await,
            buffer_soc: self.read_sensor_float(&self.buffer_soc_entity).await,
            pv_power_w: self.read_sensor_float(&self.pv_power_entity).await,
            site_consumption_w: self
                .read_sensor_float(&self.site_consumption_entity)
                .await,
            forecast_tomorrow_kwh: self
                .read_sensor_float(&self.forecast_tomorrow_entity)
                .await,
        };

        debug!(
            "✅ [ADAPTER] Site: vehicle={:?}%, buffer={:?}%, pv={:?} W, load={:?} W, forecast={:?} kWh",
            sample.vehicle_soc,
            sample.buffer_soc,
            sample.pv_power_w,
            sample.site_consumption_w,
            sample.forecast_tomorrow_kwh
        );
        Ok(sample)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.client.ping().await?)
    }

    fn name(&self) -> &str {
        "home-assistant-site"
    }
}

// ============= Notifier =============

/// Notification sink backed by HA persistent notifications
pub struct HaNotifier {
    client: Arc<HomeAssistantClient>,
}

impl HaNotifier {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for HaNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        self.client
            .create_notification(title, message)
            .await
            .context("Failed to create persistent notification")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "home-assistant-notifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn charger_config() -> ChargerConfig {
        ChargerConfig {
            status_entity: "sensor.wallbox_status".to_string(),
            switch_entity: "switch.wallbox_charging".to_string(),
            current_entity: "number.wallbox_max_current".to_string(),
            allowed_amps: vec![6, 8, 10, 13, 16],
            min_command_interval_secs: 30,
            decrease_wait_secs: 5,
            stabilize_wait_secs: 3,
            increase_stability_delay_secs: 120,
            command_timeout_secs: 60,
        }
    }

    fn entity_body(entity_id: &str, state: &str) -> String {
        json!({
            "entity_id": entity_id,
            "state": state,
            "attributes": {},
            "last_changed": "2025-10-02T10:00:00Z",
            "last_updated": "2025-10-02T10:00:00Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn charger_state_maps_status_and_current() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/states/sensor.wallbox_status")
            .with_status(200)
            .with_body(entity_body("sensor.wallbox_status", "charging"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/number.wallbox_max_current")
            .with_status(200)
            .with_body(entity_body("number.wallbox_max_current", "10"))
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaChargerAdapter::new(client, &charger_config());
        let state = adapter.read_state().await.unwrap();

        assert_eq!(state.status, ChargerStatus::Charging);
        assert_eq!(state.current_a, Some(10.0));
        assert!(state.online);
    }

    #[tokio::test]
    async fn unavailable_status_reads_as_disconnected_offline() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/states/sensor.wallbox_status")
            .with_status(200)
            .with_body(entity_body("sensor.wallbox_status", "unavailable"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/number.wallbox_max_current")
            .with_status(200)
            .with_body(entity_body("number.wallbox_max_current", "unknown"))
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaChargerAdapter::new(client, &charger_config());
        let state = adapter.read_state().await.unwrap();

        assert_eq!(state.status, ChargerStatus::Disconnected);
        assert_eq!(state.current_a, None);
        assert!(!state.online);
    }

    #[tokio::test]
    async fn start_charging_sets_current_then_switches_on() {
        let mut server = Server::new_async().await;
        let set_mock = server
            .mock("POST", "/api/services/number/set_value")
            .match_body(Matcher::Json(json!({
                "entity_id": "number.wallbox_max_current",
                "value": 8.0
            })))
            .with_status(200)
            .create_async()
            .await;
        let on_mock = server
            .mock("POST", "/api/services/switch/turn_on")
            .match_body(Matcher::Json(json!({
                "entity_id": "switch.wallbox_charging"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaChargerAdapter::new(client, &charger_config());
        adapter.start_charging(8).await.unwrap();

        set_mock.assert_async().await;
        on_mock.assert_async().await;
    }

    #[tokio::test]
    async fn failing_site_sensor_degrades_to_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/states/sensor.ev_battery")
            .with_status(200)
            .with_body(entity_body("sensor.ev_battery", "40"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/sensor.battery_soc")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/sensor.pv_power")
            .with_status(200)
            .with_body(entity_body("sensor.pv_power", "unavailable"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/sensor.house_load")
            .with_status(200)
            .with_body(entity_body("sensor.house_load", "450"))
            .create_async()
            .await;
        server
            .mock("GET", "/api/states/sensor.solcast_tomorrow")
            .with_status(200)
            .with_body(entity_body("sensor.solcast_tomorrow", "25.4"))
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "t").unwrap());
        let adapter = HaSiteAdapter::new(
            client,
            &SiteConfig {
                vehicle_soc_entity: "sensor.ev_battery".to_string(),
                buffer_soc_entity: "sensor.battery_soc".to_string(),
                pv_power_entity: "sensor.pv_power".to_string(),
                site_consumption_entity: "sensor.house_load".to_string(),
                forecast_tomorrow_entity: "sensor.solcast_tomorrow".to_string(),
                reading_ttl_secs: 300,
                poll_interval_secs: 30,
            },
        );

        let sample = adapter.read_site().await.unwrap();
        assert_eq!(sample.vehicle_soc, Some(40.0));
        assert_eq!(sample.buffer_soc, None);
        assert_eq!(sample.pv_power_w, None);
        assert_eq!(sample.site_consumption_w, Some(450.0));
        assert_eq!(sample.forecast_tomorrow_kwh, Some(25.4));
    }
}
