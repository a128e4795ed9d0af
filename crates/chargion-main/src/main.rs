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

mod config;

use anyhow::Result;
use bevy_app::{ScheduleRunnerPlugin, TaskPoolPlugin, prelude::*};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use chargion_core::{
    ChargeCommander, ChargionCorePlugin, CommanderTuning, MonitorTimer, NotifierHandle,
    SnapshotPublisher, SurplusTimer, Ticker, WindowCalculator, async_systems::spawn_readers,
    traits::{ChargerDataSource, Notifier, SiteDataSource},
};
use chargion_ha::{HaChargerAdapter, HaNotifier, HaSiteAdapter, HomeAssistantClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Handle command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("ChargION - EV Charging Automation");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: chargion [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            _ => {
                // Continue to normal execution for other args
            }
        }
    }

    // Create tokio runtime for async HTTP operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    // Run the bevy app in a blocking task so tokio can keep running async tasks
    runtime.block_on(async {
        tokio::task::spawn_blocking(initialize_and_run)
            .await
            .expect("App task panicked")
    })
}

fn initialize_and_run() -> Result<()> {
    // Initialize tracing with env filter support; respects RUST_LOG
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = config::load_config()?;

    info!("🚀 Starting ChargION - EV Charging Automation");
    info!("📋 Configuration Summary:");
    info!(
        "   Location: {:.4}, {:.4} ({})",
        config.location.latitude, config.location.longitude, config.location.timezone
    );
    info!(
        "   Charger: {} / {} / {}",
        config.charger.status_entity, config.charger.switch_entity, config.charger.current_entity
    );
    info!("   Allowed levels: {:?} A", config.charger.allowed_amps);
    info!(
        "   Night charge: enabled={}, scheduled {}, forecast threshold {} kWh",
        config.night_charge.enabled,
        config.night_charge.scheduled_time.format("%H:%M"),
        config.night_charge.forecast_threshold_kwh
    );
    info!(
        "   Targets: vehicle {:?}, buffer {:?}, floor {}%",
        config.targets.vehicle_by_weekday.0,
        config.targets.buffer_by_weekday.0,
        config.targets.buffer_floor_percent
    );
    info!(
        "   Guard: enabled={}, min production {} W",
        config.guard.enabled, config.guard.min_production_w
    );
    info!(
        "   Intervals: update {}s, monitor {}s, surplus {}s, poll {}s",
        config.system.update_interval_secs,
        config.night_charge.monitor_interval_secs,
        config.surplus.update_interval_secs,
        config.site.poll_interval_secs
    );

    // Initialize Home Assistant client
    let ha_client = if std::env::var("SUPERVISOR_TOKEN").is_ok() {
        info!("🏠 Initializing HA client using Supervisor API...");
        Arc::new(HomeAssistantClient::from_supervisor()?)
    } else {
        info!("🏠 Initializing HA client from configuration...");
        Arc::new(HomeAssistantClient::from_config(
            config.system.ha_base_url.clone(),
            config.system.ha_token.clone(),
        )?)
    };

    // Cross-check the configured timezone against Home Assistant's
    let runtime_handle = tokio::runtime::Handle::current();
    match runtime_handle.block_on(ha_client.get_timezone()) {
        Ok(ha_tz) if ha_tz != config.location.timezone => {
            warn!(
                "⚠️ Configured timezone {} differs from Home Assistant timezone {}",
                config.location.timezone, ha_tz
            );
        }
        Ok(_) => info!("🌍 Timezone matches Home Assistant"),
        Err(e) => warn!("⚠️ Could not fetch HA timezone: {e}"),
    }

    // Create data sources and the notifier
    let charger_source: Arc<dyn ChargerDataSource> =
        Arc::new(HaChargerAdapter::new(ha_client.clone(), &config.charger));
    info!("🔌 Charger data source: {}", charger_source.name());

    let site_source: Arc<dyn SiteDataSource> =
        Arc::new(HaSiteAdapter::new(ha_client.clone(), &config.site));
    info!("📊 Site data source: {}", site_source.name());

    let notifier: Arc<dyn Notifier> = Arc::new(HaNotifier::new(ha_client));
    info!("🔔 Notifier: {}", notifier.name());

    // Window calculator is pure configuration; a bad location is fatal here
    let windows = WindowCalculator::from_config(&config.location)?;

    // The commander owns the only path to the hardware
    let commander = ChargeCommander::spawn(
        Arc::clone(&charger_source),
        CommanderTuning::from(&config.charger),
    );

    // Background readers bridge HA polling into the ECS
    let channels = spawn_readers(
        charger_source,
        site_source,
        Duration::from_secs(config.site.poll_interval_secs),
    );

    // Status surface for the host/diagnostic side
    let (publisher, mut status_rx) = SnapshotPublisher::new();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let snapshot = status_rx.borrow_and_update().clone();
            tracing::debug!(
                "📣 Status: session={} mode={} charging={} blocked={}",
                snapshot.session_active,
                snapshot.active_mode,
                snapshot.charging,
                snapshot.blocked
            );
        }
    });

    let update_interval = Duration::from_secs(config.system.update_interval_secs);
    let monitor_interval = Duration::from_secs(config.night_charge.monitor_interval_secs);
    let surplus_interval = Duration::from_secs(config.surplus.update_interval_secs);

    App::new()
        .add_plugins(TaskPoolPlugin::default())
        .add_plugins(ScheduleRunnerPlugin::run_loop(update_interval))
        .insert_resource(config)
        .insert_resource(windows)
        .insert_resource(commander)
        .insert_resource(channels)
        .insert_resource(NotifierHandle::new(notifier))
        .insert_resource(publisher)
        .insert_resource(MonitorTimer(Ticker::new(monitor_interval)))
        .insert_resource(SurplusTimer(Ticker::new(surplus_interval)))
        .add_plugins(ChargionCorePlugin)
        .run();

    Ok(())
}
