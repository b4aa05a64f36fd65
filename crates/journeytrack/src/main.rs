//! `jtrack` - CLI for journeytrack
//!
//! This binary tracks vehicles against a fleet API and manages the journeys
//! it has recorded.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};

use journeytrack::api::{FleetApi, HttpFleetApi};
use journeytrack::cli::{
    Cli, Command, ConfigCommand, ExportCommand, HealthCommand, HistoryCommand, ResumeCommand,
    TrackCommand,
};
use journeytrack::clock::{Clock, SystemClock};
use journeytrack::export::{self, ExportFormat};
use journeytrack::resolver::{GeolocationProvider, NoGeolocation, StaticGeolocation};
use journeytrack::{
    init_logging, Config, HealthMonitor, Journey, JourneyManager, JourneyUpdate,
    PersistenceStore, PositionResolver, Storage, UpdateKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Track(cmd) => handle_track(&config, cmd).await,
        Command::Resume(cmd) => handle_resume(&config, &cmd).await,
        Command::History(cmd) => handle_history(&config, &cmd),
        Command::Export(cmd) => handle_export(&config, cmd),
        Command::Health(cmd) => handle_health(&config, &cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// The running pieces of a tracking session.
struct Engine {
    manager: Arc<JourneyManager>,
    health: Arc<HealthMonitor>,
}

fn fleet_api(config: &Config) -> anyhow::Result<Arc<dyn FleetApi>> {
    let api = HttpFleetApi::new(config.api.base_url.clone(), config.request_timeout())
        .context("failed to build fleet API client")?;
    Ok(Arc::new(api))
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    let api = fleet_api(config)?;
    let geolocation: Arc<dyn GeolocationProvider> = match config.geolocation_fix() {
        Some(fix) => Arc::new(StaticGeolocation::new(fix)),
        None => Arc::new(NoGeolocation),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (persistence, _writer) = PersistenceStore::spawn(open_storage(config)?);

    let health = Arc::new(HealthMonitor::new(Arc::clone(&api), config.probe_interval()));
    let resolver = PositionResolver::new(
        Arc::clone(&api),
        geolocation,
        Arc::clone(&clock),
        config.resolver_settings(),
    );
    let manager = JourneyManager::new(
        api,
        resolver,
        clock,
        persistence,
        health.flag(),
        config.tracking_settings(),
        config.alert_thresholds(),
    );
    Ok(Engine { manager, health })
}

async fn wait_for_exit(duration: Option<u64>) {
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
    }
}

async fn print_updates(mut rx: broadcast::Receiver<JourneyUpdate>) {
    loop {
        match rx.recv().await {
            Ok(update) => {
                if update.kind == UpdateKind::PointAdded {
                    if let Some(point) = update.journey.last_point() {
                        println!(
                            "{}  {:>10.6} {:>11.6}  {:>6.1} km/h  {:<11}  {:.3} km",
                            update.vehicle_id,
                            point.latitude,
                            point.longitude,
                            point.speed,
                            point.source,
                            update.journey.total_distance
                        );
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Update printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn handle_track(config: &Config, cmd: TrackCommand) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let probe = engine.health.start();
    let printer = tokio::spawn(print_updates(engine.manager.subscribe()));

    let resumed = engine.manager.recover().await?;
    for journey in &resumed {
        println!("Resumed journey {} for {}", journey.journey_id, journey.vehicle_id);
    }

    let mut started = 0;
    for vehicle_id in &cmd.vehicles {
        if engine.manager.active_journey(vehicle_id).is_some() {
            continue;
        }
        match engine.manager.start(vehicle_id).await {
            Ok(journey) => {
                started += 1;
                let seed = &journey.route_points[0];
                println!(
                    "Tracking {} ({}) from {:.6}, {:.6} via {}",
                    vehicle_id,
                    journey.vehicle_label(),
                    seed.latitude,
                    seed.longitude,
                    seed.source
                );
            }
            Err(e) => eprintln!("Cannot track {vehicle_id}: {e}"),
        }
    }
    if started == 0 && resumed.is_empty() {
        probe.abort();
        bail!("no vehicle could be tracked");
    }

    wait_for_exit(cmd.duration).await;

    let completed = engine.manager.stop_all(&cmd.vehicles).await;
    let suspended = engine.manager.shutdown().await?;

    let export_format = cmd.export.map(ExportFormat::from);
    for journey in &completed {
        print_summary(journey);
        if let Some(format) = export_format {
            match export::write_to_dir(journey, format, &config.export_dir()) {
                Ok(path) => println!("  Exported:   {}", path.display()),
                Err(e) => warn!(
                    journey_id = %journey.journey_id,
                    error = %e,
                    "Failed to export journey"
                ),
            }
        }
    }
    if suspended > 0 {
        println!("{suspended} journey(s) left active; run `jtrack resume` to continue them.");
    }
    probe.abort();
    printer.abort();
    report_write_failures(&engine.manager);
    Ok(())
}

async fn handle_resume(config: &Config, cmd: &ResumeCommand) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let printer = tokio::spawn(print_updates(engine.manager.subscribe()));

    let resumed = engine.manager.recover().await?;
    if resumed.is_empty() {
        println!("No active journeys to resume.");
        printer.abort();
        return Ok(());
    }
    for journey in &resumed {
        println!(
            "Resumed journey {} for {} ({} points)",
            journey.journey_id,
            journey.vehicle_id,
            journey.route_points.len()
        );
    }

    let probe = engine.health.start();
    wait_for_exit(cmd.duration).await;

    let suspended = engine.manager.shutdown().await?;
    info!(suspended, "Tracking suspended");
    probe.abort();
    printer.abort();
    report_write_failures(&engine.manager);
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let journeys = storage.history(cmd.vehicle.as_deref(), cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&journeys)?);
        return Ok(());
    }

    if journeys.is_empty() {
        println!("No completed journeys.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<16}  {:<20}  {:>6}  {:>10}",
        "JOURNEY", "VEHICLE", "STARTED", "POINTS", "DISTANCE"
    );
    for journey in &journeys {
        println!(
            "{:<36}  {:<16}  {:<20}  {:>6}  {:>7.2} km",
            journey.journey_id,
            journey.vehicle_label(),
            journey.start_time.format("%Y-%m-%d %H:%M:%S"),
            journey.route_points.len(),
            journey.total_distance
        );
    }

    let stats = storage.stats()?;
    println!();
    println!(
        "{} completed, {} active, {:.2} km recorded",
        stats.completed_journeys, stats.active_journeys, stats.total_distance_km
    );
    Ok(())
}

fn handle_export(config: &Config, cmd: ExportCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let Some(journey) = storage.find_history(&cmd.journey_id)? else {
        bail!("no completed journey with id {}", cmd.journey_id);
    };
    let dir: PathBuf = cmd.output.unwrap_or_else(|| config.export_dir());
    let path = export::write_to_dir(&journey, cmd.format.into(), &dir)?;
    println!("{}", path.display());
    Ok(())
}

async fn handle_health(config: &Config, cmd: &HealthCommand) -> anyhow::Result<()> {
    let monitor = HealthMonitor::new(fleet_api(config)?, config.probe_interval());
    let healthy = monitor.probe_once().await;

    if cmd.json {
        let status = serde_json::json!({
            "base_url": config.api.base_url,
            "healthy": healthy,
            "fallback_mode": monitor.is_fallback(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if healthy {
        println!("{}: healthy", config.api.base_url);
    } else {
        println!("{}: unreachable (tracking would run in fallback mode)", config.api.base_url);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[API]");
                println!("  Base URL:           {}", config.api.base_url);
                println!("  Request timeout:    {}s", config.api.request_timeout_secs);
                println!();
                println!("[Tracking]");
                println!("  Poll interval:      {}s", config.tracking.poll_interval_secs);
                println!(
                    "  Fallback interval:  {}s",
                    config.tracking.fallback_poll_interval_secs
                );
                println!("  Min distance:       {} m", config.tracking.min_distance_m);
                println!(
                    "  Min speed change:   {} km/h",
                    config.tracking.min_speed_change_kmh
                );
                println!("  Max point gap:      {}s", config.tracking.max_point_gap_secs);
                println!();
                println!("[Alerts]");
                println!("  Speed limit:        {} km/h", config.alerts.speed_limit_kmh);
                println!(
                    "  Harsh accel/brake:  {} / {} km/h/s",
                    config.alerts.harsh_acceleration_kmh_per_s,
                    config.alerts.harsh_braking_kmh_per_s
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Export dir:         {}", config.export_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_summary(journey: &Journey) {
    println!("Journey {} ({})", journey.journey_id, journey.vehicle_label());
    println!("  Points:     {}", journey.route_points.len());
    println!("  Distance:   {:.3} km", journey.total_distance);
    println!(
        "  Speed:      avg {:.1} km/h, max {:.1} km/h",
        journey.avg_speed, journey.max_speed
    );
    println!("  Alerts:     {}", journey.alerts.len());
    if let Some(summary) = &journey.summary {
        println!("  Duration:   {}s", summary.duration_secs);
        println!("  Stops:      {}", summary.stops.len());
        if let Some(address) = &summary.start_address {
            println!("  From:       {address}");
        }
        if let Some(address) = &summary.end_address {
            println!("  To:         {address}");
        }
    }
    if journey.fallback_mode_used {
        println!("  Note:       recorded partly in fallback mode");
    }
}

fn report_write_failures(manager: &JourneyManager) {
    let failures = manager.persistence().failure_count();
    if failures > 0 {
        warn!(failures, "Some journey writes failed during this session");
    }
}
