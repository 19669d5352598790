use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use drive_companion_rs::alarm::AlarmOutputs;
use drive_companion_rs::config::AppConfig;
use drive_companion_rs::eta::{spawn_eta_loop, Eta};
use drive_companion_rs::health::{health_monitor_task, FixHealth};
use drive_companion_rs::live_status::LiveStatus;
use drive_companion_rs::route_client::OsrmClient;
use drive_companion_rs::session::TrackingSession;
use drive_companion_rs::settings::SettingsStore;
use drive_companion_rs::sources::{ndjson_fix_loop, SourceStats};
use drive_companion_rs::types::GeoPoint;
use env_logger::Env;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "drive_companion")]
#[command(about = "Driving companion - smoothed GPS speed, destination and speed-limit alarms", long_about = None)]
struct Args {
    /// Newline-delimited JSON fixes, or "-" for stdin
    #[arg(long, default_value = "-")]
    fixes: String,

    /// Destination latitude
    #[arg(long, requires = "target_lon", allow_hyphen_values = true)]
    target_lat: Option<f64>,

    /// Destination longitude
    #[arg(long, requires = "target_lat", allow_hyphen_values = true)]
    target_lon: Option<f64>,

    /// Destination radius in meters
    #[arg(long)]
    radius: Option<f64>,

    /// Speed limit in km/h
    #[arg(long)]
    speed_limit: Option<f64>,

    /// Speed calibration factor, accepted inside (0.5, 1.5)
    #[arg(long)]
    calibration: Option<f64>,

    /// JSON config file with tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persisted user settings
    #[arg(long, default_value = "drive_companion_settings.json")]
    settings: PathBuf,

    /// Output directory
    #[arg(long, default_value = "drive_companion_sessions")]
    output_dir: String,

    /// OSRM base URL; enables ETA refresh when a destination is set
    #[arg(long)]
    osrm_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Drive Companion Starting", ts_now());
    println!("  Fixes: {}", args.fixes);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let config = load_config(&args)?;
    let store = SettingsStore::new(&args.settings);
    let mut settings = store.load();

    let mut session = TrackingSession::new(&config, AlarmOutputs::logging());
    session.set_alarm_preferences(settings.alarm_preferences());
    if let Some(factor) = args.calibration {
        if !session.set_calibration_factor(factor) {
            warn!("Calibration factor {} out of range, keeping 1.0", factor);
        }
    }
    session.subscribe_alarm(|active| {
        info!("Alarm {}", if active { "ON" } else { "off" });
    });

    let target = args
        .target_lat
        .zip(args.target_lon)
        .map(|(lat, lon)| GeoPoint::new(lat, lon));
    if let Some(point) = target {
        session.set_target(point, args.radius.unwrap_or(config.proximity.radius_m));
        settings.record_search(&format!("{:.5},{:.5}", point.lat, point.lon));
        if let Err(e) = store.save(&settings) {
            warn!("Failed to save settings: {}", e);
        }
    }

    // Launching the tool counts as the user gesture for audio
    session.user_gesture();
    session.start()?;

    let (fix_tx, mut fix_rx) = mpsc::channel(1024);
    let source_handle = spawn_source(&args.fixes, fix_tx).await?;

    let health = FixHealth::default();
    let health_handle = tokio::spawn(health_monitor_task(health.clone(), Duration::from_secs(2)));

    let (eta_handle, mut eta_rx) = match (target, args.osrm_url.as_deref()) {
        (Some(destination), Some(url)) => {
            let (handle, rx) = spawn_eta_loop(
                Arc::new(OsrmClient::with_base_url(url)),
                session.watch(),
                destination,
                Duration::from_secs(config.eta.refresh_secs.max(1)),
            );
            (Some(handle), Some(rx))
        }
        _ => (None, None),
    };

    let started = Instant::now();
    let status_path = Path::new(&args.output_dir).join("live_status.json");
    let mut status_tick = interval(Duration::from_secs(2));

    info!("Tracking, waiting for fixes...");

    loop {
        tokio::select! {
            fix = fix_rx.recv() => match fix {
                Some(fix) => {
                    health.update();
                    session.handle_fix(&fix);
                }
                None => {
                    info!("Fix source exhausted");
                    break;
                }
            },
            Some(eta) = next_eta(&mut eta_rx) => {
                info!("ETA {}", eta.summary());
                session.update_eta(eta);
            }
            _ = status_tick.tick() => {
                let status = LiveStatus::new(
                    &session.stats(),
                    &session.snapshot(),
                    &health.check(),
                    session.is_tracking(),
                    started.elapsed().as_secs(),
                );
                if let Err(e) = status.save(&status_path) {
                    warn!("Failed to write live status: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping...");
                break;
            }
        }
    }

    session.stop()?;
    health_handle.abort();
    if let Some(handle) = eta_handle {
        handle.abort();
    }
    // No-op when the source already finished; an interrupted read loses its stats
    source_handle.abort();
    let source_stats = match source_handle.await {
        Ok(stats) => stats,
        Err(_) => SourceStats::default(),
    };

    let final_status = LiveStatus::new(
        &session.stats(),
        &session.snapshot(),
        &health.check(),
        false,
        started.elapsed().as_secs(),
    );
    let final_path = Path::new(&args.output_dir).join("live_status_final.json");
    if let Err(e) = final_status.save(&final_path) {
        warn!("Failed to write final status: {}", e);
    }

    let stats = session.stats();
    println!("\n=== Final Stats ===");
    println!("Session: {}", stats.session_id);
    println!("Fixes accepted: {} (rejected {})", stats.fixes_accepted, stats.fixes_rejected);
    println!(
        "Source lines: {} (skipped {}, dropped {})",
        source_stats.lines, source_stats.skipped, source_stats.dropped
    );
    println!("Peak speed: {:.1} km/h", stats.peak_speed_kmh);
    println!("Alarm activations: {}", stats.alarm_activations);
    println!("Destination entries: {}", stats.target_entries);

    Ok(())
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(limit) = args.speed_limit {
        config.speed_limit.limit_kmh = limit;
    }
    if let Some(radius) = args.radius {
        config.proximity.radius_m = radius;
    }
    config.validate().context("invalid command-line override")?;
    Ok(config)
}

async fn spawn_source(
    fixes: &str,
    tx: mpsc::Sender<drive_companion_rs::RawFix>,
) -> Result<JoinHandle<SourceStats>> {
    if fixes == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        Ok(tokio::spawn(ndjson_fix_loop(reader, tx)))
    } else {
        let file = tokio::fs::File::open(fixes)
            .await
            .with_context(|| format!("opening fixes {}", fixes))?;
        Ok(tokio::spawn(ndjson_fix_loop(BufReader::new(file), tx)))
    }
}

/// Next ETA update; pends forever without a loop or once it has ended
async fn next_eta(rx: &mut Option<watch::Receiver<Option<Eta>>>) -> Option<Eta> {
    match rx {
        Some(rx) => {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            rx.borrow_and_update().clone()
        }
        None => std::future::pending().await,
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
