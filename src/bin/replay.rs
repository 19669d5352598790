use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use drive_companion_rs::alarm::AlarmOutputs;
use drive_companion_rs::config::AppConfig;
use drive_companion_rs::session::TrackingSession;
use drive_companion_rs::types::{GeoPoint, RawFix};
use env_logger::Env;
use flate2::read::GzDecoder;
use log::warn;
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a fix log (*.json or *.json.gz)
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of fix logs to batch replay
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON config file with tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speed limit in km/h, overrides the config
    #[arg(long)]
    speed_limit: Option<f64>,

    /// Destination radius in meters, overrides the log and config
    #[arg(long)]
    radius: Option<f64>,
}

#[derive(Deserialize)]
struct ReplayTarget {
    lat: f64,
    lon: f64,
    radius_m: Option<f64>,
}

/// Either a bare array of fixes or an object carrying an optional target
#[derive(Deserialize)]
#[serde(untagged)]
enum LogFile {
    Session {
        fixes: Vec<RawFix>,
        #[serde(default)]
        target: Option<ReplayTarget>,
    },
    Fixes(Vec<RawFix>),
}

impl LogFile {
    fn into_parts(self) -> (Vec<RawFix>, Option<ReplayTarget>) {
        match self {
            LogFile::Session { fixes, target } => (fixes, target),
            LogFile::Fixes(fixes) => (fixes, None),
        }
    }
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn is_fix_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn run_once(path: &Path, config: &AppConfig, args: &Args) -> anyhow::Result<serde_json::Value> {
    let (fixes, target) = load_log(path)?.into_parts();

    let mut session = TrackingSession::new(config, AlarmOutputs::noop());
    if let Some(target) = target.as_ref() {
        let radius = args
            .radius
            .or(target.radius_m)
            .unwrap_or(config.proximity.radius_m);
        session.set_target(GeoPoint::new(target.lat, target.lon), radius);
    }
    session.start()?;

    let mut prev_speed: Option<f64> = None;
    let mut max_step = 0.0_f64;
    let mut max_step_ts: Option<i64> = None;
    let mut speeds = Vec::with_capacity(fixes.len());

    for fix in &fixes {
        let snapshot = session.handle_fix(fix);
        let speed = snapshot.current_speed;
        if let Some(prev) = prev_speed {
            let step = (speed - prev).abs();
            if step > max_step {
                max_step = step;
                max_step_ts = fix.timestamp;
            }
        }
        prev_speed = Some(speed);
        speeds.push(speed);
    }

    let mean_speed = if speeds.is_empty() {
        0.0
    } else {
        speeds.iter().sum::<f64>() / speeds.len() as f64
    };
    let snapshot = session.snapshot();
    session.stop()?;
    let stats = session.stats();

    Ok(json!({
        "log": path.display().to_string(),
        "fixes": fixes.len(),
        "fixes_accepted": stats.fixes_accepted,
        "fixes_rejected": stats.fixes_rejected,
        "peak_speed_kmh": stats.peak_speed_kmh,
        "mean_speed_kmh": mean_speed,
        "final_speed_kmh": snapshot.current_speed,
        "final_confidence": snapshot.speed_confidence,
        "max_speed_step_kmh": max_step,
        "max_step_ts": max_step_ts,
        "alarm_activations": stats.alarm_activations,
        "near_target_entries": stats.target_entries,
        "speed_limit_kmh": config.speed_limit.limit_kmh,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(limit) = args.speed_limit {
        config.speed_limit.limit_kmh = limit;
    }
    config.validate()?;

    let mut results = Vec::new();

    if let Some(dir) = args.log_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_fix_log(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            match run_once(&path, &config, &args) {
                Ok(res) => results.push(res),
                Err(e) => warn!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, &args)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
