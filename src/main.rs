use clap::{Parser, ValueEnum};
use sensor_log::{Config, EventSource, SessionController, SimulatedSource};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Location,
    Motion,
}

/// Record one sensor session to CSV.
///
/// Uses a simulated sensor. Ctrl-C behaves like the app moving to the
/// background: the session stops and whatever was recorded is saved.
#[derive(Parser, Debug)]
#[command(name = "sensor-log", version)]
struct Args {
    /// Sensor to record
    #[arg(long, value_enum, default_value_t = Kind::Location)]
    kind: Kind,

    /// Stop automatically after this many seconds (0 disables)
    #[arg(long)]
    duration: Option<u64>,

    /// Directory for CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Sampling period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Stop when no sample arrives for this many seconds
    #[arg(long)]
    liveness_secs: Option<u64>,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(secs) = self.duration {
            config.max_duration_secs = secs;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(ms) = self.interval_ms {
            config.update_interval_ms = ms;
        }
        if let Some(secs) = self.liveness_secs {
            config.liveness_timeout_secs = Some(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}; using default settings", e);
            Config::default()
        }
    };
    let config = args.apply(config);
    let period = config.update_interval();

    let result = match args.kind {
        Kind::Location => record(SimulatedSource::location(period), config).await,
        Kind::Motion => record(SimulatedSource::motion(period), config).await,
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn record<E: EventSource>(
    source: E,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (handle, task) = SessionController::spawn(source, config)?;
    let mut status = handle.subscribe();

    handle.start().await?;
    println!("{}", handle.status().message);

    let mut reported = 0;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                if snapshot.recorded_count >= reported + 10 {
                    reported = snapshot.recorded_count;
                    if let Some(latest) = snapshot.recent.last() {
                        println!("{:>5} recorded | {}", reported, latest);
                    }
                }
                if !snapshot.recording && snapshot.exports_in_flight == 0 {
                    println!("{}", snapshot.message);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping as if backgrounded");
                handle.notify_background();
            }
        }
    }

    handle.shutdown();
    task.await?;
    Ok(())
}
