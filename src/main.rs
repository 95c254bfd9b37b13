use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use kalmanpair::config::ModelConfig;
use kalmanpair::replay::{self, ReplaySettings};
use log::LevelFilter;
use std::env;
use std::io::Write;
use std::str::FromStr;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<i32>()
        .map_err(|e| anyhow!("Invalid TIMEZONE_OFFSET: {}", e))?;
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| anyhow!("Invalid offset {}", offset_seconds))?;
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();

    log::info!("kalmanpair {}", env!("CARGO_PKG_VERSION"));
    let cfg = ModelConfig::from_env_or_yaml()?;
    log::info!(
        "model={:?} entry={} exit={} tracker={:?} sizing={:?}",
        cfg.model_kind,
        cfg.entry_z,
        cfg.exit_z,
        cfg.tracker_kind,
        cfg.sizing_mode
    );
    let settings = ReplaySettings::from_env();
    replay::run(&cfg, &settings).await?;
    Ok(())
}
