use std::io::Write;

use kalmanpair::config::{ModelConfig, ModelKind};
use kalmanpair::replay::{run, ReplaySettings};
use kalmanpair::synthetic::SyntheticPair;

fn write_feed(n: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "timestamp,price1,price2").unwrap();
    for tick in SyntheticPair::default().generate(n) {
        writeln!(file, "{},{},{}", tick.timestamp, tick.price1, tick.price2).unwrap();
    }
    file
}

#[tokio::test]
async fn csv_replay_matches_synthetic_replay() {
    let config = ModelConfig {
        model_kind: ModelKind::Grid,
        delta_steps: 3,
        ve_steps: 2,
        tracking_window: 20,
        entry_z: 1.2,
        ..ModelConfig::default()
    };
    let file = write_feed(250);
    let from_file = ReplaySettings {
        file: Some(file.path().to_string_lossy().into_owned()),
        ..ReplaySettings::default()
    };
    let synthetic = ReplaySettings {
        synthetic_ticks: 250,
        ..ReplaySettings::default()
    };

    let a = run(&config, &from_file).await.unwrap();
    let b = run(&config, &synthetic).await.unwrap();
    // `{}` formatting of f64 round-trips exactly
    assert_eq!(a, b);
    assert_eq!(a.ticks, 250 - (10 + 20 - 1));
    assert!(a.timeouts <= a.trades);
}

#[tokio::test]
async fn missing_replay_file_is_an_error() {
    let settings = ReplaySettings {
        file: Some("/nonexistent/feed.csv".to_string()),
        ..ReplaySettings::default()
    };
    let err = run(&ModelConfig::default(), &settings).await.unwrap_err();
    assert!(format!("{:#}", err).contains("failed to open replay file"));
}
