//! Integration tests for configuration loading

use gate_counter::infra::{Config, RangingMode};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "museum-east"

[detection]
threshold_cm = 45
consecutive_readings = 3
sensor_timeout_ms = 1500
debounce_ms = 400

[ranging]
mode = "serial"
measure_timeout_ms = 90
burst_size = 2
burst_gap_ms = 5

[ranging.sensor_a]
device = "/dev/ttyUSB0"
baud = 115200

[ranging.sensor_b]
device = "/dev/ttyUSB1"

[control]
tick_interval_ms = 40

[http]
port = 8080

[metrics]
interval_secs = 30
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "museum-east");
    assert_eq!(config.threshold_cm(), 45);
    assert_eq!(config.consecutive_readings(), 3);
    assert_eq!(config.sensor_timeout_ms(), 1500);
    assert_eq!(config.debounce_ms(), 400);
    assert_eq!(config.ranging_mode(), RangingMode::Serial);
    assert_eq!(config.measure_timeout_ms(), 90);
    assert_eq!(config.burst_size(), 2);
    assert_eq!(config.burst_gap_ms(), 5);
    assert_eq!(config.sensor_a_device(), "/dev/ttyUSB0");
    assert_eq!(config.sensor_a_baud(), 115200);
    assert_eq!(config.sensor_b_device(), "/dev/ttyUSB1");
    assert_eq!(config.sensor_b_baud(), 9600);
    assert_eq!(config.tick_interval_ms(), 40);
    assert_eq!(config.http_port(), 8080);
    assert_eq!(config.metrics_interval_secs(), 30);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_minimal_config_uses_section_defaults() {
    let temp_file = write_config(
        r#"
[detection]
threshold_cm = 30
consecutive_readings = 2
sensor_timeout_ms = 1000
debounce_ms = 250

[ranging]
mode = "sim"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "gate");
    assert_eq!(config.ranging_mode(), RangingMode::Sim);
    assert_eq!(config.sim_period_ms(), 4000);
    assert_eq!(config.sim_transit_ms(), 240);
    assert_eq!(config.sim_dropout_every(), 7);
    assert_eq!(config.tick_interval_ms(), 50);
    assert_eq!(config.http_port(), 80);
    assert_eq!(config.sensor_a_device(), "/dev/ttyAMA2");
}

#[test]
fn test_missing_detection_section_is_an_error() {
    let temp_file = write_config(
        r#"
[site]
id = "no-detection"
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_single_reading_window_rejected() {
    let temp_file = write_config(
        r#"
[detection]
threshold_cm = 30
consecutive_readings = 1
sensor_timeout_ms = 1000
debounce_ms = 250
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("consecutive_readings"));
}

#[test]
fn test_threshold_beyond_range_rejected() {
    let temp_file = write_config(
        r#"
[detection]
threshold_cm = 400
consecutive_readings = 2
sensor_timeout_ms = 1000
debounce_ms = 250
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_falls_back_to_defaults() {
    let config = Config::load_from_path("/nonexistent/gate-counter.toml");

    assert_eq!(config.config_file(), "default");
    assert_eq!(config.threshold_cm(), 30);
    assert_eq!(config.consecutive_readings(), 2);
    assert_eq!(config.sensor_timeout_ms(), 1000);
    assert_eq!(config.debounce_ms(), 250);
}

#[test]
fn test_shipped_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.ranging_mode(), RangingMode::Sim);
}

#[test]
fn test_shipped_gate_config_burst_fits_measure_timeout() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/gate.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.ranging_mode(), RangingMode::Serial);

    let bursts = config.burst_size() as u64;
    let worst_case = config.sample_timeout_ms() * bursts + config.burst_gap_ms() * (bursts - 1);
    assert!(worst_case <= config.measure_timeout_ms());
}

#[test]
fn test_burst_gaps_exhausting_measure_timeout_rejected() {
    let temp_file = write_config(
        r#"
[detection]
threshold_cm = 30
consecutive_readings = 2
sensor_timeout_ms = 1000
debounce_ms = 250

[ranging]
measure_timeout_ms = 30
burst_size = 4
burst_gap_ms = 10
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("no time per sample"));
}
