//! Configuration loading from TOML files
//!
//! The binary picks the file via `--config <path>`, then the `CONFIG_FILE`
//! environment variable, then `config/dev.toml` (see `main.rs`).

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangingMode {
    /// UART ultrasonic modules on two serial ports
    Serial,
    /// Deterministic walker, no hardware
    Sim,
}

impl RangingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangingMode::Serial => "serial",
            RangingMode::Sim => "sim",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    pub threshold_cm: u32,
    pub consecutive_readings: usize,
    pub sensor_timeout_ms: u64,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialPortConfig {
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
}

fn default_serial_baud() -> u32 {
    9600
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangingConfig {
    #[serde(default = "default_ranging_mode")]
    pub mode: RangingMode,
    /// Upper bound on one measure call (whole burst)
    #[serde(default = "default_measure_timeout_ms")]
    pub measure_timeout_ms: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: usize,
    #[serde(default = "default_burst_gap_ms")]
    pub burst_gap_ms: u64,
    #[serde(default = "default_sensor_a")]
    pub sensor_a: SerialPortConfig,
    #[serde(default = "default_sensor_b")]
    pub sensor_b: SerialPortConfig,
}

fn default_ranging_mode() -> RangingMode {
    RangingMode::Serial
}

fn default_measure_timeout_ms() -> u64 {
    120
}

fn default_burst_size() -> usize {
    3
}

fn default_burst_gap_ms() -> u64 {
    10
}

fn default_sensor_a() -> SerialPortConfig {
    SerialPortConfig { device: "/dev/ttyAMA2".to_string(), baud: default_serial_baud() }
}

fn default_sensor_b() -> SerialPortConfig {
    SerialPortConfig { device: "/dev/ttyAMA3".to_string(), baud: default_serial_baud() }
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            mode: default_ranging_mode(),
            measure_timeout_ms: default_measure_timeout_ms(),
            burst_size: default_burst_size(),
            burst_gap_ms: default_burst_gap_ms(),
            sensor_a: default_sensor_a(),
            sensor_b: default_sensor_b(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Time between simulated people
    #[serde(default = "default_sim_period_ms")]
    pub period_ms: u64,
    /// How long each sensor stays occluded per person
    #[serde(default = "default_sim_transit_ms")]
    pub transit_ms: u64,
    /// Every n-th occluded sample reads far (0 disables)
    #[serde(default = "default_sim_dropout_every")]
    pub dropout_every: u64,
}

fn default_sim_period_ms() -> u64 {
    4000
}

fn default_sim_transit_ms() -> u64 {
    240
}

fn default_sim_dropout_every() -> u64 {
    7
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            period_ms: default_sim_period_ms(),
            transit_ms: default_sim_transit_ms(),
            dropout_every: default_sim_dropout_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    50
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_interval_ms: default_tick_interval_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Counter page / JSON / metrics port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    80
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier, used as the Prometheus `site` label
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "gate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub ranging: RangingConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    threshold_cm: u32,
    consecutive_readings: usize,
    sensor_timeout_ms: u64,
    debounce_ms: u64,
    ranging_mode: RangingMode,
    measure_timeout_ms: u64,
    burst_size: usize,
    burst_gap_ms: u64,
    sensor_a_device: String,
    sensor_a_baud: u32,
    sensor_b_device: String,
    sensor_b_baud: u32,
    sim_period_ms: u64,
    sim_transit_ms: u64,
    sim_dropout_every: u64,
    tick_interval_ms: u64,
    http_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "gate".to_string(),
            threshold_cm: 30,
            consecutive_readings: 2,
            sensor_timeout_ms: 1000,
            debounce_ms: 250,
            ranging_mode: RangingMode::Serial,
            measure_timeout_ms: 120,
            burst_size: 3,
            burst_gap_ms: 10,
            sensor_a_device: "/dev/ttyAMA2".to_string(),
            sensor_a_baud: 9600,
            sensor_b_device: "/dev/ttyAMA3".to_string(),
            sensor_b_baud: 9600,
            sim_period_ms: 4000,
            sim_transit_ms: 240,
            sim_dropout_every: 7,
            tick_interval_ms: 50,
            http_port: 80,
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self {
            site_id: toml_config.site.id,
            threshold_cm: toml_config.detection.threshold_cm,
            consecutive_readings: toml_config.detection.consecutive_readings,
            sensor_timeout_ms: toml_config.detection.sensor_timeout_ms,
            debounce_ms: toml_config.detection.debounce_ms,
            ranging_mode: toml_config.ranging.mode,
            measure_timeout_ms: toml_config.ranging.measure_timeout_ms,
            burst_size: toml_config.ranging.burst_size,
            burst_gap_ms: toml_config.ranging.burst_gap_ms,
            sensor_a_device: toml_config.ranging.sensor_a.device,
            sensor_a_baud: toml_config.ranging.sensor_a.baud,
            sensor_b_device: toml_config.ranging.sensor_b.device,
            sensor_b_baud: toml_config.ranging.sensor_b.baud,
            sim_period_ms: toml_config.sim.period_ms,
            sim_transit_ms: toml_config.sim.transit_ms,
            sim_dropout_every: toml_config.sim.dropout_every,
            tick_interval_ms: toml_config.control.tick_interval_ms,
            http_port: toml_config.http.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a path, falling back to defaults on any error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.consecutive_readings >= 2,
            "detection.consecutive_readings must be at least 2 (got {})",
            self.consecutive_readings
        );
        ensure!(
            (1..400).contains(&self.threshold_cm),
            "detection.threshold_cm must be within 1..400 (got {})",
            self.threshold_cm
        );
        ensure!(self.burst_size >= 1, "ranging.burst_size must be at least 1");
        ensure!(self.measure_timeout_ms >= 1, "ranging.measure_timeout_ms must be at least 1");
        ensure!(
            self.sample_timeout_ms() >= 1,
            "ranging.measure_timeout_ms ({}) leaves no time per sample for burst_size {} with burst_gap_ms {}",
            self.measure_timeout_ms,
            self.burst_size,
            self.burst_gap_ms
        );
        ensure!(self.tick_interval_ms >= 1, "control.tick_interval_ms must be at least 1");
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn threshold_cm(&self) -> u32 {
        self.threshold_cm
    }

    pub fn consecutive_readings(&self) -> usize {
        self.consecutive_readings
    }

    pub fn sensor_timeout_ms(&self) -> u64 {
        self.sensor_timeout_ms
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn ranging_mode(&self) -> RangingMode {
        self.ranging_mode
    }

    pub fn measure_timeout_ms(&self) -> u64 {
        self.measure_timeout_ms
    }

    pub fn burst_size(&self) -> usize {
        self.burst_size
    }

    pub fn burst_gap_ms(&self) -> u64 {
        self.burst_gap_ms
    }

    /// Read deadline for one sample, so that a whole burst (samples plus the
    /// gaps between them) fits inside `measure_timeout_ms`
    pub fn sample_timeout_ms(&self) -> u64 {
        let samples = self.burst_size.max(1) as u64;
        let gaps = (samples - 1).saturating_mul(self.burst_gap_ms);
        self.measure_timeout_ms.saturating_sub(gaps) / samples
    }

    pub fn sensor_a_device(&self) -> &str {
        &self.sensor_a_device
    }

    pub fn sensor_a_baud(&self) -> u32 {
        self.sensor_a_baud
    }

    pub fn sensor_b_device(&self) -> &str {
        &self.sensor_b_device
    }

    pub fn sensor_b_baud(&self) -> u32 {
        self.sensor_b_baud
    }

    pub fn sim_period_ms(&self) -> u64 {
        self.sim_period_ms
    }

    pub fn sim_transit_ms(&self) -> u64 {
        self.sim_transit_ms
    }

    pub fn sim_dropout_every(&self) -> u64 {
        self.sim_dropout_every
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shorten the control-loop period
    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Builder method for tests to switch the ranging source
    pub fn with_ranging_mode(mut self, mode: RangingMode) -> Self {
        self.ranging_mode = mode;
        self
    }
}
