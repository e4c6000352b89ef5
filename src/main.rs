//! Gate counter - two-sensor visitor counting at a doorway
//!
//! Two ultrasonic rangers sit a short way apart across the gate. Which one a
//! body breaks first gives the direction of travel.
//!
//! Module structure:
//! - `domain/` - Sensor ids, distances, counters, snapshots
//! - `io/` - Ranging sources (serial, simulated), web server, LCD rendering
//! - `services/` - Detection filter, crossing state machine, control loop
//! - `infra/` - Config, Metrics

use clap::Parser;
use gate_counter::infra::{Config, Metrics, RangingMode};
use gate_counter::io::{render_lcd, start_http_server, HttpState, RangingSource, SerialRanging, SimulatedRanging};
use gate_counter::services::GateCounter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gate counter - counts visitors through a doorway with two range sensors
#[derive(Parser, Debug)]
#[command(name = "gate-counter", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug shows every state transition, trace shows every tick
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "gate-counter starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        ranging_mode = %config.ranging_mode().as_str(),
        threshold_cm = %config.threshold_cm(),
        consecutive_readings = %config.consecutive_readings(),
        sensor_timeout_ms = %config.sensor_timeout_ms(),
        debounce_ms = %config.debounce_ms(),
        tick_interval_ms = %config.tick_interval_ms(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let counter = GateCounter::new(&config, metrics.clone());

    // Status web server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = HttpState::new(counter.subscribe(), metrics.clone(), config.site_id().to_string());
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(http_port, state, http_shutdown).await {
                tracing::error!(error = %e, "http_server_error");
            }
        });
    }

    // LCD mirror in the log, refreshed whenever the snapshot changes
    let mut lcd_rx = counter.subscribe();
    tokio::spawn(async move {
        while lcd_rx.changed().await.is_ok() {
            let [top, bottom] = render_lcd(&lcd_rx.borrow_and_update());
            debug!(line1 = %top, line2 = %bottom, "lcd");
        }
    });

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut source: Box<dyn RangingSource> = match config.ranging_mode() {
        RangingMode::Serial => Box::new(SerialRanging::new(&config)),
        RangingMode::Sim => Box::new(SimulatedRanging::new(&config)),
    };

    // Runs until Ctrl+C
    counter.run(source.as_mut(), shutdown_rx).await;

    info!("gate-counter shutdown complete");
    Ok(())
}
