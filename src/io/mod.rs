//! IO modules - external system interfaces
//!
//! - `ranging` - Ranging source trait and burst averaging
//! - `serial_ranging` - UART ultrasonic modules
//! - `sim_ranging` - Simulated walkers for bench runs
//! - `http` - Status page, `/data` JSON and Prometheus metrics
//! - `display` - 20x2 character LCD rendering

pub mod display;
pub mod http;
pub mod ranging;
pub mod serial_ranging;
pub mod sim_ranging;

pub use display::render_lcd;
pub use http::{start_http_server, HttpState};
pub use ranging::RangingSource;
pub use serial_ranging::SerialRanging;
pub use sim_ranging::SimulatedRanging;
