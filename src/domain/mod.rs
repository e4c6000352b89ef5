//! Domain models - core types shared by the counter pipeline
//!
//! - `Distance` - one filtered range reading (or out of range)
//! - `SensorId` / `Direction` - which sensor, which way
//! - `VisitorCounters` - process-wide in/out/current counts
//! - `CounterSnapshot` - read-only view for display and web consumers

pub mod types;

pub use types::{CounterSnapshot, Direction, Distance, SensorId, VisitorCounters};
