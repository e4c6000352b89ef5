//! Services - counting logic
//!
//! - `detection_filter` - Per-sensor N-sample presence filter
//! - `crossing` - Two-sensor crossing state machine with debounce
//! - `counter` - Control loop tying ranging, filters, machine and counters together

pub mod counter;
pub mod crossing;
pub mod detection_filter;

pub use counter::GateCounter;
pub use crossing::{CrossingState, CrossingStateMachine, TickOutcome};
pub use detection_filter::DetectionFilter;
