//! Shared types for the gate counter

use serde::{Serialize, Serializer};

/// Identity of one of the two ranging sensors.
///
/// A sits on the outside of the gate, B on the inside, so A-then-B is an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    A,
    B,
}

impl SensorId {
    pub const ALL: [SensorId; 2] = [SensorId::A, SensorId::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::A => "a",
            SensorId::B => "b",
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        match self {
            SensorId::A => 0,
            SensorId::B => 1,
        }
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a confirmed crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filtered range reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    Cm(u32),
    /// No echo within the sensor timeout
    #[default]
    OutOfRange,
}

impl Distance {
    /// Maximum range of the sensors; also what an out-of-range reading reports as
    pub const MAX_RANGE_CM: u32 = 400;

    /// Build a reading from a raw centimetre value, folding anything at or
    /// beyond the maximum range into `OutOfRange`.
    pub fn from_cm(cm: u32) -> Self {
        if cm >= Self::MAX_RANGE_CM {
            Distance::OutOfRange
        } else {
            Distance::Cm(cm)
        }
    }

    /// True when an object is closer than `threshold_cm`. Never true when out of range.
    #[inline]
    pub fn is_below(&self, threshold_cm: u32) -> bool {
        match *self {
            Distance::Cm(cm) => cm < threshold_cm,
            Distance::OutOfRange => false,
        }
    }

    pub fn as_cm(&self) -> u32 {
        match *self {
            Distance::Cm(cm) => cm,
            Distance::OutOfRange => Self::MAX_RANGE_CM,
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_cm())
    }
}

impl Serialize for Distance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_cm())
    }
}

/// Visitor counts for the lifetime of the process.
///
/// `current_visitors` is clamped at zero on its own, so it can drift below
/// `count_in - count_out` after an exit recorded before any entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisitorCounters {
    count_in: u64,
    count_out: u64,
    current_visitors: u64,
}

impl VisitorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, direction: Direction) {
        match direction {
            Direction::In => {
                self.count_in += 1;
                self.current_visitors += 1;
            }
            Direction::Out => {
                self.count_out += 1;
                self.current_visitors = self.current_visitors.saturating_sub(1);
            }
        }
    }

    pub fn count_in(&self) -> u64 {
        self.count_in
    }

    pub fn count_out(&self) -> u64 {
        self.count_out
    }

    pub fn current_visitors(&self) -> u64 {
        self.current_visitors
    }
}

/// Read-only view handed to the display and the web surface.
///
/// Serializes to the `/data` payload: `{"in","out","current","distanceA","distanceB"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterSnapshot {
    #[serde(rename = "in")]
    pub count_in: u64,
    #[serde(rename = "out")]
    pub count_out: u64,
    #[serde(rename = "current")]
    pub current_visitors: u64,
    #[serde(rename = "distanceA")]
    pub distance_a: Distance,
    #[serde(rename = "distanceB")]
    pub distance_b: Distance,
    #[serde(skip)]
    pub ticks: u64,
}

impl CounterSnapshot {
    pub fn new(counters: &VisitorCounters, distance_a: Distance, distance_b: Distance, ticks: u64) -> Self {
        Self {
            count_in: counters.count_in(),
            count_out: counters.count_out(),
            current_visitors: counters.current_visitors(),
            distance_a,
            distance_b,
            ticks,
        }
    }
}
