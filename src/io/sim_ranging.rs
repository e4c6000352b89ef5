//! Simulated ranging for bench runs without sensors
//!
//! One person crosses every `period_ms`, alternating entry and exit. The
//! first sensor is occluded for `transit_ms` and the second one starts
//! halfway through, the way a body moves through a gate. Every
//! `dropout_every`-th occluded sample reads far, to exercise the filter.

use crate::domain::types::{Direction, Distance, SensorId};
use crate::infra::config::Config;
use crate::io::ranging::RangingSource;
use async_trait::async_trait;
use std::time::Instant;

/// What an empty gate reads (the opposite post)
const AMBIENT_CM: u32 = 180;
/// What a body in the beam reads
const OCCLUDED_CM: u32 = 15;

pub struct SimulatedRanging {
    started: Instant,
    period_ms: u64,
    transit_ms: u64,
    dropout_every: u64,
    occluded_samples: [u64; 2],
}

impl SimulatedRanging {
    pub fn new(config: &Config) -> Self {
        Self::with_timing(config.sim_period_ms(), config.sim_transit_ms(), config.sim_dropout_every())
    }

    pub fn with_timing(period_ms: u64, transit_ms: u64, dropout_every: u64) -> Self {
        Self {
            started: Instant::now(),
            period_ms: period_ms.max(1),
            transit_ms,
            dropout_every,
            occluded_samples: [0; 2],
        }
    }

    /// Direction of the person walking in cycle `cycle`
    pub fn direction_of(cycle: u64) -> Direction {
        if cycle % 2 == 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Reading for `sensor` at `t_ms` after start
    pub fn distance_at(&mut self, sensor: SensorId, t_ms: u64) -> Distance {
        let cycle = t_ms / self.period_ms;
        // Each person steps in halfway through their cycle
        let Some(phase) = (t_ms % self.period_ms).checked_sub(self.period_ms / 2) else {
            return Distance::Cm(AMBIENT_CM);
        };

        let first = match Self::direction_of(cycle) {
            Direction::In => SensorId::A,
            Direction::Out => SensorId::B,
        };
        let offset = if sensor == first { 0 } else { self.transit_ms / 2 };

        let occluded = phase >= offset && phase < offset + self.transit_ms;
        if !occluded {
            return Distance::Cm(AMBIENT_CM);
        }

        let count = &mut self.occluded_samples[sensor.index()];
        *count += 1;
        if self.dropout_every > 0 && *count % self.dropout_every == 0 {
            tracing::trace!(sensor = %sensor, t_ms = %t_ms, "sim_dropout");
            return Distance::OutOfRange;
        }
        Distance::Cm(OCCLUDED_CM)
    }
}

#[async_trait]
impl RangingSource for SimulatedRanging {
    async fn measure(&mut self, sensor: SensorId) -> Distance {
        let t_ms = self.started.elapsed().as_millis() as u64;
        self.distance_at(sensor, t_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_empty_before_first_person() {
        let mut sim = SimulatedRanging::with_timing(4000, 240, 0);
        assert_eq!(sim.distance_at(SensorId::A, 0), Distance::Cm(AMBIENT_CM));
        assert_eq!(sim.distance_at(SensorId::B, 1999), Distance::Cm(AMBIENT_CM));
    }

    #[test]
    fn test_entry_occludes_a_before_b() {
        let mut sim = SimulatedRanging::with_timing(4000, 240, 0);
        assert_eq!(sim.distance_at(SensorId::A, 2000), Distance::Cm(OCCLUDED_CM));
        assert_eq!(sim.distance_at(SensorId::B, 2000), Distance::Cm(AMBIENT_CM));
        assert_eq!(sim.distance_at(SensorId::B, 2120), Distance::Cm(OCCLUDED_CM));
        assert_eq!(sim.distance_at(SensorId::A, 2240), Distance::Cm(AMBIENT_CM));
        assert_eq!(sim.distance_at(SensorId::B, 2360), Distance::Cm(AMBIENT_CM));
    }

    #[test]
    fn test_exit_occludes_b_before_a() {
        let mut sim = SimulatedRanging::with_timing(4000, 240, 0);
        assert_eq!(sim.distance_at(SensorId::B, 6000), Distance::Cm(OCCLUDED_CM));
        assert_eq!(sim.distance_at(SensorId::A, 6000), Distance::Cm(AMBIENT_CM));
        assert_eq!(sim.distance_at(SensorId::A, 6150), Distance::Cm(OCCLUDED_CM));
    }

    #[test]
    fn test_dropout_every_nth_occluded_sample() {
        let mut sim = SimulatedRanging::with_timing(4000, 240, 3);
        let readings: Vec<Distance> =
            (0..6).map(|i| sim.distance_at(SensorId::A, 2000 + i * 10)).collect();
        assert_eq!(readings[2], Distance::OutOfRange);
        assert_eq!(readings[5], Distance::OutOfRange);
        assert_eq!(readings[3], Distance::Cm(OCCLUDED_CM));
    }

    #[test]
    fn test_direction_alternates() {
        assert_eq!(SimulatedRanging::direction_of(0), Direction::In);
        assert_eq!(SimulatedRanging::direction_of(1), Direction::Out);
        assert_eq!(SimulatedRanging::direction_of(2), Direction::In);
    }
}
