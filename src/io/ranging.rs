//! Ranging source interface
//!
//! A source returns one filtered `Distance` per call. Implementations take a
//! short burst of raw samples and average them; any sample without an echo
//! makes the whole reading `OutOfRange`. The caller bounds each call with the
//! configured measure timeout.

use crate::domain::types::{Distance, SensorId};
use async_trait::async_trait;
use smallvec::SmallVec;

/// Raw samples from one burst; `None` is a sample that timed out
pub type Burst = SmallVec<[Option<u32>; 4]>;

#[async_trait]
pub trait RangingSource: Send {
    /// Measure the distance seen by `sensor`
    async fn measure(&mut self, sensor: SensorId) -> Distance;
}

/// Integer mean of a burst in cm. A single missed echo, or an empty burst, is out of range.
pub fn average_burst(samples: &[Option<u32>]) -> Distance {
    if samples.is_empty() {
        return Distance::OutOfRange;
    }

    let mut total: u64 = 0;
    for sample in samples {
        match sample {
            Some(cm) => total += u64::from(*cm),
            None => return Distance::OutOfRange,
        }
    }

    let mean = total / samples.len() as u64;
    Distance::from_cm(u32::try_from(mean).unwrap_or(u32::MAX))
}
