//! Per-sensor occupancy filter
//!
//! Thresholds each reading and keeps the last N results in a ring. The sensor
//! counts as detected when at least N-1 of the last N readings were below the
//! threshold, so one dropped echo inside a run of hits does not flip it.

use crate::domain::types::Distance;

pub struct DetectionFilter {
    threshold_cm: u32,
    /// Last N thresholded readings, pre-filled with "not detected"
    window: Vec<bool>,
    /// Slot that the next reading overwrites (the oldest one)
    next: usize,
    /// Number of `true` entries in `window`
    hits: usize,
    detected: bool,
}

impl DetectionFilter {
    /// Create a filter with a window of `window` readings.
    ///
    /// A window of zero is treated as one; config validation rejects both.
    pub fn new(threshold_cm: u32, window: usize) -> Self {
        Self {
            threshold_cm,
            window: vec![false; window.max(1)],
            next: 0,
            hits: 0,
            detected: false,
        }
    }

    /// Push one reading and return the stable detection state
    pub fn update(&mut self, distance: Distance) -> bool {
        let reading = distance.is_below(self.threshold_cm);

        let evicted = std::mem::replace(&mut self.window[self.next], reading);
        if evicted {
            self.hits -= 1;
        }
        if reading {
            self.hits += 1;
        }
        self.next = (self.next + 1) % self.window.len();

        self.detected = self.hits + 1 >= self.window.len();
        self.detected
    }

    /// Result of the most recent `update`
    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn threshold_cm(&self) -> u32 {
        self.threshold_cm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEAR: Distance = Distance::Cm(10);
    const FAR: Distance = Distance::Cm(250);

    #[test]
    fn test_starts_not_detected() {
        let filter = DetectionFilter::new(30, 3);
        assert!(!filter.is_detected());
        assert_eq!(filter.window_len(), 3);
    }

    #[test]
    fn test_window_two_single_hit_is_enough() {
        // N=2 tolerates one miss, so one near reading already detects
        let mut filter = DetectionFilter::new(30, 2);
        assert!(filter.update(NEAR));
        assert!(filter.update(FAR)); // [near, far] still 1 >= 1
        assert!(!filter.update(FAR));
    }

    #[test]
    fn test_sustained_occlusion_required() {
        let mut filter = DetectionFilter::new(30, 4);
        assert!(!filter.update(NEAR));
        assert!(!filter.update(NEAR));
        assert!(filter.update(NEAR)); // 3 of 4
        assert!(filter.update(NEAR));
    }

    #[test]
    fn test_single_miss_inside_run_does_not_flip() {
        let mut filter = DetectionFilter::new(30, 4);
        for _ in 0..4 {
            filter.update(NEAR);
        }
        assert!(filter.update(FAR));
        assert!(filter.update(NEAR));
        assert!(filter.update(NEAR));
        assert!(filter.update(NEAR));
    }

    #[test]
    fn test_two_misses_flip_to_not_detected() {
        let mut filter = DetectionFilter::new(30, 4);
        for _ in 0..4 {
            filter.update(NEAR);
        }
        assert!(filter.update(FAR));
        assert!(!filter.update(FAR));
    }

    #[test]
    fn test_single_spurious_hit_does_not_detect() {
        let mut filter = DetectionFilter::new(30, 3);
        filter.update(FAR);
        filter.update(FAR);
        assert!(!filter.update(NEAR));
        assert!(!filter.update(FAR));
    }

    #[test]
    fn test_out_of_range_is_far() {
        let mut filter = DetectionFilter::new(30, 2);
        for _ in 0..10 {
            assert!(!filter.update(Distance::OutOfRange));
        }
    }

    #[test]
    fn test_threshold_boundary_is_not_detected() {
        let mut filter = DetectionFilter::new(30, 2);
        assert!(!filter.update(Distance::Cm(30)));
        assert!(filter.update(Distance::Cm(29)));
    }

    #[test]
    fn test_oldest_reading_evicted() {
        let mut filter = DetectionFilter::new(30, 3);
        filter.update(NEAR);
        filter.update(NEAR);
        assert!(filter.update(NEAR));
        // The three near readings age out one by one
        assert!(filter.update(FAR));
        assert!(!filter.update(FAR));
        assert!(!filter.update(FAR));
    }
}
