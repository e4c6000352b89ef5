//! Control loop: ranging → filters → crossing machine → counters
//!
//! `GateCounter` is the only owner of the filters, the state machine and the
//! visitor counters. Everything else sees a `CounterSnapshot` through a watch
//! channel, so the web server and reporter never block the loop or touch the
//! counters directly.

use crate::domain::types::{CounterSnapshot, Direction, Distance, SensorId, VisitorCounters};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::ranging::RangingSource;
use crate::services::crossing::{CrossingStateMachine, TickOutcome};
use crate::services::detection_filter::DetectionFilter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct GateCounter {
    filters: [DetectionFilter; 2],
    machine: CrossingStateMachine,
    counters: VisitorCounters,
    last_distances: [Distance; 2],
    ticks: u64,
    tick_interval: Duration,
    measure_timeout: Duration,
    metrics: Arc<Metrics>,
    snapshot_tx: watch::Sender<CounterSnapshot>,
}

impl GateCounter {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        let (snapshot_tx, _) = watch::channel(CounterSnapshot::default());
        let filter = || DetectionFilter::new(config.threshold_cm(), config.consecutive_readings());

        Self {
            filters: [filter(), filter()],
            machine: CrossingStateMachine::new(config.sensor_timeout_ms(), config.debounce_ms()),
            counters: VisitorCounters::new(),
            last_distances: [Distance::OutOfRange; 2],
            ticks: 0,
            tick_interval: Duration::from_millis(config.tick_interval_ms()),
            measure_timeout: Duration::from_millis(config.measure_timeout_ms()),
            metrics,
            snapshot_tx,
        }
    }

    /// Read-only view of the counters and latest raw distances
    pub fn subscribe(&self) -> watch::Receiver<CounterSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn counters(&self) -> &VisitorCounters {
        &self.counters
    }

    pub fn machine(&self) -> &CrossingStateMachine {
        &self.machine
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::new(&self.counters, self.last_distances[0], self.last_distances[1], self.ticks)
    }

    /// Process the readings of one tick taken at `now_ms` (monotonic)
    ///
    /// Both filters take every reading, debounced ticks included; only the
    /// crossing machine is held during debounce. Filter windows keep moving
    /// while debounced rather than freezing with the previous person still in
    /// them, so the first tick after debounce sees current readings.
    pub fn process(&mut self, distance_a: Distance, distance_b: Distance, now_ms: u64) -> Option<Direction> {
        self.ticks += 1;
        self.last_distances = [distance_a, distance_b];

        let detected_a = self.filters[SensorId::A.index()].update(distance_a);
        let detected_b = self.filters[SensorId::B.index()].update(distance_b);

        let outcome = self.machine.evaluate(detected_a, detected_b, now_ms);
        match outcome {
            TickOutcome::Crossed(direction) => {
                self.counters.apply(direction);
                self.metrics.record_crossing(direction);
                info!(
                    direction = %direction,
                    count_in = %self.counters.count_in(),
                    count_out = %self.counters.count_out(),
                    current = %self.counters.current_visitors(),
                    "crossing"
                );
            }
            TickOutcome::Debounced => self.metrics.record_debounced(),
            TickOutcome::Ambiguous => {
                self.metrics.record_ambiguous();
                debug!(now_ms = %now_ms, "crossing_ambiguous_activation");
            }
            TickOutcome::Late => {
                self.metrics.record_late();
                debug!(now_ms = %now_ms, "crossing_opposite_late");
            }
            TickOutcome::Abandoned => {
                self.metrics.record_abandoned();
                debug!(now_ms = %now_ms, "crossing_abandoned");
            }
            TickOutcome::Armed(sensor) => {
                debug!(sensor = %sensor, now_ms = %now_ms, "crossing_armed");
            }
            TickOutcome::Quiet | TickOutcome::Waiting => {}
        }

        tracing::trace!(
            distance_a = %distance_a,
            distance_b = %distance_b,
            detected_a = %detected_a,
            detected_b = %detected_b,
            state = %self.machine.state().as_str(),
            outcome = %outcome.as_str(),
            "tick"
        );

        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            // Tick count alone is not worth waking readers for
            let changed = current.count_in != snapshot.count_in
                || current.count_out != snapshot.count_out
                || current.current_visitors != snapshot.current_visitors
                || current.distance_a != snapshot.distance_a
                || current.distance_b != snapshot.distance_b;
            *current = snapshot;
            changed
        });

        outcome.direction()
    }

    /// One bounded ranging call; a timeout reads as out of range
    async fn measure<S: RangingSource + ?Sized>(&self, source: &mut S, sensor: SensorId) -> Distance {
        match tokio::time::timeout(self.measure_timeout, source.measure(sensor)).await {
            Ok(distance) => distance,
            Err(_) => {
                self.metrics.record_ranging_timeout(sensor);
                tracing::trace!(sensor = %sensor, "ranging_measure_timeout");
                Distance::OutOfRange
            }
        }
    }

    /// Run the control loop until shutdown flips to true
    pub async fn run<S: RangingSource + ?Sized>(
        mut self,
        source: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let budget = self.tick_interval + self.measure_timeout * 2;
        info!(
            tick_interval_ms = %self.tick_interval.as_millis(),
            measure_timeout_ms = %self.measure_timeout.as_millis(),
            "counter_loop_started"
        );

        let started = Instant::now();
        let mut tick_timer = interval(self.tick_interval);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = tick_timer.tick() => {}
            }

            let tick_start = Instant::now();

            let distance_a = self.measure(source, SensorId::A).await;
            let distance_b = self.measure(source, SensorId::B).await;
            let now_ms = started.elapsed().as_millis() as u64;
            self.process(distance_a, distance_b, now_ms);

            let tick_duration = tick_start.elapsed();
            self.metrics.record_tick(tick_duration.as_micros() as u64);
            if tick_duration > budget {
                self.metrics.record_tick_overrun();
                warn!(
                    tick_ms = %tick_duration.as_millis(),
                    budget_ms = %budget.as_millis(),
                    "tick_overrun"
                );
            }
        }

        info!(
            ticks = %self.ticks,
            count_in = %self.counters.count_in(),
            count_out = %self.counters.count_out(),
            "counter_loop_stopped"
        );
    }
}
