//! End-to-end counting through the filters and the crossing machine

use gate_counter::domain::{Direction, Distance, SensorId};
use gate_counter::infra::{Config, Metrics};
use gate_counter::io::SimulatedRanging;
use gate_counter::services::{CrossingState, GateCounter};
use std::sync::Arc;

const NEAR: Distance = Distance::Cm(10);
const FAR: Distance = Distance::OutOfRange;

/// threshold 30 cm, 2-reading window, 1000 ms crossing timeout, 250 ms debounce
fn gate() -> GateCounter {
    GateCounter::new(&Config::default(), Arc::new(Metrics::new()))
}

#[test]
fn test_a_then_b_inside_timeout_counts_one_entry() {
    let mut gate = gate();

    assert_eq!(gate.process(NEAR, FAR, 0), None);
    assert_eq!(gate.process(FAR, NEAR, 200), Some(Direction::In));

    assert_eq!(gate.counters().count_in(), 1);
    assert_eq!(gate.counters().count_out(), 0);
    assert_eq!(gate.counters().current_visitors(), 1);
    assert_eq!(gate.machine().state(), CrossingState::Idle);
}

#[test]
fn test_b_after_timeout_is_not_a_crossing() {
    let mut gate = gate();

    gate.process(NEAR, FAR, 0);
    assert_eq!(gate.process(FAR, NEAR, 1500), None);

    assert_eq!(gate.counters().count_in(), 0);
    assert_eq!(gate.machine().state(), CrossingState::Idle);
}

#[test]
fn test_abandoned_attempt_then_late_b_counts_nothing() {
    let mut gate = gate();
    gate.process(NEAR, FAR, 0);

    // A leaves, nobody reaches B before the timeout
    let mut t = 50;
    while t < 1500 {
        assert_eq!(gate.process(FAR, FAR, t), None);
        t += 50;
    }
    assert_eq!(gate.machine().state(), CrossingState::Idle);

    // B alone just arms the other direction
    assert_eq!(gate.process(FAR, NEAR, 1500), None);
    assert_eq!(gate.machine().state(), CrossingState::WaitingOppositeAfterB { since: 1500 });
    assert_eq!(gate.counters().count_in(), 0);
    assert_eq!(gate.counters().count_out(), 0);
}

#[test]
fn test_second_crossing_inside_debounce_counts_once() {
    let mut gate = gate();

    gate.process(NEAR, FAR, 0);
    assert_eq!(gate.process(FAR, NEAR, 100), Some(Direction::In));

    // A full A→B sequence while still debouncing
    assert_eq!(gate.process(NEAR, FAR, 150), None);
    assert_eq!(gate.process(FAR, NEAR, 200), None);
    assert_eq!(gate.process(FAR, FAR, 300), None);

    // Debounce over, gate empty again
    assert_eq!(gate.process(FAR, FAR, 360), None);
    assert_eq!(gate.counters().count_in(), 1);
    assert_eq!(gate.machine().state(), CrossingState::Idle);
}

#[test]
fn test_exit_on_empty_room_keeps_current_at_zero() {
    let mut gate = gate();

    gate.process(FAR, NEAR, 0);
    assert_eq!(gate.process(NEAR, FAR, 100), Some(Direction::Out));

    assert_eq!(gate.counters().count_out(), 1);
    assert_eq!(gate.counters().current_visitors(), 0);
}

#[test]
fn test_both_sensors_at_once_never_arms() {
    let mut gate = gate();

    for t in (0..500).step_by(50) {
        assert_eq!(gate.process(NEAR, NEAR, t), None);
        assert_eq!(gate.machine().state(), CrossingState::Idle);
    }
    assert_eq!(gate.counters().count_in() + gate.counters().count_out(), 0);
}

#[test]
fn test_entry_then_exit_returns_to_empty() {
    let mut gate = gate();

    gate.process(NEAR, FAR, 0);
    assert_eq!(gate.process(FAR, NEAR, 150), Some(Direction::In));
    for t in (200..1000).step_by(50) {
        gate.process(FAR, FAR, t);
    }

    gate.process(FAR, NEAR, 1000);
    assert_eq!(gate.process(NEAR, FAR, 1150), Some(Direction::Out));

    assert_eq!(gate.counters().count_in(), 1);
    assert_eq!(gate.counters().count_out(), 1);
    assert_eq!(gate.counters().current_visitors(), 0);
}

#[test]
fn test_simulated_walkers_over_two_cycles() {
    let mut gate = gate();
    let mut sim = SimulatedRanging::with_timing(4000, 240, 0);
    let mut crossings = Vec::new();

    for t in (0..8000).step_by(50) {
        let a = sim.distance_at(SensorId::A, t);
        let b = sim.distance_at(SensorId::B, t);
        if let Some(direction) = gate.process(a, b, t) {
            crossings.push((t, direction));
        }
    }

    assert_eq!(crossings, vec![(2150, Direction::In), (6150, Direction::Out)]);
    assert_eq!(gate.counters().current_visitors(), 0);
}
