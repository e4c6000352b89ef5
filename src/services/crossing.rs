//! Direction inference from the order in which the two sensors trip
//!
//! Idle arms on whichever sensor trips alone, then waits for the opposite one.
//! The opposite sensor arriving inside `sensor_timeout` confirms a crossing;
//! otherwise the attempt is dropped and the machine returns to Idle. After a
//! confirmed crossing every tick is ignored until `debounce` has elapsed.
//!
//! Timestamps are monotonic milliseconds supplied by the caller.

use crate::domain::types::{Direction, SensorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossingState {
    #[default]
    Idle,
    /// A tripped alone at `since`; B completes an entry
    WaitingOppositeAfterA { since: u64 },
    /// B tripped alone at `since`; A completes an exit
    WaitingOppositeAfterB { since: u64 },
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Inside the debounce window; nothing evaluated
    Debounced,
    /// Idle and neither sensor active
    Quiet,
    /// Idle and both sensors active at once; not treated as a start
    Ambiguous,
    /// Idle → waiting, first sensor recorded
    Armed(SensorId),
    /// Still waiting for the opposite sensor
    Waiting,
    Crossed(Direction),
    /// Opposite sensor tripped, but at or after the timeout
    Late,
    /// Timeout expired with no opposite sensor
    Abandoned,
}

impl TickOutcome {
    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        match *self {
            TickOutcome::Crossed(direction) => Some(direction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Debounced => "debounced",
            TickOutcome::Quiet => "quiet",
            TickOutcome::Ambiguous => "ambiguous",
            TickOutcome::Armed(_) => "armed",
            TickOutcome::Waiting => "waiting",
            TickOutcome::Crossed(_) => "crossed",
            TickOutcome::Late => "late",
            TickOutcome::Abandoned => "abandoned",
        }
    }
}

impl CrossingState {
    /// Pure transition function, debounce not included
    pub fn next(
        self,
        detected_a: bool,
        detected_b: bool,
        now: u64,
        sensor_timeout: u64,
    ) -> (CrossingState, TickOutcome) {
        match self {
            CrossingState::Idle => match (detected_a, detected_b) {
                (true, false) => {
                    (CrossingState::WaitingOppositeAfterA { since: now }, TickOutcome::Armed(SensorId::A))
                }
                (false, true) => {
                    (CrossingState::WaitingOppositeAfterB { since: now }, TickOutcome::Armed(SensorId::B))
                }
                (true, true) => (CrossingState::Idle, TickOutcome::Ambiguous),
                (false, false) => (CrossingState::Idle, TickOutcome::Quiet),
            },
            CrossingState::WaitingOppositeAfterA { since } => {
                resolve(self, since, detected_b, Direction::In, now, sensor_timeout)
            }
            CrossingState::WaitingOppositeAfterB { since } => {
                resolve(self, since, detected_a, Direction::Out, now, sensor_timeout)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CrossingState::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrossingState::Idle => "idle",
            CrossingState::WaitingOppositeAfterA { .. } => "waiting_after_a",
            CrossingState::WaitingOppositeAfterB { .. } => "waiting_after_b",
        }
    }
}

fn resolve(
    waiting: CrossingState,
    since: u64,
    opposite_detected: bool,
    direction: Direction,
    now: u64,
    sensor_timeout: u64,
) -> (CrossingState, TickOutcome) {
    let elapsed = now.saturating_sub(since);

    if opposite_detected {
        let outcome = if elapsed < sensor_timeout {
            TickOutcome::Crossed(direction)
        } else {
            TickOutcome::Late
        };
        (CrossingState::Idle, outcome)
    } else if elapsed > sensor_timeout {
        (CrossingState::Idle, TickOutcome::Abandoned)
    } else {
        (waiting, TickOutcome::Waiting)
    }
}

/// Stateful wrapper: current state plus the debounce gate
pub struct CrossingStateMachine {
    state: CrossingState,
    sensor_timeout_ms: u64,
    debounce_ms: u64,
    /// Time of the last confirmed crossing; `None` until the first one
    last_confirmed: Option<u64>,
}

impl CrossingStateMachine {
    pub fn new(sensor_timeout_ms: u64, debounce_ms: u64) -> Self {
        Self { state: CrossingState::Idle, sensor_timeout_ms, debounce_ms, last_confirmed: None }
    }

    /// Run one tick and classify it
    pub fn evaluate(&mut self, detected_a: bool, detected_b: bool, now: u64) -> TickOutcome {
        if let Some(confirmed_at) = self.last_confirmed {
            if now.saturating_sub(confirmed_at) < self.debounce_ms {
                return TickOutcome::Debounced;
            }
        }

        let (next, outcome) = self.state.next(detected_a, detected_b, now, self.sensor_timeout_ms);
        self.state = next;

        if outcome.direction().is_some() {
            self.last_confirmed = Some(now);
        }
        outcome
    }

    /// Run one tick; returns the direction of a crossing confirmed on this tick
    pub fn tick(&mut self, detected_a: bool, detected_b: bool, now: u64) -> Option<Direction> {
        self.evaluate(detected_a, detected_b, now).direction()
    }

    pub fn state(&self) -> CrossingState {
        self.state
    }

    pub fn last_confirmed(&self) -> Option<u64> {
        self.last_confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u64 = 1000;
    const DEBOUNCE: u64 = 250;

    fn machine() -> CrossingStateMachine {
        CrossingStateMachine::new(TIMEOUT, DEBOUNCE)
    }

    #[test]
    fn test_a_then_b_is_in() {
        let mut m = machine();
        assert_eq!(m.tick(true, false, 0), None);
        assert_eq!(m.state(), CrossingState::WaitingOppositeAfterA { since: 0 });
        assert_eq!(m.tick(true, true, 200), Some(Direction::In));
        assert!(m.state().is_idle());
        assert_eq!(m.last_confirmed(), Some(200));
    }

    #[test]
    fn test_b_then_a_is_out() {
        let mut m = machine();
        assert_eq!(m.tick(false, true, 0), None);
        assert_eq!(m.tick(false, false, 100), None);
        assert_eq!(m.tick(true, false, 300), Some(Direction::Out));
        assert!(m.state().is_idle());
    }

    #[test]
    fn test_first_sensor_may_release_before_second() {
        let mut m = machine();
        m.tick(true, false, 0);
        assert_eq!(m.evaluate(false, false, 100), TickOutcome::Waiting);
        assert_eq!(m.tick(false, true, 400), Some(Direction::In));
    }

    #[test]
    fn test_simultaneous_activation_stays_idle() {
        let mut m = machine();
        assert_eq!(m.evaluate(true, true, 0), TickOutcome::Ambiguous);
        assert!(m.state().is_idle());
        assert_eq!(m.evaluate(false, false, 50), TickOutcome::Quiet);
    }

    #[test]
    fn test_opposite_after_timeout_is_late() {
        let mut m = machine();
        m.tick(true, false, 0);
        assert_eq!(m.evaluate(true, true, 1000), TickOutcome::Late);
        assert!(m.state().is_idle());
        assert_eq!(m.last_confirmed(), None);
    }

    #[test]
    fn test_timeout_without_opposite_abandons() {
        let mut m = machine();
        m.tick(false, true, 0);
        // Exactly at the timeout the attempt is still open
        assert_eq!(m.evaluate(false, true, 1000), TickOutcome::Waiting);
        assert_eq!(m.evaluate(false, true, 1001), TickOutcome::Abandoned);
        assert!(m.state().is_idle());
    }

    #[test]
    fn test_rearms_after_abandon() {
        let mut m = machine();
        m.tick(true, false, 0);
        m.tick(false, false, 1500);
        assert!(m.state().is_idle());
        assert_eq!(m.evaluate(true, false, 1550), TickOutcome::Armed(SensorId::A));
        assert_eq!(m.tick(false, true, 1700), Some(Direction::In));
    }

    #[test]
    fn test_debounce_freezes_state() {
        let mut m = machine();
        m.tick(true, false, 0);
        assert_eq!(m.tick(false, true, 100), Some(Direction::In));

        // B still occluded right after the crossing; must not arm an exit
        assert_eq!(m.evaluate(false, true, 150), TickOutcome::Debounced);
        assert_eq!(m.evaluate(true, false, 349), TickOutcome::Debounced);
        assert!(m.state().is_idle());

        assert_eq!(m.evaluate(true, false, 350), TickOutcome::Armed(SensorId::A));
    }

    #[test]
    fn test_two_crossings_inside_debounce_count_once() {
        let mut m = machine();
        let mut events = Vec::new();
        for (a, b, t) in [(true, false, 0), (false, true, 50), (true, false, 100), (false, true, 150)] {
            events.extend(m.tick(a, b, t));
        }
        assert_eq!(events, vec![Direction::In]);
    }

    #[test]
    fn test_first_tick_after_boot_not_debounced() {
        let mut m = machine();
        assert_eq!(m.evaluate(true, false, 0), TickOutcome::Armed(SensorId::A));
    }

    #[test]
    fn test_clock_going_backwards_does_not_panic() {
        let mut m = machine();
        m.tick(true, false, 500);
        assert_eq!(m.tick(false, true, 100), Some(Direction::In));
        assert_eq!(m.evaluate(false, false, 50), TickOutcome::Debounced);
    }

    #[test]
    fn test_pure_transition() {
        let (state, outcome) = CrossingState::Idle.next(false, true, 42, TIMEOUT);
        assert_eq!(state, CrossingState::WaitingOppositeAfterB { since: 42 });
        assert_eq!(outcome, TickOutcome::Armed(SensorId::B));

        let (state, outcome) = state.next(true, true, 500, TIMEOUT);
        assert_eq!(state, CrossingState::Idle);
        assert_eq!(outcome.direction(), Some(Direction::Out));
    }
}
