//! Character-display rendering of the counter state
//!
//! Two lines for a 20-column character LCD:
//! `A:<a>cm B:<b>cm` and `I:<in> O:<out> C:<current>`.

use crate::domain::types::CounterSnapshot;

pub const LCD_COLUMNS: usize = 20;

/// Pad or truncate to exactly `LCD_COLUMNS` characters, so stale digits get overwritten
fn fit(line: String) -> String {
    let mut fitted: String = line.chars().take(LCD_COLUMNS).collect();
    let width = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(LCD_COLUMNS - width));
    fitted
}

pub fn render_lcd(snapshot: &CounterSnapshot) -> [String; 2] {
    [
        fit(format!("A:{}cm B:{}cm", snapshot.distance_a, snapshot.distance_b)),
        fit(format!(
            "I:{} O:{} C:{}",
            snapshot.count_in, snapshot.count_out, snapshot.current_visitors
        )),
    ]
}
