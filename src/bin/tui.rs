//! Gate counter TUI - live dashboard for a running counter
//!
//! Polls `/data` once a second and shows:
//! - In / out / current counts
//! - Raw distance per sensor against the detection threshold
//! - The 20x2 LCD as the device would show it
//! - Recent crossings seen between polls

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gate_counter::domain::{CounterSnapshot, Distance};
use gate_counter::io::render_lcd;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame, Terminal,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Mutex;

const MAX_CROSSINGS: usize = 12;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "gate-counter-tui", version, about = "Live dashboard for a gate counter")]
struct Args {
    /// Base URL of the counter's web server
    #[arg(short, long, default_value = "http://192.168.4.1")]
    url: String,

    /// Detection threshold to mark on the distance bars
    #[arg(short, long, default_value_t = 30)]
    threshold_cm: u32,
}

/// `/data` payload
#[derive(Debug, Clone, Copy, Deserialize)]
struct DataPayload {
    #[serde(rename = "in")]
    count_in: u64,
    #[serde(rename = "out")]
    count_out: u64,
    current: u64,
    #[serde(rename = "distanceA")]
    distance_a: u32,
    #[serde(rename = "distanceB")]
    distance_b: u32,
}

impl From<DataPayload> for CounterSnapshot {
    fn from(data: DataPayload) -> Self {
        CounterSnapshot {
            count_in: data.count_in,
            count_out: data.count_out,
            current_visitors: data.current,
            distance_a: Distance::from_cm(data.distance_a),
            distance_b: Distance::from_cm(data.distance_b),
            ticks: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct CrossingLine {
    at: String,
    direction: &'static str,
    count: u64,
}

#[derive(Default)]
struct DashboardState {
    snapshot: Option<CounterSnapshot>,
    crossings: VecDeque<CrossingLine>,
    polls_ok: u64,
    polls_failed: u64,
    last_error: Option<String>,
    last_ok: Option<Instant>,
}

impl DashboardState {
    fn connected(&self) -> bool {
        self.last_ok.is_some_and(|t| t.elapsed() < POLL_INTERVAL * 3)
    }

    fn apply(&mut self, next: CounterSnapshot) {
        if let Some(prev) = self.snapshot {
            let at = OffsetDateTime::now_utc()
                .format(format_description!("[hour]:[minute]:[second]"))
                .unwrap_or_default();
            // Several crossings between two polls show up as one line each
            for count in prev.count_in.saturating_add(1)..=next.count_in {
                self.push_crossing(CrossingLine { at: at.clone(), direction: "in", count });
            }
            for count in prev.count_out.saturating_add(1)..=next.count_out {
                self.push_crossing(CrossingLine { at: at.clone(), direction: "out", count });
            }
        }

        self.snapshot = Some(next);
        self.polls_ok += 1;
        self.last_ok = Some(Instant::now());
        self.last_error = None;
    }

    fn push_crossing(&mut self, line: CrossingLine) {
        self.crossings.push_front(line);
        self.crossings.truncate(MAX_CROSSINGS);
    }

    fn fail(&mut self, error: String) {
        self.polls_failed += 1;
        self.last_error = Some(error);
    }
}

type SharedState = Arc<Mutex<DashboardState>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let data_url = format!("{}/data", args.url.trim_end_matches('/'));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let state: SharedState = Arc::new(Mutex::new(DashboardState::default()));

    let poll_state = state.clone();
    let poll_handle = tokio::spawn(async move {
        run_poller(data_url, poll_state).await;
    });

    let result = run_ui(&mut terminal, state, &args).await;

    poll_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<DataPayload, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.json::<DataPayload>().await
}

async fn run_poller(url: String, state: SharedState) {
    let client = match reqwest::Client::builder().timeout(Duration::from_millis(800)).build() {
        Ok(c) => c,
        Err(e) => {
            state.lock().await.fail(e.to_string());
            return;
        }
    };

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        match fetch(&client, &url).await {
            Ok(data) => state.lock().await.apply(data.into()),
            Err(e) => state.lock().await.fail(e.to_string()),
        }
    }
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: SharedState,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        let s = state.lock().await;
        terminal.draw(|f| draw_ui(f, &s, args))?;
        drop(s);

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState, args: &Args) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(5), // Counts
            Constraint::Min(0),    // Sensors + crossings
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], state, args);
    draw_counts(f, main_chunks[1], state);

    let bottom_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[2]);

    draw_sensor_panel(f, bottom_chunks[0], state, args.threshold_cm);
    draw_crossing_panel(f, bottom_chunks[1], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState, args: &Args) {
    let (status_text, status_color) =
        if state.connected() { ("CONNECTED", Color::Green) } else { ("DISCONNECTED", Color::Red) };

    let last = state
        .last_ok
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::styled("Gate Counter ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::raw(args.url.clone()),
        Span::raw(" | "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(format!(" | Last: {last} | ok/fail: {}/{}", state.polls_ok, state.polls_failed)),
    ];
    if let Some(err) = &state.last_error {
        spans.push(Span::styled(format!(" | {err}"), Style::default().fg(Color::Red)));
    }
    spans.push(Span::raw(" | 'q' to quit"));

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_counts(f: &mut Frame, area: Rect, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(1, 3), Constraint::Ratio(1, 3)])
        .split(area);

    let snapshot = state.snapshot.unwrap_or_default();
    let tiles = [
        (" In ", snapshot.count_in, Color::Green),
        (" Out ", snapshot.count_out, Color::Yellow),
        (" Inside ", snapshot.current_visitors, Color::Cyan),
    ];

    for (chunk, (title, value, color)) in chunks.iter().zip(tiles) {
        let tile = Paragraph::new(Line::from(Span::styled(
            value.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )))
        .centered()
        .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(tile, *chunk);
    }
}

fn distance_gauge(title: &str, distance: Distance, threshold_cm: u32) -> Gauge<'static> {
    let color = if distance.is_below(threshold_cm) { Color::Red } else { Color::Green };
    let ratio = f64::from(distance.as_cm()) / f64::from(Distance::MAX_RANGE_CM);
    let label = match distance {
        Distance::Cm(cm) => format!("{cm} cm"),
        Distance::OutOfRange => "out of range".to_string(),
    };

    Gauge::default()
        .block(Block::default().title(format!(" {title} ")).borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label)
}

fn draw_sensor_panel(f: &mut Frame, area: Rect, state: &DashboardState, threshold_cm: u32) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Sensor A
            Constraint::Length(3), // Sensor B
            Constraint::Min(0),    // LCD
        ])
        .split(area);

    let snapshot = state.snapshot.unwrap_or_default();
    f.render_widget(distance_gauge("Sensor A (outside)", snapshot.distance_a, threshold_cm), chunks[0]);
    f.render_widget(distance_gauge("Sensor B (inside)", snapshot.distance_b, threshold_cm), chunks[1]);

    let [top, bottom] = render_lcd(&snapshot);
    let lcd_style = Style::default().fg(Color::Black).bg(Color::LightGreen);
    let lcd = Paragraph::new(vec![Line::from(Span::styled(top, lcd_style)), Line::from(Span::styled(bottom, lcd_style))])
        .block(Block::default().title(" LCD ").borders(Borders::ALL));
    f.render_widget(lcd, chunks[2]);
}

fn draw_crossing_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let items: Vec<ListItem> = state
        .crossings
        .iter()
        .map(|c| {
            let color = if c.direction == "in" { Color::Green } else { Color::Yellow };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", c.at), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<4}", c.direction), Style::default().fg(color)),
                Span::raw(format!("#{}", c.count)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Crossings ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(list, area);
}
