//! Status web server
//!
//! Routes:
//! - `GET /`        status page (polls `/data` every second)
//! - `GET /data`    JSON snapshot `{"in","out","current","distanceA","distanceB"}`
//! - `GET /metrics` Prometheus text format
//! - `GET /health`  liveness
//! - anything else  302 to `/`, so phones checking for a login page land on the status page
//!
//! Handlers only read the latest published snapshot; they never touch the sensors.

use crate::domain::types::{CounterSnapshot, SensorId};
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("index.html");

/// Shared by every connection
pub struct HttpState {
    snapshots: watch::Receiver<CounterSnapshot>,
    metrics: Arc<Metrics>,
    site_id: String,
}

impl HttpState {
    pub fn new(snapshots: watch::Receiver<CounterSnapshot>, metrics: Arc<Metrics>, site_id: String) -> Self {
        Self { snapshots, metrics, site_id }
    }

    fn snapshot(&self) -> CounterSnapshot {
        *self.snapshots.borrow()
    }
}

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Tick duration histogram; buckets are per report window
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", avg * cumulative);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

fn write_visitor_metrics(output: &mut String, site: &str, snapshot: &CounterSnapshot) {
    write_metric(
        output,
        "gate_visitors_in_total",
        "Confirmed entries",
        MetricType::Counter,
        site,
        snapshot.count_in,
    );
    write_metric(
        output,
        "gate_visitors_out_total",
        "Confirmed exits",
        MetricType::Counter,
        site,
        snapshot.count_out,
    );
    write_metric(
        output,
        "gate_current_visitors",
        "Visitors believed inside",
        MetricType::Gauge,
        site,
        snapshot.current_visitors,
    );

    let _ = writeln!(output, "# HELP gate_distance_cm Latest raw range reading");
    let _ = writeln!(output, "# TYPE gate_distance_cm gauge");
    for (sensor, distance) in SensorId::ALL.iter().zip([snapshot.distance_a, snapshot.distance_b]) {
        let _ = writeln!(
            output,
            "gate_distance_cm{{site=\"{site}\",sensor=\"{}\"}} {}",
            sensor.as_str(),
            distance.as_cm()
        );
    }
}

fn write_loop_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(output, "gate_ticks_total", "Control loop ticks", MetricType::Counter, site, summary.ticks_total);
    write_histogram(
        output,
        "gate_tick_duration_us",
        "Control loop tick duration in microseconds",
        site,
        &summary.tick_buckets,
        summary.tick_avg_us,
    );
    write_metric(
        output,
        "gate_tick_overruns_total",
        "Ticks that exceeded their time budget",
        MetricType::Counter,
        site,
        summary.tick_overruns_total,
    );

    let _ = writeln!(output, "# HELP gate_ranging_timeouts_total Measurements cut off by the timeout");
    let _ = writeln!(output, "# TYPE gate_ranging_timeouts_total counter");
    for (sensor, val) in SensorId::ALL.iter().zip([summary.ranging_timeouts_a, summary.ranging_timeouts_b]) {
        let _ = writeln!(
            output,
            "gate_ranging_timeouts_total{{site=\"{site}\",sensor=\"{}\"}} {val}",
            sensor.as_str()
        );
    }
}

fn write_crossing_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "gate_debounced_ticks_total",
        "Ticks skipped inside the debounce window",
        MetricType::Counter,
        site,
        summary.debounced_ticks_total,
    );
    write_metric(
        output,
        "gate_ambiguous_total",
        "Ticks where both sensors fired from idle",
        MetricType::Counter,
        site,
        summary.ambiguous_total,
    );
    write_metric(
        output,
        "gate_late_total",
        "Opposite sensor fired after the crossing timeout",
        MetricType::Counter,
        site,
        summary.late_total,
    );
    write_metric(
        output,
        "gate_abandoned_total",
        "Half crossings that timed out",
        MetricType::Counter,
        site,
        summary.abandoned_total,
    );
}

/// Prometheus text exposition of the counters and loop health
pub fn format_prometheus_metrics(summary: &MetricsSummary, snapshot: &CounterSnapshot, site_id: &str) -> String {
    let mut output = String::with_capacity(4096);
    write_visitor_metrics(&mut output, site_id, snapshot);
    write_loop_metrics(&mut output, site_id, summary);
    write_crossing_metrics(&mut output, site_id, summary);
    output
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

/// Pick the response for one request
pub fn route(method: &Method, path: &str, state: &HttpState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => respond(StatusCode::OK, "text/html; charset=utf-8", INDEX_HTML),
        (&Method::GET, "/data") => match serde_json::to_string(&state.snapshot()) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "http_data_encode_failed");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "encode failed")
            }
        },
        (&Method::GET, "/metrics") => {
            let summary = state.metrics.peek();
            let body = format_prometheus_metrics(&summary, &state.snapshot(), &state.site_id);
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, "/")
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<HttpState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = route(req.method(), req.uri().path(), &state);
    tracing::trace!(
        method = %req.method(),
        path = %req.uri().path(),
        status = %response.status().as_u16(),
        "http_request"
    );
    Ok(response)
}

/// Serve until shutdown flips to true
pub async fn start_http_server(
    port: u16,
    state: HttpState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let state = Arc::new(state);

    info!(port = %port, site = %state.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                warn!(peer = %peer, error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Direction, Distance};
    use http_body_util::BodyExt;

    fn state_with(snapshot: CounterSnapshot) -> (HttpState, watch::Sender<CounterSnapshot>, Arc<Metrics>) {
        let (tx, rx) = watch::channel(snapshot);
        let metrics = Arc::new(Metrics::new());
        (HttpState::new(rx, metrics.clone(), "lobby".to_string()), tx, metrics)
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_data_serves_latest_snapshot() {
        let (state, tx, _) = state_with(CounterSnapshot::default());
        tx.send(CounterSnapshot {
            count_in: 3,
            count_out: 1,
            current_visitors: 2,
            distance_a: Distance::Cm(25),
            distance_b: Distance::OutOfRange,
            ticks: 40,
        })
        .unwrap();

        let response = route(&Method::GET, "/data", &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["in"], 3);
        assert_eq!(json["out"], 1);
        assert_eq!(json["current"], 2);
        assert_eq!(json["distanceA"], 25);
        assert_eq!(json["distanceB"], 400);
    }

    #[tokio::test]
    async fn test_root_serves_status_page() {
        let (state, _tx, _) = state_with(CounterSnapshot::default());
        let response = route(&Method::GET, "/", &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("/data"));
    }

    #[test]
    fn test_unknown_path_redirects_to_root() {
        let (state, _tx, _) = state_with(CounterSnapshot::default());
        for path in ["/generate_204", "/hotspot-detect.html", "/anything/else"] {
            let response = route(&Method::GET, path, &state);
            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(response.headers()[header::LOCATION], "/");
        }

        let response = route(&Method::POST, "/data", &state);
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _tx, _) = state_with(CounterSnapshot::default());
        let response = route(&Method::GET, "/health", &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let snapshot = CounterSnapshot { count_in: 5, count_out: 2, current_visitors: 3, ..Default::default() };
        let (state, _tx, metrics) = state_with(snapshot);
        metrics.record_tick(800);
        metrics.record_crossing(Direction::In);

        let body = body_text(route(&Method::GET, "/metrics", &state)).await;
        assert!(body.contains("gate_visitors_in_total{site=\"lobby\"} 5"));
        assert!(body.contains("gate_current_visitors{site=\"lobby\"} 3"));
        assert!(body.contains("gate_distance_cm{site=\"lobby\",sensor=\"b\"} 400"));
        assert!(body.contains("gate_ticks_total{site=\"lobby\"} 1"));
        assert!(body.contains("gate_tick_duration_us_bucket{site=\"lobby\",le=\"+Inf\"} 1"));

        // Scrapes leave the periodic window to the reporter
        let _ = route(&Method::GET, "/metrics", &state);
        assert_eq!(metrics.report().tick_buckets.iter().sum::<u64>(), 1);
    }
}
