//! Prometheus metrics for the channel exporter.
//!
//! Exposes:
//! - `channel_exporter_pages_total` (counter)
//! - `channel_exporter_messages_total` (counter)
//! - `channel_exporter_downloads_total` (counter by kind and status)
//! - `channel_exporter_downloads_inflight` (gauge by kind)
//! - `channel_exporter_run_duration_seconds` (histogram by status)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static PAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "channel_exporter_pages_total",
        "Message pages fetched from the remote channel"
    )
    .expect("failed to register pages counter")
});

static MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "channel_exporter_messages_total",
        "Messages fetched from the remote channel"
    )
    .expect("failed to register messages counter")
});

static DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "channel_exporter_downloads_total",
        "Finished downloads by kind and status",
        &["kind", "status"]
    )
    .expect("failed to register downloads counter")
});

static DOWNLOADS_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "channel_exporter_downloads_inflight",
        "Number of in-flight downloads",
        &["kind"]
    )
    .expect("failed to register inflight gauge")
});

static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1s up to ~4.5 hours.
    let buckets =
        prometheus::exponential_buckets(1.0, 2.0, 15).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "channel_exporter_run_duration_seconds",
        "Export run duration in seconds",
        &["status"],
        buckets
    )
    .expect("failed to register run duration histogram")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&PAGES_TOTAL);
    Lazy::force(&MESSAGES_TOTAL);
    Lazy::force(&DOWNLOADS_TOTAL);
    Lazy::force(&DOWNLOADS_INFLIGHT);
    Lazy::force(&RUN_DURATION);
}

/// Record one fetched page and the messages it carried.
pub fn record_page(messages: usize) {
    init_collectors();
    PAGES_TOTAL.inc();
    MESSAGES_TOTAL.inc_by(messages as u64);
}

/// Increment inflight gauge for a download kind (`attachment`, `image`, `thumbnail`).
pub fn record_download_start(kind: &str) {
    init_collectors();
    DOWNLOADS_INFLIGHT.with_label_values(&[kind]).inc();
}

/// Record download completion.
pub fn record_download_result(kind: &str, success: bool) {
    init_collectors();
    DOWNLOADS_INFLIGHT.with_label_values(&[kind]).dec();
    DOWNLOADS_TOTAL
        .with_label_values(&[kind, if success { "ok" } else { "error" }])
        .inc();
}

/// Record the duration and outcome of a whole export run.
pub fn record_run(duration: Duration, success: bool) {
    init_collectors();
    RUN_DURATION
        .with_label_values(&[if success { "ok" } else { "error" }])
        .observe(duration.as_secs_f64());
}

fn plain_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "encode error",
        ));
    }

    let mut response = plain_response(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
