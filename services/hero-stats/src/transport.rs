use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    net::{TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    time::{Duration, Instant},
};

use store::DatasetSource;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::api::{ReportOptions, retrieve_global_stats};

pub mod envelope;
mod http;

use envelope::{TransportEnvelope, respond};
use http::{
    parse_http_request_bytes, read_http_request, render_response_bytes, request_path,
    write_response,
};

const METRICS_WINDOW_SIZE: usize = 2048;
pub(crate) const MAX_HTTP_BODY_BYTES: usize = 1024 * 1024;
const SOCKET_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_HTTP_WORKERS: usize = 4;
pub const DEFAULT_HTTP_QUEUE_CAPACITY_PER_WORKER: usize = 64;
pub const STATS_PATH: &str = "/v1/hero-stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOptions {
    pub report: ReportOptions,
    pub compress: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            report: ReportOptions::default(),
            compress: true,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TransportBackpressureMetrics {
    pub(crate) queue_depth: AtomicUsize,
    pub(crate) queue_capacity: usize,
    pub(crate) queue_full_reject_total: AtomicU64,
}

impl TransportBackpressureMetrics {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            queue_depth: AtomicUsize::new(0),
            queue_capacity,
            queue_full_reject_total: AtomicU64::new(0),
        }
    }

    pub(crate) fn observe_enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn observe_dequeued(&self) {
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| {
                Some(depth.saturating_sub(1))
            });
    }

    pub(crate) fn observe_rejected(&self) {
        self.queue_full_reject_total.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TransportMetrics {
    started_at: Instant,
    http_requests_total: u64,
    health_requests_total: u64,
    metrics_requests_total: u64,
    stats_requests_total: u64,
    stats_success_total: u64,
    stats_failure_total: u64,
    stats_last_hero_count: usize,
    stats_latency_ms_window: VecDeque<f64>,
    transport_backpressure: Option<Arc<TransportBackpressureMetrics>>,
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            http_requests_total: 0,
            health_requests_total: 0,
            metrics_requests_total: 0,
            stats_requests_total: 0,
            stats_success_total: 0,
            stats_failure_total: 0,
            stats_last_hero_count: 0,
            stats_latency_ms_window: VecDeque::with_capacity(METRICS_WINDOW_SIZE),
            transport_backpressure: None,
        }
    }
}

impl TransportMetrics {
    pub(crate) fn set_transport_backpressure_metrics(
        &mut self,
        metrics: Arc<TransportBackpressureMetrics>,
    ) {
        self.transport_backpressure = Some(metrics);
    }

    fn push_window(window: &mut VecDeque<f64>, value: f64) {
        if window.len() >= METRICS_WINDOW_SIZE {
            let _ = window.pop_front();
        }
        window.push_back(value);
    }

    fn observe_http(&mut self, path: &str) {
        self.http_requests_total += 1;
        match path {
            "/health" => self.health_requests_total += 1,
            "/metrics" => self.metrics_requests_total += 1,
            _ => {}
        }
    }

    fn observe_stats(&mut self, status: u16, latency_ms: f64, hero_count: Option<usize>) {
        self.stats_requests_total += 1;
        Self::push_window(&mut self.stats_latency_ms_window, latency_ms);
        if let Some(count) = hero_count {
            self.stats_last_hero_count = count;
        }
        match status {
            200..=299 => self.stats_success_total += 1,
            _ => self.stats_failure_total += 1,
        }
    }

    fn quantile(window: &VecDeque<f64>, quantile: f64) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let mut values: Vec<f64> = window.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let idx = (((values.len() - 1) as f64) * quantile).round() as usize;
        values[idx]
    }

    fn render_prometheus(&self) -> String {
        let latency_p50 = Self::quantile(&self.stats_latency_ms_window, 0.50);
        let latency_p95 = Self::quantile(&self.stats_latency_ms_window, 0.95);
        let latency_p99 = Self::quantile(&self.stats_latency_ms_window, 0.99);
        let uptime_seconds = self.started_at.elapsed().as_secs_f64();
        let transport_queue_capacity = self
            .transport_backpressure
            .as_ref()
            .map(|metrics| metrics.queue_capacity)
            .unwrap_or(0);
        let transport_queue_depth = self
            .transport_backpressure
            .as_ref()
            .map(|metrics| metrics.queue_depth.load(Ordering::Relaxed))
            .unwrap_or(0);
        let transport_queue_full_reject_total = self
            .transport_backpressure
            .as_ref()
            .map(|metrics| metrics.queue_full_reject_total.load(Ordering::Relaxed))
            .unwrap_or(0);

        format!(
            "# TYPE hero_stats_http_requests_total counter\n\
hero_stats_http_requests_total {}\n\
# TYPE hero_stats_health_requests_total counter\n\
hero_stats_health_requests_total {}\n\
# TYPE hero_stats_metrics_requests_total counter\n\
hero_stats_metrics_requests_total {}\n\
# TYPE hero_stats_requests_total counter\n\
hero_stats_requests_total {}\n\
# TYPE hero_stats_success_total counter\n\
hero_stats_success_total {}\n\
# TYPE hero_stats_failure_total counter\n\
hero_stats_failure_total {}\n\
# TYPE hero_stats_last_hero_count gauge\n\
hero_stats_last_hero_count {}\n\
# TYPE hero_stats_latency_ms_p50 gauge\n\
hero_stats_latency_ms_p50 {:.4}\n\
# TYPE hero_stats_latency_ms_p95 gauge\n\
hero_stats_latency_ms_p95 {:.4}\n\
# TYPE hero_stats_latency_ms_p99 gauge\n\
hero_stats_latency_ms_p99 {:.4}\n\
# TYPE hero_stats_transport_queue_capacity gauge\n\
hero_stats_transport_queue_capacity {}\n\
# TYPE hero_stats_transport_queue_depth gauge\n\
hero_stats_transport_queue_depth {}\n\
# TYPE hero_stats_transport_queue_full_reject_total counter\n\
hero_stats_transport_queue_full_reject_total {}\n\
# TYPE hero_stats_uptime_seconds gauge\n\
hero_stats_uptime_seconds {:.4}\n",
            self.http_requests_total,
            self.health_requests_total,
            self.metrics_requests_total,
            self.stats_requests_total,
            self.stats_success_total,
            self.stats_failure_total,
            self.stats_last_hero_count,
            latency_p50,
            latency_p95,
            latency_p99,
            transport_queue_capacity,
            transport_queue_depth,
            transport_queue_full_reject_total,
            uptime_seconds
        )
    }
}

const BACKPRESSURE_QUEUE_FULL_MESSAGE: &str = "service unavailable: hero stats worker queue full";

pub(crate) fn backpressure_rejection_response() -> HttpResponse {
    HttpResponse::service_unavailable(BACKPRESSURE_QUEUE_FULL_MESSAGE)
}

fn write_backpressure_response(mut stream: TcpStream) -> std::io::Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;
    stream.write_all(&render_response_bytes(&backpressure_rejection_response()))
}

fn build_runtime(worker_threads: usize) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
}

/// Serves the stats routes from a pool of `worker_count` threads fed through a
/// bounded queue. Connections arriving while the queue is full get a 503.
pub fn serve_http_with_workers(
    source: &dyn DatasetSource,
    bind_addr: &str,
    options: HandlerOptions,
    worker_count: usize,
    queue_capacity: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    let worker_count = worker_count.max(1);
    let queue_capacity = queue_capacity.max(worker_count);
    let runtime = build_runtime(worker_count)?;
    let metrics = Arc::new(Mutex::new(TransportMetrics::default()));
    let backpressure_metrics = Arc::new(TransportBackpressureMetrics::new(queue_capacity));
    if let Ok(mut guard) = metrics.lock() {
        guard.set_transport_backpressure_metrics(Arc::clone(&backpressure_metrics));
    }
    let (tx, rx) = mpsc::sync_channel::<TcpStream>(queue_capacity);
    let rx = Arc::new(Mutex::new(rx));
    info!(bind_addr, worker_count, queue_capacity, "hero stats transport started");

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let metrics = Arc::clone(&metrics);
            let rx = Arc::clone(&rx);
            let backpressure_metrics = Arc::clone(&backpressure_metrics);
            let runtime = &runtime;
            let options = &options;
            scope.spawn(move || {
                loop {
                    let stream = {
                        let guard = match rx.lock() {
                            Ok(guard) => guard,
                            Err(_) => break,
                        };
                        match guard.recv() {
                            Ok(stream) => {
                                backpressure_metrics.observe_dequeued();
                                stream
                            }
                            Err(_) => break,
                        }
                    };
                    if let Err(err) = handle_connection(source, options, runtime, stream, &metrics)
                    {
                        error!(error = %err, "hero stats transport error");
                    }
                }
            });
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    backpressure_metrics.observe_enqueued();
                    match tx.try_send(stream) {
                        Ok(()) => {}
                        Err(mpsc::TrySendError::Full(stream)) => {
                            backpressure_metrics.observe_dequeued();
                            backpressure_metrics.observe_rejected();
                            warn!(queue_capacity, "hero stats worker queue full");
                            if let Err(err) = write_backpressure_response(stream) {
                                error!(error = %err, "backpressure response failed");
                            }
                        }
                        Err(mpsc::TrySendError::Disconnected(_)) => {
                            backpressure_metrics.observe_dequeued();
                            error!("hero stats worker queue closed");
                            break;
                        }
                    }
                }
                Err(err) => error!(error = %err, "hero stats transport accept error"),
            }
        }
        drop(tx);
    });

    Ok(())
}

pub fn serve_http_once_with_listener(
    source: &dyn DatasetSource,
    options: HandlerOptions,
    listener: TcpListener,
) -> std::io::Result<()> {
    let runtime = build_runtime(1)?;
    let metrics = Arc::new(Mutex::new(TransportMetrics::default()));
    let (stream, _) = listener.accept()?;
    handle_connection(source, &options, &runtime, stream, &metrics)
}

/// Answers one raw HTTP/1.1 request held in memory and returns the rendered
/// response bytes.
pub async fn handle_http_request_bytes(
    source: &dyn DatasetSource,
    options: &HandlerOptions,
    raw_request: &[u8],
) -> Result<Vec<u8>, String> {
    let request = parse_http_request_bytes(raw_request)?;
    let metrics = Arc::new(Mutex::new(TransportMetrics::default()));
    let response = handle_request(source, options, &request, &metrics).await;
    Ok(render_response_bytes(&response))
}

fn handle_connection(
    source: &dyn DatasetSource,
    options: &HandlerOptions,
    runtime: &Runtime,
    mut stream: TcpStream,
    metrics: &Arc<Mutex<TransportMetrics>>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;
    stream.set_write_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;

    let request = match read_http_request(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(err) => {
            return write_response(&mut stream, HttpResponse::bad_request(&err));
        }
    };

    let response = runtime.block_on(handle_request(source, options, &request, metrics));
    write_response(&mut stream, response)
}

fn observe_http(metrics: &Mutex<TransportMetrics>, path: &str) {
    if let Ok(mut guard) = metrics.lock() {
        guard.observe_http(path);
    }
}

fn observe_stats(
    metrics: &Mutex<TransportMetrics>,
    status: u16,
    latency_ms: f64,
    hero_count: Option<usize>,
) {
    if let Ok(mut guard) = metrics.lock() {
        guard.observe_stats(status, latency_ms, hero_count);
    }
}

fn render_metrics(metrics: &Mutex<TransportMetrics>) -> String {
    match metrics.lock() {
        Ok(guard) => guard.render_prometheus(),
        Err(_) => String::new(),
    }
}

pub(crate) async fn handle_request(
    source: &dyn DatasetSource,
    options: &HandlerOptions,
    request: &HttpRequest,
    metrics: &Arc<Mutex<TransportMetrics>>,
) -> HttpResponse {
    let path = request_path(&request.target);
    observe_http(metrics, path);
    debug!(
        method = %request.method,
        path,
        user_agent = request
            .headers
            .get("user-agent")
            .map(String::as_str)
            .unwrap_or("-"),
        "http request"
    );

    match (request.method.as_str(), path) {
        ("GET", "/health") => HttpResponse::ok_json("{\"status\":\"ok\"}".to_string()),
        ("GET", "/metrics") => HttpResponse::ok_text(render_metrics(metrics)),
        ("GET" | "POST", STATS_PATH) => {
            let started = Instant::now();
            let result = retrieve_global_stats(source, &options.report).await;
            let hero_count = result.as_ref().ok().map(|report| report.hero_stats.len());
            let envelope = respond(result, options.compress);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            observe_stats(metrics, envelope.status_code, latency_ms, hero_count);
            HttpResponse::from_envelope(&envelope)
        }
        (_, "/health" | "/metrics" | STATS_PATH) => {
            HttpResponse::method_not_allowed(&format!("method {} not allowed", request.method))
        }
        _ => HttpResponse::not_found("not found"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpRequest {
    pub(crate) method: String,
    pub(crate) target: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl HttpResponse {
    fn with_content_type(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    fn ok_json(body: String) -> Self {
        Self::with_content_type(200, "application/json", body.into_bytes())
    }

    fn ok_text(body: String) -> Self {
        Self::with_content_type(
            200,
            "text/plain; version=0.0.4; charset=utf-8",
            body.into_bytes(),
        )
    }

    fn error_json(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::with_content_type(status, "application/json", body.into_bytes())
    }

    pub(crate) fn bad_request(message: &str) -> Self {
        Self::error_json(400, message)
    }

    fn method_not_allowed(message: &str) -> Self {
        Self::error_json(405, message)
    }

    fn not_found(message: &str) -> Self {
        Self::error_json(404, message)
    }

    fn internal_server_error(message: &str) -> Self {
        Self::error_json(500, message)
    }

    fn service_unavailable(message: &str) -> Self {
        Self::error_json(503, message)
    }

    /// Maps an invocation envelope onto an HTTP response; a base64 body goes
    /// out as its decoded (still gzip-compressed) bytes.
    pub(crate) fn from_envelope(envelope: &TransportEnvelope) -> Self {
        match envelope.wire_body() {
            Ok(body) => Self {
                status: envelope.status_code,
                headers: envelope
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                body,
            },
            Err(err) => {
                error!(error = %err, "invalid envelope body");
                Self::internal_server_error(&err.to_string())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
