use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderName, HeaderValue, Request, Response, StatusCode},
    response::IntoResponse,
    routing::any,
};
use store::DatasetSource;
use tracing::info;

use crate::transport::{
    HandlerOptions, HttpRequest, HttpResponse, MAX_HTTP_BODY_BYTES, TransportMetrics,
    handle_request,
};

#[derive(Clone)]
struct AppState {
    source: Arc<dyn DatasetSource>,
    options: HandlerOptions,
    metrics: Arc<Mutex<TransportMetrics>>,
}

pub fn serve_http_with_axum(
    source: Arc<dyn DatasetSource>,
    bind_addr: &str,
    options: HandlerOptions,
    worker_threads: usize,
) -> Result<(), String> {
    let worker_threads = worker_threads.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = bind_addr.to_string();
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
        info!(%bind_addr, worker_threads, "hero stats axum transport started");

        let app = router(AppState {
            source,
            options,
            metrics: Arc::new(Mutex::new(TransportMetrics::default())),
        });

        axum::serve(listener, app)
            .await
            .map_err(|e| format!("axum server failed: {e}"))
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .fallback(any(dispatch))
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES))
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> impl IntoResponse {
    let method = request.method().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut headers = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let body = match to_bytes(request.into_body(), MAX_HTTP_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => {
            return response_from_transport(HttpResponse::bad_request(&format!(
                "request body error: {err}"
            )));
        }
    };

    let request = HttpRequest {
        method,
        target,
        headers,
        body,
    };

    let response = handle_request(
        state.source.as_ref(),
        &state.options,
        &request,
        &state.metrics,
    )
    .await;
    response_from_transport(response)
}

fn response_from_transport(response: HttpResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}
