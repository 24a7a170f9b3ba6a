//! Environment-driven service configuration. Every `HERO_STATS_*` key falls
//! back to a legacy `BGS_*` spelling.

use std::str::FromStr;

use crate::{
    api::{ReportOptions, ReportVariant},
    observability::LogFormat,
    transport::{DEFAULT_HTTP_QUEUE_CAPACITY_PER_WORKER, DEFAULT_HTTP_WORKERS, HandlerOptions},
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRuntime {
    Std,
    Axum,
}

impl TransportRuntime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Std => "std",
            Self::Axum => "axum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub http_workers: usize,
    pub http_queue_capacity: usize,
    pub transport_runtime: TransportRuntime,
    pub dataset_path: Option<String>,
    pub log_format: LogFormat,
    pub handler: HandlerOptions,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let env = |name: &str| {
            lookup(&format!("HERO_STATS_{name}")).or_else(|| lookup(&format!("BGS_{name}")))
        };

        let http_workers = parse_positive::<usize>(env("HTTP_WORKERS").as_deref())
            .unwrap_or_else(default_http_workers);
        let http_queue_capacity = parse_positive::<usize>(env("HTTP_QUEUE_CAPACITY").as_deref())
            .unwrap_or_else(|| default_queue_capacity(http_workers));

        let transport_runtime = match env("TRANSPORT_RUNTIME").as_deref().map(str::trim) {
            Some("axum") => TransportRuntime::Axum,
            _ => TransportRuntime::Std,
        };
        let log_format = match env("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let defaults = ReportOptions::default();
        let report = ReportOptions {
            variant: ReportVariant::from_raw(env("REPORT_VARIANT").as_deref())?,
            warband_max_turn: parse_turn(env("WARBAND_MAX_TURN").as_deref(), "warband max turn")?
                .unwrap_or(defaults.warband_max_turn),
            winrate_max_turn: parse_turn(env("WINRATE_MAX_TURN").as_deref(), "winrate max turn")?
                .unwrap_or(defaults.winrate_max_turn),
        };

        Ok(Self {
            bind_addr: env("BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            http_workers,
            http_queue_capacity,
            transport_runtime,
            dataset_path: env("DATASET_PATH").filter(|path| !path.trim().is_empty()),
            log_format,
            handler: HandlerOptions {
                report,
                compress: parse_bool_default(env("COMPRESS").as_deref(), true),
            },
        })
    }
}

fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(DEFAULT_HTTP_WORKERS)
}

fn default_queue_capacity(worker_count: usize) -> usize {
    worker_count
        .saturating_mul(DEFAULT_HTTP_QUEUE_CAPACITY_PER_WORKER)
        .max(worker_count)
}

fn parse_positive<T>(raw: Option<&str>) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    raw.and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

fn parse_turn(raw: Option<&str>, field_name: &str) -> Result<Option<u32>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("{field_name} must be a non-negative integer, got '{value}'")),
    }
}

fn parse_bool_default(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(value) if matches!(value.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
