use hero_stats::{
    config::{ServiceConfig, TransportRuntime},
    fixtures::sample_store,
    invoke,
    observability::init_logging,
    transport::serve_http_with_workers,
};
use store::InMemoryStore;
use tracing::{error, info};

fn main() {
    let serve_mode = std::env::args().any(|arg| arg == "--serve");
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("hero-stats invalid configuration: {err}");
            std::process::exit(2);
        }
    };
    init_logging(config.log_format);

    let store = match config.dataset_path.as_deref() {
        Some(path) => match InMemoryStore::load_json_file(path) {
            Ok(store) => {
                info!(path, tables = store.table_names().len(), "loaded dataset file");
                store
            }
            Err(err) => {
                error!(path, error = %err, "failed loading dataset file");
                std::process::exit(1);
            }
        },
        None => {
            info!("no dataset path configured, using built-in sample datasets");
            sample_store()
        }
    };

    if !serve_mode {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "failed to build tokio runtime");
                std::process::exit(1);
            }
        };
        let envelope = runtime.block_on(invoke(&store, &config.handler));
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!(error = %err, "failed serializing envelope");
                std::process::exit(1);
            }
        }
        if envelope.status_code != 200 {
            std::process::exit(1);
        }
        return;
    }

    info!(
        bind_addr = %config.bind_addr,
        workers = config.http_workers,
        queue_capacity = config.http_queue_capacity,
        runtime = config.transport_runtime.as_str(),
        variant = config.handler.report.variant.as_str(),
        compress = config.handler.compress,
        "hero stats transport listening"
    );
    info!("health endpoint: http://{}/health", config.bind_addr);
    info!("metrics endpoint: http://{}/metrics", config.bind_addr);
    info!("stats endpoint: http://{}/v1/hero-stats", config.bind_addr);

    match config.transport_runtime {
        TransportRuntime::Std => {
            if let Err(err) = serve_http_with_workers(
                &store,
                &config.bind_addr,
                config.handler,
                config.http_workers,
                config.http_queue_capacity,
            ) {
                error!(error = %err, "hero stats transport failed");
                std::process::exit(1);
            }
        }
        TransportRuntime::Axum => {
            #[cfg(feature = "async-transport")]
            {
                if let Err(err) = hero_stats::transport_axum::serve_http_with_axum(
                    std::sync::Arc::new(store),
                    &config.bind_addr,
                    config.handler,
                    config.http_workers,
                ) {
                    error!(error = %err, "hero stats transport failed");
                    std::process::exit(1);
                }
            }
            #[cfg(not(feature = "async-transport"))]
            {
                error!("transport runtime 'axum' requires build feature 'async-transport'");
                std::process::exit(2);
            }
        }
    }
}
