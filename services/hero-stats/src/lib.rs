pub mod api;
pub mod config;
pub mod fixtures;
pub mod observability;
pub mod transport;
#[cfg(feature = "async-transport")]
pub mod transport_axum;

use store::DatasetSource;

use crate::{
    api::retrieve_global_stats,
    transport::{
        HandlerOptions,
        envelope::{TransportEnvelope, respond},
    },
};

/// One function-style invocation: builds the report and wraps it in the
/// response envelope.
pub async fn invoke(source: &dyn DatasetSource, options: &HandlerOptions) -> TransportEnvelope {
    respond(
        retrieve_global_stats(source, &options.report).await,
        options.compress,
    )
}
