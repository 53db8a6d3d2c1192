//! Console logging for the server.
//!
//! Filtering comes from `RUST_LOG` and defaults to `info`. The core crate's
//! `tracing` feature is enabled, so clock regressions, long stalls and
//! timestamp overflow surface here as well as request traces.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Call once, before anything logs.
///
/// `docker` selects one JSON object per line for log collectors; otherwise
/// the output is the multi-line pretty format.
pub fn init_telemetry(docker: bool) {
    let json = docker.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_current_span(false)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
    });
    let pretty = (!docker).then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_line_number(true)
            .with_target(false)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
            .with_file(true)
            .pretty()
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json)
        .with(pretty)
        .init();
}
