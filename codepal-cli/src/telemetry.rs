//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL holds the filter directives (e.g. "debug" or
//!   "warn,codepal::provider=debug").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Logs go to stderr; stdout belongs to the conversation.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "warn,codepal=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
