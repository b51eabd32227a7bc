//! tracing-subscriber initialization.
//!
//! JSON lines in production so the log pipeline can index the interaction
//! fields; compact human-readable output everywhere else.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "clinic_bot_server=info,interaction=info,tower_http=info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}
