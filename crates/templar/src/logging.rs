//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the config's `[log].filter`, then
//! [`DEFAULT_FILTER`]. Logs go to stderr so command output on stdout stays
//! pipeable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

pub const DEFAULT_FILTER: &str = "templar=info,tower_http=info";

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: Option<&Config>) {
    let fallback = config
        .and_then(|c| c.log.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
