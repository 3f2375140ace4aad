use crate::error::{FlowError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used as the filter.
pub fn init_tracing(level: &str, show_target: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| FlowError::Telemetry(format!("Invalid log filter {level:?}: {e}")))?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(show_target);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| FlowError::Telemetry(format!("Failed to set global tracing subscriber: {e}")))
}
