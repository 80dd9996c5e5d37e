//! Log output setup.
//!
//! Library code only emits `tracing` events; the binary calls [`init`] once
//! to install a subscriber. `RUST_LOG` wins over the configured filter.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSettings};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("a global subscriber is already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global `tracing` subscriber described by `settings`.
pub fn init(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let filter = build_filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()?,
    }
    Ok(())
}

fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.filter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directive_lists() {
        let settings = LoggingSettings {
            filter: "info,greeting_cache=debug,redis=warn".to_owned(),
            ..LoggingSettings::default()
        };
        assert!(build_filter(&settings).is_ok());
    }
}
