//! Tracing subscriber setup

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel};

/// Filter directives for `level`, used when `RUST_LOG` is unset
pub fn default_directives(level: LogLevel) -> String {
    format!("wb_discovery={level},wb_conventions={level},rumqttc=warn")
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(LogLevel::Debug),
            "wb_discovery=debug,wb_conventions=debug,rumqttc=warn"
        );
    }
}
