//! Tracing setup

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG`, when set, overrides the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init(),
    };

    // A second init (tests, embedding) keeps the existing subscriber.
    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}

/// Shortens a merchant id for log output: `S01234567` -> `S01***67`.
pub fn mask_merchant_id(merchant_id: &str) -> String {
    let chars: Vec<char> = merchant_id.chars().collect();
    if chars.len() <= 5 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_merchant_id() {
        assert_eq!(mask_merchant_id("S01234567"), "S01***67");
        assert_eq!(mask_merchant_id("S01"), "***");
    }
}
