//! Application configuration module
//! Handles environment variable loading, configuration validation, and gateway settings

use crate::payments::crypto::Credentials;
use crate::payments::order_ref::TradeNoFormat;
use crate::payments::types::{Endpoint, GatewayEnvironment, OrderId};
use chrono::FixedOffset;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewaySettings,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

pub const INSTALLMENT_COUNTS: [u32; 7] = [3, 6, 9, 12, 18, 24, 30];

/// Operator-facing gateway settings. Read through [`SettingsHandle`] at call time.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub test_mode: bool,
    pub live: Credentials,
    pub test: Credentials,
    pub language: String,
    pub einvoice_enabled: bool,
    pub auto_cancel_enabled: bool,
    pub auto_cancel_delay_minutes: u32,
    pub business_offset: FixedOffset,
    pub trade_no_format: TradeNoFormat,
    pub atm_expire_days: u32,
    pub cvs_expire_days: u32,
    pub installments: Vec<u32>,
    pub installment_min_amount: Decimal,
    pub aftee_min_amount: Decimal,
    pub http_timeout_secs: u64,
    pub notify_url: String,
    pub return_url: String,
    pub receipt_url_template: String,
    pub home_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let server = ServerConfig::from_env()?;
        let gateway = GatewaySettings::from_env(&server.public_base_url)?;

        Ok(AppConfig {
            server,
            logging: LoggingConfig::from_env()?,
            gateway,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.gateway.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?;
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(ServerConfig {
            host,
            port,
            public_base_url,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string())),
        },
        Err(_) => Ok(default),
    }
}

fn env_parse<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn credentials_from_env(suffix: &str) -> Credentials {
    let read = |name: &str| env::var(format!("{}{}", name, suffix)).unwrap_or_default();
    Credentials::new(
        read("PAYUNI_MERCHANT_ID"),
        read("PAYUNI_HASH_KEY"),
        read("PAYUNI_HASH_IV"),
    )
}

/// Parses `+08:00`, `-0530` or `8` style offsets.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 && rest.bytes().all(|b| b.is_ascii_digit()) =>(rest[..2].parse().ok()?, rest[2..].parse().ok()?),
        None => (rest.parse().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl GatewaySettings {
    pub fn from_env(public_base_url: &str) -> Result<Self, ConfigError> {
        let base = public_base_url.trim_end_matches('/');

        let business_offset = {
            let raw = env::var("PAYUNI_BUSINESS_UTC_OFFSET").unwrap_or_else(|_| "+08:00".to_string());
            parse_utc_offset(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("PAYUNI_BUSINESS_UTC_OFFSET".to_string()))?
        };

        let trade_no_format = env::var("PAYUNI_TRADE_NO_FORMAT")
            .unwrap_or_else(|_| "delimited".to_string())
            .parse::<TradeNoFormat>()
            .map_err(|_| ConfigError::InvalidValue("PAYUNI_TRADE_NO_FORMAT".to_string()))?;

        let mut installments = Vec::new();
        for part in env::var("PAYUNI_INSTALLMENTS").unwrap_or_default().split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            let count: u32 = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYUNI_INSTALLMENTS".to_string()))?;
            installments.push(count);
        }

        let receipt_url_template = env::var("PAYUNI_RECEIPT_URL_TEMPLATE")
            .unwrap_or_else(|_| "{base}/checkout/order-received/{order_id}".to_string())
            .replace("{base}", base);

        Ok(GatewaySettings {
            test_mode: env_bool("PAYUNI_TESTMODE_ENABLED", true)?,
            live: credentials_from_env(""),
            test: credentials_from_env("_TEST"),
            language: env::var("PAYUNI_LANGUAGE").unwrap_or_else(|_| "zh-tw".to_string()),
            einvoice_enabled: env_bool("PAYUNI_EINVOICE_ENABLED", false)?,
            auto_cancel_enabled: env_bool("PAYUNI_AUTO_CANCEL_ENABLED", false)?,
            auto_cancel_delay_minutes: env_parse("PAYUNI_AUTO_CANCEL_DELAY_MINUTES", "10")?,
            business_offset,
            trade_no_format,
            atm_expire_days: env_parse("PAYUNI_ATM_EXPIRE_DAYS", "7")?,
            cvs_expire_days: env_parse("PAYUNI_CVS_EXPIRE_DAYS", "7")?,
            installments,
            installment_min_amount: env_parse("PAYUNI_INSTALLMENT_MIN_AMOUNT", "0")?,
            aftee_min_amount: env_parse("PAYUNI_AFTEE_MIN_AMOUNT", "0")?,
            http_timeout_secs: env_parse("PAYUNI_HTTP_TIMEOUT_SECS", "30")?,
            notify_url: format!("{}/payuni/notify", base),
            return_url: format!("{}/payuni/return", base),
            receipt_url_template,
            home_url: format!("{}/", base),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (name, credentials) = if self.test_mode {
            ("PAYUNI_*_TEST", &self.test)
        } else {
            ("PAYUNI_*", &self.live)
        };
        credentials
            .validate()
            .map_err(|reason| ConfigError::ValidationFailed(format!("{}: {}", name, reason)))?;

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYUNI_HTTP_TIMEOUT_SECS".to_string(),
            ));
        }

        if let Some(count) = self
            .installments
            .iter()
            .find(|count| !INSTALLMENT_COUNTS.contains(count))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "PAYUNI_INSTALLMENTS: unsupported installment count {}",
                count
            )));
        }

        if !self.receipt_url_template.contains("{order_id}") {
            return Err(ConfigError::InvalidValue(
                "PAYUNI_RECEIPT_URL_TEMPLATE must contain {order_id}".to_string(),
            ));
        }

        Ok(())
    }

    pub fn environment(&self) -> GatewayEnvironment {
        if self.test_mode {
            GatewayEnvironment::Sandbox
        } else {
            GatewayEnvironment::Production
        }
    }

    pub fn active_credentials(&self) -> &Credentials {
        if self.test_mode {
            &self.test
        } else {
            &self.live
        }
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        endpoint.url(self.environment())
    }

    pub fn receipt_url(&self, order_id: OrderId) -> String {
        self.receipt_url_template
            .replace("{order_id}", &order_id.to_string())
    }
}

/// Shared, runtime-mutable gateway settings.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<GatewaySettings>>,
}

impl SettingsHandle {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> GatewaySettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut GatewaySettings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }

    pub fn set_test_mode(&self, enabled: bool) {
        self.update(|settings| settings.test_mode = enabled);
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
