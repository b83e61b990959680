use std::path::PathBuf;
use std::time::Duration;

/// Settlement currency accepted by the payment network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Khr,
    Usd,
}

impl Currency {
    /// ISO 4217 numeric code used inside the QR payload.
    pub fn numeric_code(self) -> &'static str {
        match self {
            Currency::Khr => "116",
            Currency::Usd => "840",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Khr => "KHR",
            Currency::Usd => "USD",
        }
    }
}

/// Merchant profile and API credential for the Bakong payment network.
#[derive(Debug, Clone)]
pub struct BakongConfig {
    pub api_base: String,
    pub api_token: String,
    pub account: String,
    pub merchant_name: String,
    pub merchant_city: String,
    pub phone_number: String,
    pub store_label: String,
    pub terminal_label: String,
    pub currency: Currency,
    pub request_timeout: Duration,
}

/// Process configuration, read once at startup and handed to each service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub upload_dir: PathBuf,
    pub frontend_url: Option<String>,
    pub bakong: BakongConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {0:?}")]
    Missing(Vec<&'static str>),
    #[error("JWT_SECRET must be at least 32 characters long")]
    WeakSecret,
    #[error("CURRENCY must be KHR or USD, got {0:?}")]
    BadCurrency(String),
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = ["JWT_SECRET", "BAKONG_TOKEN", "BAKONG_ACCOUNT"];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|v| std::env::var(v).is_err())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.len() < 32 {
            return Err(ConfigError::WeakSecret);
        }

        let currency = match env_or("CURRENCY", "KHR").to_uppercase().as_str() {
            "KHR" => Currency::Khr,
            "USD" => Currency::Usd,
            other => return Err(ConfigError::BadCurrency(other.to_string())),
        };

        let timeout_secs: u64 = std::env::var("BAKONG_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            jwt_secret,
            token_ttl_secs: std::env::var("TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60 * 60 * 24),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            frontend_url: std::env::var("FRONTEND_URL").ok(),
            bakong: BakongConfig {
                api_base: env_or("BAKONG_API_BASE", "https://api-bakong.nbc.gov.kh"),
                api_token: std::env::var("BAKONG_TOKEN").unwrap_or_default(),
                account: std::env::var("BAKONG_ACCOUNT").unwrap_or_default(),
                merchant_name: env_or("MERCHANT_NAME", "NEW GENERATION"),
                merchant_city: env_or("MERCHANT_CITY", "Phnom Penh"),
                phone_number: env_or("MERCHANT_PHONE", "85581451884"),
                store_label: env_or("STORE_LABEL", "RAKShop"),
                terminal_label: env_or("TERMINAL_LABEL", "Cashier-01"),
                currency,
                request_timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}
