use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::services::dodo::signature::DEFAULT_TOLERANCE_SECONDS;

pub const DODO_TEST_BASE_URL: &str = "https://test.dodopayments.com";
pub const DODO_LIVE_BASE_URL: &str = "https://live.dodopayments.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DodoEnvironment {
    TestMode,
    LiveMode,
}

impl DodoEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            DodoEnvironment::TestMode => DODO_TEST_BASE_URL,
            DodoEnvironment::LiveMode => DODO_LIVE_BASE_URL,
        }
    }
}

impl FromStr for DodoEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test_mode" | "test" => Ok(DodoEnvironment::TestMode),
            "live_mode" | "live" => Ok(DodoEnvironment::LiveMode),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DodoSettings {
    pub api_key: Option<String>,
    pub environment: DodoEnvironment,
    pub base_url: String,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_seconds: i64,
}

#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Zero disables the reconciliation loop.
    pub reconcile_interval_seconds: u64,
    pub reconcile_batch_size: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub per_millisecond: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub app_url: String,
    pub bind_addr: SocketAddr,
    pub dodo: DodoSettings,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub supabase_jwt_secret: Option<String>,
    pub admin: Option<AdminCredentials>,
    pub auth_cookie_secure: bool,
    pub worker: WorkerSettings,
    pub rate_limit: RateLimitSettings,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = required("DATABASE_URL")?;
        let frontend_origin = required("FRONTEND_ORIGIN")?;
        let app_url = optional("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let bind_addr = parsed("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080)))?;

        let environment = parsed("DODO_PAYMENTS_ENVIRONMENT", DodoEnvironment::LiveMode)?;
        let dodo = DodoSettings {
            api_key: optional("DODO_PAYMENTS_API_KEY"),
            environment,
            base_url: optional("DODO_PAYMENTS_BASE_URL")
                .unwrap_or_else(|| environment.base_url().to_string()),
            webhook_secret: optional("DODO_PAYMENTS_WEBHOOK_SECRET"),
            webhook_tolerance_seconds: parsed(
                "WEBHOOK_TOLERANCE_SECONDS",
                DEFAULT_TOLERANCE_SECONDS,
            )?,
        };

        let admin = match (optional("ADMIN_USERNAME"), optional("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminCredentials { username, password }),
            _ => None,
        };

        Ok(Config {
            database_url,
            frontend_origin,
            app_url,
            bind_addr,
            dodo,
            jwt_issuer: optional("JWT_ISSUER").unwrap_or_else(|| "credit-ledger".to_string()),
            jwt_audience: optional("JWT_AUDIENCE").unwrap_or_else(|| "credit-ledger-web".to_string()),
            supabase_jwt_secret: optional("SUPABASE_JWT_SECRET"),
            admin,
            auth_cookie_secure: parsed("AUTH_COOKIE_SECURE", true)?,
            worker: WorkerSettings {
                reconcile_interval_seconds: parsed("RECONCILE_INTERVAL_SECONDS", 60)?,
                reconcile_batch_size: parsed("RECONCILE_BATCH_SIZE", 100)?,
            },
            rate_limit: RateLimitSettings {
                per_millisecond: parsed("RATE_LIMITER_MILLISECONDS", 200)?,
                burst: parsed("RATE_LIMITER_BURST", 20)?,
            },
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Config {
            database_url: "postgres://localhost/test".into(),
            frontend_origin: "http://localhost:3000".into(),
            app_url: "http://localhost:3000".into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dodo: DodoSettings {
                api_key: Some("test-key".into()),
                environment: DodoEnvironment::TestMode,
                base_url: DODO_TEST_BASE_URL.into(),
                webhook_secret: None,
                webhook_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            },
            jwt_issuer: "test-issuer".into(),
            jwt_audience: "test-audience".into(),
            supabase_jwt_secret: None,
            admin: Some(AdminCredentials {
                username: "admin".into(),
                password: "correct horse battery staple".into(),
            }),
            auth_cookie_secure: false,
            worker: WorkerSettings {
                reconcile_interval_seconds: 0,
                reconcile_batch_size: 100,
            },
            rate_limit: RateLimitSettings {
                per_millisecond: 200,
                burst: 20,
            },
        }
    }
}
