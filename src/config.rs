use anyhow::{Context, Result};

/// Maximum accepted message body size in bytes
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Maximum accepted disappearing duration (one year, seconds)
pub const MAX_DISAPPEAR_SECS: i64 = 365 * 24 * 60 * 60;

/// Default heartbeat interval for live connections (seconds)
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// Server configuration loaded from the environment
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Interval between keep-alive frames on live connections
    pub heartbeat_interval_secs: u64,
    /// Origins allowed to subscribe to the event stream (exact match, echoed back)
    pub allowed_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Access token TTL in hours (for tokens minted by this server)
    pub access_token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let heartbeat_interval_secs = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_HEARTBEAT_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .context("HEARTBEAT_INTERVAL_SECS must be a positive integer")?;
        if heartbeat_interval_secs == 0 {
            anyhow::bail!("HEARTBEAT_INTERVAL_SECS must be greater than zero");
        }

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let jwt_issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "courier".to_string());

        let access_token_ttl_hours = std::env::var("ACCESS_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse::<i64>()
            .context("ACCESS_TOKEN_TTL_HOURS must be an integer")?;

        Ok(Self {
            host,
            port,
            heartbeat_interval_secs,
            allowed_origins,
            jwt_secret,
            jwt_issuer,
            access_token_ttl_hours,
        })
    }

    /// True if the given Origin header value may subscribe to the stream
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}
