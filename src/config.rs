use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELEGRAM_API_ID must be set and valid")]
    MissingApiId,
    #[error("TELEGRAM_API_HASH must be set")]
    MissingApiHash,
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Credentials identifying this application to the messaging platform
#[derive(Clone, Debug)]
pub struct PlatformCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// Timing of the login completion protocol
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Interval between progress and session export checks
    pub poll_interval: Duration,
    /// Number of checks before giving up (20 × 500ms = 10s)
    pub poll_attempts: u32,
    /// Upper bound for a whole handshake, including waiting for user input
    pub handshake_timeout: Duration,
    /// Time after which an abandoned login is swept
    pub pending_ttl: Duration,
    /// How often the sweeper runs
    pub cleanup_interval: Duration,
}

impl AuthConfig {
    /// Total budget of one bounded polling phase
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval * self.poll_attempts
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_attempts: 20,
            handshake_timeout: Duration::from_secs(300),
            pending_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Long polling parameters
#[derive(Clone, Debug)]
pub struct PollConfig {
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    pub interval: Duration,
    pub fetch_limit: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(60),
            interval: Duration::from_secs(3),
            fetch_limit: 20,
        }
    }
}

/// Account seeded into the sandbox backend
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    pub phone: String,
    pub code: String,
    /// Two-factor password; `None` logs in with the code alone
    pub password: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            phone: "+15550100".to_string(),
            code: "12345".to_string(),
            password: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub credentials: PlatformCredentials,
    pub server_host: String,
    pub server_port: u16,
    /// Directory holding one session file per live client handle
    pub session_dir: PathBuf,
    /// Timeout applied to single platform calls
    pub call_timeout: Duration,
    /// Timeout applied to media downloads
    pub media_timeout: Duration,
    pub auth: AuthConfig,
    pub poll: PollConfig,
    pub cors_allowed_origins: String,
    /// Name of the platform backend the binary should start
    pub backend: String,
    pub sandbox: SandboxConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credentials: PlatformCredentials {
                api_id: 0,
                api_hash: String::new(),
            },
            server_host: "localhost".to_string(),
            server_port: 8080,
            session_dir: std::env::temp_dir().join("telegram-gateway-sessions"),
            call_timeout: Duration::from_secs(10),
            media_timeout: Duration::from_secs(30),
            auth: AuthConfig::default(),
            poll: PollConfig::default(),
            cors_allowed_origins: "*".to_string(),
            backend: "sandbox".to_string(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Failed to read .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_id = get("TELEGRAM_API_ID")
            .and_then(|v| v.trim().parse::<i32>().ok())
            .filter(|id| *id != 0)
            .ok_or(ConfigError::MissingApiId)?;
        let api_hash = get("TELEGRAM_API_HASH").ok_or(ConfigError::MissingApiHash)?;

        let server_port = match get("SERVER_PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT", port))?,
            None => defaults.server_port,
        };

        // Zero periods would panic tokio intervals, so they count as invalid
        let positive = |key: &str, raw: String, parsed: Option<Duration>, default: Duration| {
            parsed.filter(|d| !d.is_zero()).unwrap_or_else(|| {
                log::warn!("Invalid duration {} for {}, using default", raw, key);
                default
            })
        };
        let duration = |key: &str, default: Duration| match get(key) {
            Some(raw) => {
                let parsed = parse_duration(&raw);
                positive(key, raw, parsed, default)
            }
            None => default,
        };

        let auth = AuthConfig {
            poll_interval: match get("AUTH_POLL_INTERVAL_MS") {
                Some(raw) => {
                    let parsed = raw.trim().parse::<u64>().ok().map(Duration::from_millis);
                    positive("AUTH_POLL_INTERVAL_MS", raw, parsed, defaults.auth.poll_interval)
                }
                None => defaults.auth.poll_interval,
            },
            poll_attempts: get("AUTH_POLL_ATTEMPTS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.auth.poll_attempts),
            handshake_timeout: duration("HANDSHAKE_TIMEOUT", defaults.auth.handshake_timeout),
            pending_ttl: duration("SESSION_TIMEOUT", defaults.auth.pending_ttl),
            cleanup_interval: duration("CLEANUP_INTERVAL", defaults.auth.cleanup_interval),
        };

        let poll = PollConfig {
            default_timeout: duration("POLL_TIMEOUT", defaults.poll.default_timeout),
            max_timeout: duration("POLL_MAX_TIMEOUT", defaults.poll.max_timeout),
            interval: duration("POLL_INTERVAL", defaults.poll.interval),
            fetch_limit: defaults.poll.fetch_limit,
        };

        Ok(Self {
            credentials: PlatformCredentials { api_id, api_hash },
            server_host: get("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port,
            session_dir: get("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            call_timeout: duration("CALL_TIMEOUT", defaults.call_timeout),
            media_timeout: duration("MEDIA_TIMEOUT", defaults.media_timeout),
            auth,
            poll,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
            backend: get("GATEWAY_BACKEND").unwrap_or(defaults.backend),
            sandbox: SandboxConfig {
                phone: get("SANDBOX_PHONE").unwrap_or(defaults.sandbox.phone),
                code: get("SANDBOX_CODE").unwrap_or(defaults.sandbox.code),
                password: get("SANDBOX_PASSWORD"),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Parse `250ms`, `30s`, `5m`, `1h` or a bare number of seconds
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
