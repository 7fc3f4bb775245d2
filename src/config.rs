use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub mail: MailConfig,
    pub notify_queue_capacity: usize,
    pub catalog_fetch_timeout_secs: u64,
    /// Requests per minute per client address on `/api`; 0 turns throttling off.
    pub rate_limit_per_minute: u32,
}

/// SMTP settings. Without `smtp_host` outgoing mail is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from: "noreply@localhost".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("APP_PORT", 3000);

        let mail = MailConfig {
            smtp_host: env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()),
            smtp_port: parse_var("SMTP_PORT", 587),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            from: env::var("EMAIL_FROM").unwrap_or_else(|_| "noreply@localhost".to_string()),
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10),
            host,
            port,
            jwt_secret,
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", 24),
            mail,
            notify_queue_capacity: parse_var("NOTIFY_QUEUE_CAPACITY", 1024),
            catalog_fetch_timeout_secs: parse_var("CATALOG_FETCH_TIMEOUT_SECS", 30),
            rate_limit_per_minute: parse_var("RATE_LIMIT_PER_MINUTE", 60),
        })
    }

    /// Configuration for a throwaway database, used by tests and local tooling.
    pub fn for_database(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: 1,
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 24,
            mail: MailConfig::default(),
            notify_queue_capacity: 64,
            catalog_fetch_timeout_secs: 5,
            rate_limit_per_minute: 0,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
