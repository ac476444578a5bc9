use std::time::Duration;

use anyhow::{bail, Context};
use argon2::Params;
use secrecy::{ExposeSecret, SecretString};

/// Token signing settings.
#[derive(Debug)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub ttl_minutes: i64,
}

impl JwtConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs((self.ttl_minutes as u64) * 60)
    }
}

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub hashing: HashConfig,
    /// Adds `Secure` to the session cookie.
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").context("DATABASE_URL env not set")?;

        let secret = lookup("JWT_SECRET")
            .or_else(|| lookup("JWT_KEY"))
            .filter(|s| !s.is_empty())
            .context("JWT_SECRET env not set")?;

        let ttl_minutes: i64 = parse_or(&lookup, "JWT_TTL_MINUTES", 60)?;
        if ttl_minutes <= 0 {
            bail!("JWT_TTL_MINUTES must be positive, got {ttl_minutes}");
        }

        let development = lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("development"));
        let cookie_secure = parse_or(&lookup, "COOKIE_SECURE", !development)?;

        let defaults = HashConfig::default();
        let hashing = HashConfig {
            memory_kib: parse_or(&lookup, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&lookup, "ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 8080)?,
            db: DbConfig {
                url,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
                acquire_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    5,
                )?),
            },
            jwt: JwtConfig {
                secret: SecretString::from(secret),
                ttl_minutes,
            },
            hashing,
            cookie_secure,
        })
    }

    /// True when the signing secret is shorter than an HS256 key should be.
    pub fn has_weak_secret(&self) -> bool {
        self.jwt.secret.expose_secret().len() < 32
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
