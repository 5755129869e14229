/// Configuration management for Blog Service
///
/// This module handles loading and managing configuration from environment
/// variables. `main` loads a `.env` file first when one is present.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Page cache configuration
    pub cache: CacheConfig,
    /// Feed pagination configuration
    pub feed: FeedConfig,
    /// Token and session configuration
    pub auth: AuthConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
    /// Directory uploaded images are written under
    pub media_root: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

/// Which entity store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("Unknown STORE_BACKEND '{}'", other)),
        }
    }
}

/// Database configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
    /// Min connections in pool
    pub min_connections: u32,
    /// Timeout for establishing and acquiring connections
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Page cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL; the in-process cache is used when unset
    pub redis_url: Option<String>,
    /// Time-to-live of cached global feed pages
    pub page_ttl_secs: u64,
}

/// Feed pagination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub page_size: usize,
}

/// Token and session configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub session_cookie_name: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("session_cookie_name", &self.session_cookie_name)
            .finish()
    }
}

const DEV_JWT_SECRET: &str = "development-only-secret-change-me-please";

fn parse_env_or_default<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} has an invalid value '{}'", key, value)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        let cors = {
            let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                Ok(value) => value,
                Err(_) if production => {
                    return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                }
                Err(_) => "http://localhost:3000".to_string(),
            };

            if production && allowed_origins.trim() == "*" {
                return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
            }

            CorsConfig { allowed_origins }
        };

        let auth = {
            let jwt_secret = match std::env::var("JWT_SECRET") {
                Ok(secret) => secret,
                Err(_) if production => {
                    return Err("JWT_SECRET must be set in production".to_string())
                }
                Err(_) => DEV_JWT_SECRET.to_string(),
            };

            if jwt_secret.len() < crypto_core::jwt::MIN_SECRET_LEN {
                return Err(format!(
                    "JWT_SECRET must be at least {} bytes",
                    crypto_core::jwt::MIN_SECRET_LEN
                ));
            }

            AuthConfig {
                jwt_secret,
                access_ttl_secs: parse_env_or_default("JWT_ACCESS_TTL_SECS", 300)?,
                refresh_ttl_secs: parse_env_or_default("JWT_REFRESH_TTL_SECS", 86_400)?,
                session_cookie_name: std::env::var("SESSION_COOKIE_NAME")
                    .unwrap_or_else(|_| "sessionid".to_string()),
            }
        };

        let page_size: usize = parse_env_or_default("FEED_PAGE_SIZE", 10)?;
        if page_size == 0 {
            return Err("FEED_PAGE_SIZE must be greater than zero".to_string());
        }

        Ok(Config {
            app: AppConfig {
                env: app_env,
                host: std::env::var("BLOG_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("BLOG_SERVICE_PORT", 8000)?,
                media_root: std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()),
            },
            cors,
            database: DatabaseConfig {
                backend: parse_env_or_default("STORE_BACKEND", StoreBackend::Postgres)?,
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/inkwell".to_string()),
                max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env_or_default("DATABASE_MIN_CONNECTIONS", 1)?,
                connect_timeout_secs: parse_env_or_default("DATABASE_CONNECT_TIMEOUT_SECS", 5)?,
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
                page_ttl_secs: parse_env_or_default("PAGE_CACHE_TTL_SECS", 20)?,
            },
            feed: FeedConfig { page_size },
            auth,
        })
    }

    /// Configuration for in-process runs (tests, local tooling)
    pub fn for_memory() -> Self {
        Config {
            app: AppConfig {
                env: "test".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
                media_root: std::env::temp_dir()
                    .join("inkwell-media")
                    .to_string_lossy()
                    .into_owned(),
            },
            cors: CorsConfig {
                allowed_origins: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: String::new(),
                max_connections: 1,
                min_connections: 0,
                connect_timeout_secs: 1,
            },
            cache: CacheConfig {
                redis_url: None,
                page_ttl_secs: 20,
            },
            feed: FeedConfig { page_size: 10 },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                access_ttl_secs: 300,
                refresh_ttl_secs: 86_400,
                session_cookie_name: "sessionid".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "APP_ENV",
            "CORS_ALLOWED_ORIGINS",
            "JWT_SECRET",
            "FEED_PAGE_SIZE",
            "PAGE_CACHE_TTL_SECS",
            "STORE_BACKEND",
            "REDIS_URL",
            "BLOG_SERVICE_PORT",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.feed.page_size, 10);
        assert_eq!(config.cache.page_ttl_secs, 20);
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.database.backend, StoreBackend::Postgres);
        assert!(config.cache.redis_url.is_none());
        assert_eq!(config.auth.session_cookie_name, "sessionid");
    }

    #[test]
    #[serial]
    fn test_production_requires_secret_and_origins() {
        clear_env();
        std::env::set_var("APP_ENV", "production");
        assert!(Config::from_env().is_err());

        std::env::set_var("CORS_ALLOWED_ORIGINS", "*");
        std::env::set_var("JWT_SECRET", "x".repeat(40));
        assert!(Config::from_env().is_err());

        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://inkwell.dev");
        assert!(Config::from_env().is_ok());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_are_errors() {
        clear_env();
        std::env::set_var("FEED_PAGE_SIZE", "ten");
        assert!(Config::from_env().is_err());

        std::env::set_var("FEED_PAGE_SIZE", "0");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_store_backend_parsing() {
        clear_env();
        std::env::set_var("STORE_BACKEND", "memory");
        assert_eq!(
            Config::from_env().unwrap().database.backend,
            StoreBackend::Memory
        );
        assert!("sqlite".parse::<StoreBackend>().is_err());
        clear_env();
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::for_memory();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(DEV_JWT_SECRET));
        assert!(rendered.contains("[REDACTED]"));
    }
}
