use crate::notifications::NotifierConfig;
use crate::payments::providers::MoolreConfig;
use crate::payments::PaymentSettings;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    /// `None` when the gateway credentials are incomplete
    pub moolre: Option<MoolreConfig>,
    pub payments: PaymentSettings,
    pub notifications: NotifierConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Public origin used in gateway callback and redirect URLs
    pub app_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory order store
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Without a URL the rate limiter and cache are in-process
    pub url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server = ServerConfig {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            app_url: var("APP_URL").map(|url| url.trim_end_matches('/').to_string()),
        };

        let database = DatabaseConfig {
            url: var("DATABASE_URL"),
            max_connections: var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let redis = RedisConfig {
            url: var("REDIS_URL"),
        };

        let payments = PaymentSettings {
            callback_secret: var("MOOLRE_CALLBACK_SECRET"),
            trust_redirect_fallback: var("TRUST_REDIRECT_FALLBACK")
                .map(|v| parse_bool(&v))
                .transpose()
                .context("TRUST_REDIRECT_FALLBACK must be true or false")?
                .unwrap_or(false),
            status_cache_ttl: Duration::from_secs(
                var("GATEWAY_STATUS_CACHE_SECS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse()
                    .context("GATEWAY_STATUS_CACHE_SECS must be a valid number")?,
            ),
        };

        let config = Config {
            server,
            database,
            redis,
            moolre: MoolreConfig::from_lookup(&lookup),
            payments,
            notifications: NotifierConfig::from_lookup(&lookup),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.is_production() && self.database.url.is_none() {
            return Err(anyhow!("DATABASE_URL is required in production"));
        }

        if let Some(app_url) = &self.server.app_url {
            url::Url::parse(app_url).context("APP_URL must be an absolute URL")?;
        }

        // Validate database max connections
        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow!("expected a boolean, got {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.environment, "development");
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 20);
        assert!(config.moolre.is_none());
        assert!(!config.payments.trust_redirect_fallback);
        assert_eq!(config.payments.status_cache_ttl, Duration::from_secs(10));
        assert!(config.notifications.enabled_channels().is_empty());
    }

    #[test]
    fn test_full_configuration() {
        let config = load(&[
            ("PORT", "8080"),
            ("ENVIRONMENT", "production"),
            ("APP_URL", "https://shop.example.com/"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("MOOLRE_API_USER", "user"),
            ("MOOLRE_API_PUBKEY", "pk"),
            ("MOOLRE_ACCOUNT_NUMBER", "123"),
            ("MOOLRE_CALLBACK_SECRET", "s3cret"),
            ("TRUST_REDIRECT_FALLBACK", "true"),
            ("GATEWAY_STATUS_CACHE_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.server.app_url.as_deref(), Some("https://shop.example.com"));
        assert!(config.is_production());
        assert!(config.moolre.is_some());
        assert_eq!(config.payments.callback_secret.as_deref(), Some("s3cret"));
        assert!(config.payments.trust_redirect_fallback);
        assert_eq!(config.payments.status_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_failures() {
        assert!(load(&[("PORT", "80")]).is_err());
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("ENVIRONMENT", "qa")]).is_err());
        assert!(load(&[("ENVIRONMENT", "production")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "0")]).is_err());
        assert!(load(&[("APP_URL", "shop.example.com")]).is_err());
        assert!(load(&[("TRUST_REDIRECT_FALLBACK", "maybe")]).is_err());
    }
}
