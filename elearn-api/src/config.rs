/// Configuration for the API server
///
/// Loaded once from environment variables (and a `.env` file in development)
/// and validated eagerly so a misconfigured deployment fails at startup.
///
/// # Environment Variables
///
/// | Variable | Default | |
/// |---|---|---|
/// | `DATABASE_URL` | required | PostgreSQL connection string |
/// | `DATABASE_MAX_CONNECTIONS` | `10` | |
/// | `API_HOST` / `API_PORT` | `0.0.0.0` / `8080` | bind address |
/// | `JWT_SECRET` | required | at least 32 characters |
/// | `CORS_ORIGINS` | `*` | comma-separated |
/// | `PRODUCTION` | `false` | enables HSTS |
/// | `FEDAPAY_API_KEY` | required | secret API key |
/// | `FEDAPAY_AUTH_KEY` | required | webhook signing secret |
/// | `FEDAPAY_ENVIRONMENT` | `sandbox` | `sandbox` or `live` |
/// | `FEDAPAY_API_URL` | per environment | |
/// | `FEDAPAY_TIMEOUT_SECS` | `15` | |
/// | `FEDAPAY_WEBHOOK_TOLERANCE_SECS` | unset | max signature age |
/// | `PUBLIC_CALLBACK_HOST` | required | host the gateway redirects to |
/// | `CERTIFICATE_THRESHOLD` | `100` | 1 to 100 |
/// | `CERTIFICATE_CODE_PREFIX` | `IFRI` | |
/// | `INSTITUTION_NAME` | IFRI | printed on certificates |
///
/// # Example
///
/// ```no_run
/// use elearn_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use anyhow::{bail, Context};
use elearn_shared::settings::{CertificateSettings, GatewayEnvironment, PaymentSettings};

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub payments: PaymentSettings,
    pub certificates: CertificateSettings,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode turns on HSTS
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret, at least 32 characters.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} environment variable is required", key));

        let port = parse_or(var("API_PORT"), 8080u16, "API_PORT")?;
        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let production = parse_bool(var("PRODUCTION"));

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters long");
        }

        let environment = match var("FEDAPAY_ENVIRONMENT") {
            Some(raw) => GatewayEnvironment::from_str(&raw).map_err(anyhow::Error::msg)?,
            None => GatewayEnvironment::Sandbox,
        };

        let mut payments = PaymentSettings::new(
            required("FEDAPAY_API_KEY")?,
            required("FEDAPAY_AUTH_KEY")?,
            environment,
            required("PUBLIC_CALLBACK_HOST")?,
        );
        if let Some(url) = var("FEDAPAY_API_URL") {
            payments.api_url = url.trim_end_matches('/').to_string();
        }
        payments.timeout_secs = parse_or(var("FEDAPAY_TIMEOUT_SECS"), 15u64, "FEDAPAY_TIMEOUT_SECS")?;
        payments.webhook_tolerance_secs = var("FEDAPAY_WEBHOOK_TOLERANCE_SECS")
            .map(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .context("FEDAPAY_WEBHOOK_TOLERANCE_SECS must be a positive integer")
            })
            .transpose()?;

        if production && environment == GatewayEnvironment::Sandbox {
            tracing::warn!("Running in production mode against the FedaPay sandbox");
        }

        let defaults = CertificateSettings::default();
        let threshold = parse_or(var("CERTIFICATE_THRESHOLD"), defaults.threshold, "CERTIFICATE_THRESHOLD")?;
        if !(1..=100).contains(&threshold) {
            bail!("CERTIFICATE_THRESHOLD must be between 1 and 100, got {}", threshold);
        }
        let certificates = CertificateSettings {
            threshold,
            code_prefix: var("CERTIFICATE_CODE_PREFIX").unwrap_or(defaults.code_prefix),
            institution_name: var("INSTITUTION_NAME").unwrap_or(defaults.institution_name),
        };
        if !certificates.code_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("CERTIFICATE_CODE_PREFIX must be alphanumeric");
        }

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parse_or(var("DATABASE_MAX_CONNECTIONS"), 10u32, "DATABASE_MAX_CONNECTIONS")?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            payments,
            certificates,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T, key: &str) -> anyhow::Result<T> {
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/elearn"),
            ("JWT_SECRET", "test-secret-key-at-least-32-bytes-long"),
            ("FEDAPAY_API_KEY", "sk_sandbox_x"),
            ("FEDAPAY_AUTH_KEY", "whsec_x"),
            ("PUBLIC_CALLBACK_HOST", "learn.example.bj"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> anyhow::Result<Config> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert!(!config.api.production);
        assert_eq!(config.payments.environment, GatewayEnvironment::Sandbox);
        assert_eq!(config.payments.currency, "XOF");
        assert_eq!(config.payments.webhook_tolerance_secs, None);
        assert_eq!(config.certificates.threshold, 100);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_overrides() {
        let mut vars = base();
        vars.insert("FEDAPAY_ENVIRONMENT", "live");
        vars.insert("FEDAPAY_API_URL", "https://gateway.internal/");
        vars.insert("FEDAPAY_WEBHOOK_TOLERANCE_SECS", "300");
        vars.insert("CERTIFICATE_THRESHOLD", "80");
        vars.insert("CORS_ORIGINS", "https://a.bj, https://b.bj");
        vars.insert("PRODUCTION", "true");

        let config = load(&vars).unwrap();
        assert_eq!(config.payments.environment, GatewayEnvironment::Live);
        assert_eq!(config.payments.api_url, "https://gateway.internal");
        assert_eq!(config.payments.webhook_tolerance_secs, Some(300));
        assert_eq!(config.certificates.threshold, 80);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert!(config.api.production);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut vars = base();
        vars.insert("JWT_SECRET", "short");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("CERTIFICATE_THRESHOLD", "0");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.insert("FEDAPAY_ENVIRONMENT", "staging");
        assert!(load(&vars).is_err());

        let mut vars = base();
        vars.remove("FEDAPAY_AUTH_KEY");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("FEDAPAY_AUTH_KEY"));
    }
}
