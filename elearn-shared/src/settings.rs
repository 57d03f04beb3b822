/// Explicit settings passed into the payment and certificate services
///
/// These structs are built once at startup by the API crate's config loader and
/// then cloned into the services that need them. Nothing in this crate reads
/// environment variables directly.
///
/// # Example
///
/// ```
/// use elearn_shared::settings::{GatewayEnvironment, PaymentSettings};
///
/// let settings = PaymentSettings::new(
///     "sk_sandbox_xxx",
///     "whsec_xxx",
///     GatewayEnvironment::Sandbox,
///     "learn.example.org",
/// );
///
/// assert_eq!(settings.api_url, "https://sandbox-api.fedapay.com");
/// assert_eq!(
///     settings.callback_url(),
///     "https://learn.example.org/student/payment/callback/"
/// );
/// ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::gateway::CALLBACK_PATH;

/// FedaPay deployment the platform talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Sandbox,
    Live,
}

impl GatewayEnvironment {
    /// Default REST base URL for this environment
    pub fn default_api_url(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "https://sandbox-api.fedapay.com",
            GatewayEnvironment::Live => "https://api.fedapay.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "sandbox",
            GatewayEnvironment::Live => "live",
        }
    }
}

impl fmt::Display for GatewayEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(GatewayEnvironment::Sandbox),
            "live" | "production" => Ok(GatewayEnvironment::Live),
            other => Err(format!("unknown FedaPay environment '{}'", other)),
        }
    }
}

/// Settings for the FedaPay gateway and payment reconciliation
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Secret API key sent as a bearer token
    pub api_key: String,

    /// REST base URL (no trailing slash)
    pub api_url: String,

    /// Secret used to sign webhook deliveries
    pub webhook_secret: String,

    pub environment: GatewayEnvironment,

    /// Public host (optionally with scheme) the gateway redirects back to
    pub callback_host: String,

    /// ISO currency code for every transaction
    pub currency: String,

    /// Request timeout for gateway calls
    pub timeout_secs: u64,

    /// Maximum signature age accepted on webhooks, `None` disables the check
    pub webhook_tolerance_secs: Option<i64>,
}

impl PaymentSettings {
    /// Builds settings with the environment's default API URL and XOF currency
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        environment: GatewayEnvironment,
        callback_host: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: environment.default_api_url().to_string(),
            webhook_secret: webhook_secret.into(),
            environment,
            callback_host: callback_host.into(),
            currency: "XOF".to_string(),
            timeout_secs: 15,
            webhook_tolerance_secs: None,
        }
    }

    /// Absolute URL of the synchronous payment callback
    pub fn callback_url(&self) -> String {
        let host = self.callback_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host, CALLBACK_PATH)
        } else {
            format!("https://{}{}", host, CALLBACK_PATH)
        }
    }
}

/// Settings for certificate eligibility and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSettings {
    /// Default completion threshold (percent) when a course sets none
    pub threshold: u8,

    /// Prefix of verification codes, e.g. `IFRI-1A2B-3C4D`
    pub code_prefix: String,

    /// Institution printed on the certificate
    pub institution_name: String,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            threshold: 100,
            code_prefix: "IFRI".to_string(),
            institution_name: "Institut de Formation et de Recherche en Informatique".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_str() {
        assert_eq!(
            "sandbox".parse::<GatewayEnvironment>().unwrap(),
            GatewayEnvironment::Sandbox
        );
        assert_eq!(
            " LIVE ".parse::<GatewayEnvironment>().unwrap(),
            GatewayEnvironment::Live
        );
        assert!("staging".parse::<GatewayEnvironment>().is_err());
    }

    #[test]
    fn test_default_api_urls() {
        let sandbox = PaymentSettings::new("k", "s", GatewayEnvironment::Sandbox, "h");
        let live = PaymentSettings::new("k", "s", GatewayEnvironment::Live, "h");

        assert_eq!(sandbox.api_url, "https://sandbox-api.fedapay.com");
        assert_eq!(live.api_url, "https://api.fedapay.com");
        assert_eq!(sandbox.currency, "XOF");
        assert!(sandbox.webhook_tolerance_secs.is_none());
    }

    #[test]
    fn test_callback_url_keeps_explicit_scheme() {
        let settings = PaymentSettings::new(
            "k",
            "s",
            GatewayEnvironment::Sandbox,
            "http://localhost:8080/",
        );
        assert_eq!(
            settings.callback_url(),
            "http://localhost:8080/student/payment/callback/"
        );
    }

    #[test]
    fn test_certificate_defaults() {
        let settings = CertificateSettings::default();
        assert_eq!(settings.threshold, 100);
        assert_eq!(settings.code_prefix, "IFRI");
    }
}
