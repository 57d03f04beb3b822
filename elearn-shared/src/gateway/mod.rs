/// Payment gateway contract and FedaPay integration
///
/// The reconciliation service only talks to the `PaymentGateway` trait. The
/// production implementation is [`fedapay::FedaPayClient`]; tests use
/// [`mock::MockGateway`].
///
/// # Gateway statuses
///
/// ```text
/// approved | transferred                     -> paid
/// declined | canceled | refunded | expired   -> failed
/// pending | anything else                    -> no change
/// ```
///
/// # Example
///
/// ```no_run
/// use elearn_shared::gateway::{CheckoutRequest, Customer, PaymentGateway};
/// use elearn_shared::gateway::fedapay::FedaPayClient;
/// use elearn_shared::settings::{GatewayEnvironment, PaymentSettings};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = PaymentSettings::new("sk", "whsec", GatewayEnvironment::Sandbox, "learn.example.org");
/// let client = FedaPayClient::new(&settings)?;
///
/// let checkout = client
///     .create_checkout(&CheckoutRequest {
///         description: "Rust for beginners".to_string(),
///         amount: 100,
///         currency: "XOF".to_string(),
///         callback_url: settings.callback_url(),
///         customer: Customer {
///             first_name: "Ada".to_string(),
///             last_name: "Lovelace".to_string(),
///             email: "ada@example.org".to_string(),
///             phone: None,
///         },
///     })
///     .await?;
///
/// println!("redirect to {}", checkout.payment_url);
/// # Ok(())
/// # }
/// ```

pub mod event;
pub mod fedapay;
pub mod mock;
pub mod signature;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::payment::PaymentStatus;

pub use event::WebhookEvent;

/// Path the gateway redirects the student to after checkout
pub const CALLBACK_PATH: &str = "/student/payment/callback/";

/// Path the gateway posts signed webhook events to
pub const WEBHOOK_PATH: &str = "/student/payment/webhook/";

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-fedapay-signature";

/// Gateway error types
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway did not answer in time
    #[error("Gateway request timed out")]
    Timeout,

    /// Connection or TLS failure
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("Gateway returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The gateway answered with a body we cannot interpret
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    /// The gateway has no such transaction
    #[error("Transaction {0} not found at gateway")]
    NotFound(String),

    /// Client could not be built from the settings
    #[error("Invalid gateway configuration: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Transport(_) => true,
            GatewayError::Upstream { status, .. } => *status >= 500 || *status == 429,
            GatewayError::InvalidResponse(_)
            | GatewayError::NotFound(_)
            | GatewayError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Transaction status as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Pending,
    Approved,
    Transferred,
    Declined,
    Canceled,
    Refunded,
    Expired,
    /// Any status this platform does not act on
    #[serde(untagged)]
    Other(String),
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => GatewayStatus::Pending,
            "approved" => GatewayStatus::Approved,
            "transferred" => GatewayStatus::Transferred,
            "declined" => GatewayStatus::Declined,
            "canceled" | "cancelled" => GatewayStatus::Canceled,
            "refunded" => GatewayStatus::Refunded,
            "expired" => GatewayStatus::Expired,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    /// Local payment status this gateway status settles to, if any
    pub fn settlement(&self) -> Option<PaymentStatus> {
        match self {
            GatewayStatus::Approved | GatewayStatus::Transferred => Some(PaymentStatus::Paid),
            GatewayStatus::Declined
            | GatewayStatus::Canceled
            | GatewayStatus::Refunded
            | GatewayStatus::Expired => Some(PaymentStatus::Failed),
            GatewayStatus::Pending | GatewayStatus::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Pending => "pending",
            GatewayStatus::Approved => "approved",
            GatewayStatus::Transferred => "transferred",
            GatewayStatus::Declined => "declined",
            GatewayStatus::Canceled => "canceled",
            GatewayStatus::Refunded => "refunded",
            GatewayStatus::Expired => "expired",
            GatewayStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payer details sent with a new transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Request to open a hosted checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub description: String,

    /// Amount in whole currency units (XOF has no minor unit)
    pub amount: i64,

    pub currency: String,

    /// Where the gateway redirects the payer afterwards
    pub callback_url: String,

    pub customer: Customer,
}

/// An opened checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    /// Gateway transaction id
    pub transaction_id: String,

    /// Hosted payment page the student is redirected to
    pub payment_url: String,

    pub status: GatewayStatus,
}

/// A transaction as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: String,
    pub status: GatewayStatus,

    pub amount: ReportedAmount,
}

/// Amount field of a gateway report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReportedAmount {
    /// The gateway omitted the amount
    Missing,

    /// Whole currency units
    Whole(i64),

    /// Present but not a whole number of units; never matches a payment
    Invalid,
}

impl ReportedAmount {
    /// Whether the report contradicts an expected amount
    ///
    /// A missing amount is not a contradiction; an unreadable one is.
    pub fn contradicts(&self, expected: i64) -> bool {
        match self {
            ReportedAmount::Missing => false,
            ReportedAmount::Whole(amount) => *amount != expected,
            ReportedAmount::Invalid => true,
        }
    }
}

impl From<Option<i64>> for ReportedAmount {
    fn from(amount: Option<i64>) -> Self {
        amount.map_or(ReportedAmount::Missing, ReportedAmount::Whole)
    }
}

/// Payment gateway contract
///
/// Implementations must be cheap to share across requests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Creates a transaction and returns its hosted payment link
    async fn create_checkout(&self, request: &CheckoutRequest) -> GatewayResult<Checkout>;

    /// Fetches the authoritative state of a transaction
    async fn fetch_transaction(&self, transaction_id: &str) -> GatewayResult<GatewayTransaction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_settlement_mapping() {
        assert_eq!(GatewayStatus::parse("approved").settlement(), Some(PaymentStatus::Paid));
        assert_eq!(GatewayStatus::parse("transferred").settlement(), Some(PaymentStatus::Paid));
        for failed in ["declined", "canceled", "cancelled", "refunded", "expired"] {
            assert_eq!(
                GatewayStatus::parse(failed).settlement(),
                Some(PaymentStatus::Failed),
                "{} should fail the payment",
                failed
            );
        }
        assert_eq!(GatewayStatus::parse("pending").settlement(), None);
        assert_eq!(GatewayStatus::parse("on_hold").settlement(), None);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(GatewayStatus::parse(" Approved "), GatewayStatus::Approved);
        assert_eq!(
            GatewayStatus::parse("mystery"),
            GatewayStatus::Other("mystery".to_string())
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Transport("reset".into()).is_retryable());
        assert!(GatewayError::Upstream { status: 502, message: String::new() }.is_retryable());
        assert!(!GatewayError::Upstream { status: 401, message: String::new() }.is_retryable());
        assert!(!GatewayError::NotFound("1".into()).is_retryable());
    }
}
