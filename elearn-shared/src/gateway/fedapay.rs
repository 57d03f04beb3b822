/// FedaPay REST client
///
/// Thin `reqwest` wrapper over the three endpoints the platform needs:
///
/// - `POST /v1/transactions` creates a transaction for a course price
/// - `POST /v1/transactions/{id}/token` returns the hosted checkout link
/// - `GET /v1/transactions/{id}` fetches the authoritative status
///
/// Requests carry the secret API key as a bearer token and time out after
/// `PaymentSettings::timeout_secs`. Transport errors, timeouts and 5xx
/// answers surface as retryable `GatewayError`s.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::event::{json_amount, json_id};
use super::{
    Checkout, CheckoutRequest, GatewayError, GatewayResult, GatewayStatus, GatewayTransaction,
    PaymentGateway,
};
use crate::settings::PaymentSettings;

/// FedaPay client
#[derive(Debug, Clone)]
pub struct FedaPayClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FedaPayClient {
    /// Builds a client from payment settings
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the API key is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(settings: &PaymentSettings) -> GatewayResult<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(GatewayError::Configuration("FedaPay API key is empty".into()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(concat!("elearn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and decodes the JSON body, mapping error statuses
    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> GatewayResult<Value> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

            warn!(status = status.as_u16(), what, message = %message, "FedaPay request failed");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }

    async fn create_transaction(&self, request: &CheckoutRequest) -> GatewayResult<GatewayTransaction> {
        let mut customer = json!({
            "firstname": request.customer.first_name,
            "lastname": request.customer.last_name,
            "email": request.customer.email,
        });
        if let Some(phone) = request.customer.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            customer["phone_number"] = json!({ "number": phone, "country": "bj" });
        }

        let body = json!({
            "description": request.description,
            "amount": request.amount,
            "currency": { "iso": request.currency },
            "callback_url": request.callback_url,
            "customer": customer,
        });

        let value = self
            .send(self.http.post(self.url("/v1/transactions")).json(&body), "create transaction")
            .await?;

        parse_transaction(&value)
    }

    async fn create_token(&self, transaction_id: &str) -> GatewayResult<String> {
        let path = format!("/v1/transactions/{}/token", transaction_id);
        let value = self.send(self.http.post(self.url(&path)), transaction_id).await?;

        value
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::InvalidResponse("token response has no url".into()))
    }
}

#[async_trait]
impl PaymentGateway for FedaPayClient {
    fn name(&self) -> &'static str {
        "fedapay"
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> GatewayResult<Checkout> {
        let transaction = self.create_transaction(request).await?;
        debug!(transaction_id = %transaction.id, "FedaPay transaction created");

        let payment_url = self.create_token(&transaction.id).await?;

        Ok(Checkout {
            transaction_id: transaction.id,
            payment_url,
            status: transaction.status,
        })
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> GatewayResult<GatewayTransaction> {
        let path = format!("/v1/transactions/{}", transaction_id);
        let value = self.send(self.http.get(self.url(&path)), transaction_id).await?;
        parse_transaction(&value)
    }
}

/// Reads a transaction from `{"v1/transaction": {...}}` or a bare object
fn parse_transaction(value: &Value) -> GatewayResult<GatewayTransaction> {
    let entity = value
        .get("v1/transaction")
        .or_else(|| value.get("transaction"))
        .unwrap_or(value);

    let id = entity
        .get("id")
        .and_then(json_id)
        .ok_or_else(|| GatewayError::InvalidResponse("transaction has no id".into()))?;

    let status = entity
        .get("status")
        .and_then(Value::as_str)
        .map(GatewayStatus::parse)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("transaction {} has no status", id)))?;

    let amount = json_amount(entity.get("amount"));

    Ok(GatewayTransaction { id, status, amount })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ReportedAmount;
    use crate::settings::GatewayEnvironment;

    #[test]
    fn test_parse_wrapped_transaction() {
        let value = json!({"v1/transaction": {"id": 42, "status": "approved", "amount": 100}});
        let tx = parse_transaction(&value).unwrap();
        assert_eq!(tx.id, "42");
        assert_eq!(tx.status, GatewayStatus::Approved);
        assert_eq!(tx.amount, ReportedAmount::Whole(100));
    }

    #[test]
    fn test_parse_bare_transaction() {
        let value = json!({"id": "abc", "status": "pending"});
        let tx = parse_transaction(&value).unwrap();
        assert_eq!(tx.id, "abc");
        assert_eq!(tx.amount, ReportedAmount::Missing);
    }

    #[test]
    fn test_parse_transaction_requires_id_and_status() {
        assert!(parse_transaction(&json!({"status": "approved"})).is_err());
        assert!(parse_transaction(&json!({"id": 1})).is_err());
    }

    #[test]
    fn test_client_rejects_empty_key() {
        let settings = PaymentSettings::new(" ", "s", GatewayEnvironment::Sandbox, "h");
        assert!(matches!(
            FedaPayClient::new(&settings),
            Err(GatewayError::Configuration(_))
        ));
    }
}
