/// Webhook event payloads
///
/// FedaPay posts events shaped like:
///
/// ```json
/// {
///   "name": "transaction.approved",
///   "entity": { "id": 104728, "status": "approved", "amount": 100 }
/// }
/// ```
///
/// Ids arrive as numbers or strings depending on the API version, so the
/// payload is read through `serde_json::Value` rather than a strict struct.

use serde_json::Value;

use super::{GatewayError, GatewayStatus, GatewayTransaction, ReportedAmount};

/// A decoded webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Event name, e.g. `transaction.approved`
    pub name: Option<String>,

    /// Transaction carried by the event; `None` when the entity has no id
    pub transaction: Option<GatewayTransaction>,
}

impl WebhookEvent {
    /// Decodes a raw webhook body
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidResponse` when the body is not a JSON object.
    pub fn parse(payload: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::InvalidResponse(format!("webhook body is not JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| GatewayError::InvalidResponse("webhook body is not an object".into()))?;

        let name = object.get("name").and_then(Value::as_str).map(str::to_string);

        let entity = object
            .get("entity")
            .or_else(|| object.get("transaction"))
            .or_else(|| object.get("data"));

        let transaction = entity.and_then(|entity| {
            let id = json_id(entity.get("id")?)?;

            let status = entity
                .get("status")
                .and_then(Value::as_str)
                .map(GatewayStatus::parse)
                .or_else(|| name.as_deref().and_then(status_from_event_name))
                .unwrap_or(GatewayStatus::Pending);

            let amount = json_amount(entity.get("amount"));

            Some(GatewayTransaction { id, status, amount })
        });

        Ok(WebhookEvent { name, transaction })
    }
}

/// Reads an identifier that may be a JSON string or number
pub(crate) fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a whole-unit amount that may be a number, a float or a numeric string
///
/// `2500.0` is read as 2500; `2500.4` is `Invalid` rather than rounded.
pub(crate) fn json_amount(value: Option<&Value>) -> ReportedAmount {
    let whole = match value {
        None | Some(Value::Null) => return ReportedAmount::Missing,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(whole_units)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_units))
        }
        Some(_) => None,
    };

    whole.map_or(ReportedAmount::Invalid, ReportedAmount::Whole)
}

fn whole_units(value: f64) -> Option<i64> {
    // Beyond 2^53 an f64 no longer holds every integer
    let exact = value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15;
    exact.then(|| value as i64)
}

/// `transaction.approved` -> `approved`
fn status_from_event_name(name: &str) -> Option<GatewayStatus> {
    let (_, suffix) = name.rsplit_once('.')?;
    Some(GatewayStatus::parse(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_id() {
        let body = br#"{"name":"transaction.approved","entity":{"id":104728,"status":"approved","amount":100}}"#;
        let event = WebhookEvent::parse(body).unwrap();

        assert_eq!(event.name.as_deref(), Some("transaction.approved"));
        let tx = event.transaction.unwrap();
        assert_eq!(tx.id, "104728");
        assert_eq!(tx.status, GatewayStatus::Approved);
        assert_eq!(tx.amount, ReportedAmount::Whole(100));
    }

    #[test]
    fn test_parse_string_amount_and_missing_status() {
        let body = br#"{"name":"transaction.declined","entity":{"id":"tx_9","amount":"2500.0"}}"#;
        let tx = WebhookEvent::parse(body).unwrap().transaction.unwrap();

        assert_eq!(tx.id, "tx_9");
        assert_eq!(tx.status, GatewayStatus::Declined);
        assert_eq!(tx.amount, ReportedAmount::Whole(2500));
    }

    #[test]
    fn test_fractional_amount_is_not_rounded() {
        assert_eq!(json_amount(Some(&serde_json::json!(100.4))), ReportedAmount::Invalid);
        assert_eq!(json_amount(Some(&serde_json::json!("99.6"))), ReportedAmount::Invalid);
        assert_eq!(json_amount(Some(&serde_json::json!("cent"))), ReportedAmount::Invalid);
        assert_eq!(json_amount(Some(&serde_json::json!(100.0))), ReportedAmount::Whole(100));
        assert_eq!(json_amount(Some(&Value::Null)), ReportedAmount::Missing);
        assert_eq!(json_amount(None), ReportedAmount::Missing);

        let body = br#"{"name":"transaction.approved","entity":{"id":5,"amount":100.4}}"#;
        let tx = WebhookEvent::parse(body).unwrap().transaction.unwrap();
        assert!(tx.amount.contradicts(100));
    }

    #[test]
    fn test_event_without_id_has_no_transaction() {
        let body = br#"{"name":"transaction.created","entity":{"status":"pending"}}"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert!(event.transaction.is_none());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(WebhookEvent::parse(b"not json").is_err());
        assert!(WebhookEvent::parse(b"[1,2]").is_err());
    }
}
