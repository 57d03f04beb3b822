/// Webhook signature verification
///
/// FedaPay signs every webhook with HMAC-SHA256 and sends the result in the
/// `x-fedapay-signature` header:
///
/// ```text
/// x-fedapay-signature: t=1717171717,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
/// ```
///
/// The signed message is `"{t}.{raw body}"` keyed with the webhook secret.
/// Header parsing is tolerant: `;` separators, quoted values, a `v0` key,
/// an unknown key, or a bare 64 character hex digest are all accepted.
/// Digests are compared case-insensitively in constant time.
///
/// # Example
///
/// ```
/// use elearn_shared::gateway::signature::{compute_signature, verify_signature};
///
/// let body = br#"{"name":"transaction.approved"}"#;
/// let digest = compute_signature(body, "1717171717", "whsec_test");
/// let header = format!("t=1717171717,v1={}", digest);
///
/// assert!(verify_signature(body, &header, "whsec_test", None, 1717171717).is_ok());
/// assert!(verify_signature(body, &header, "other_secret", None, 1717171717).is_err());
/// ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature verification failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Webhook secret is not configured")]
    MissingSecret,

    #[error("Missing signature header")]
    MissingHeader,

    #[error("Signature header has no digest")]
    Malformed,

    #[error("Signature header has no valid timestamp")]
    InvalidTimestamp,

    #[error("Signature timestamp is outside the accepted window")]
    Expired,

    #[error("Signature does not match payload")]
    Mismatch,
}

/// Timestamp and digest extracted from a signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub timestamp: Option<String>,
    pub digest: String,
}

/// Parses an `x-fedapay-signature` header value
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, SignatureError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(SignatureError::MissingHeader);
    }

    let mut timestamp = None;
    let mut v1 = None;
    let mut v0 = None;
    let mut fallback = None;

    for part in header.split([',', ';']) {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "t" => timestamp = Some(value),
            "v1" => v1 = Some(value),
            "v0" => v0 = Some(value),
            "" => {}
            _ => {
                if fallback.is_none() {
                    fallback = Some(value);
                }
            }
        }
    }

    let digest = v1
        .or(v0)
        .or(fallback)
        .or_else(|| find_bare_digest(header))
        .ok_or(SignatureError::Malformed)?;

    Ok(ParsedSignature { timestamp, digest })
}

/// First run of exactly 64 hex characters
fn find_bare_digest(header: &str) -> Option<String> {
    header
        .split(|c: char| !c.is_ascii_hexdigit())
        .find(|run| run.len() == 64)
        .map(str::to_string)
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`
pub fn compute_signature(payload: &[u8], timestamp: &str, secret: &str) -> String {
    // new_from_slice accepts keys of any length for HMAC
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a webhook payload against its signature header
///
/// `tolerance_secs` bounds the age of the signature relative to `now`
/// (unix seconds); `None` skips the freshness check.
///
/// # Errors
///
/// Any failure maps to a `SignatureError`; callers must discard the payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: Option<i64>,
    now: i64,
) -> Result<(), SignatureError> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    let parsed = parse_signature_header(header)?;

    let timestamp = parsed
        .timestamp
        .as_deref()
        .ok_or(SignatureError::InvalidTimestamp)?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;

    if let Some(tolerance) = tolerance_secs {
        if (now - ts).abs() > tolerance {
            return Err(SignatureError::Expired);
        }
    }

    let expected = compute_signature(payload, timestamp, secret);
    if constant_time_eq(expected.as_bytes(), parsed.digest.to_ascii_lowercase().as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Constant-time byte comparison
///
/// Length is not secret here (digests are fixed-size hex).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Shortens a header or digest for logs: `abcdefgh...stuvwxyz`
pub fn mask(value: &str) -> String {
    if value.len() <= 16 || !value.is_ascii() {
        return "***".to_string();
    }
    format!("{}...{}", &value[..8], &value[value.len() - 8..])
}
