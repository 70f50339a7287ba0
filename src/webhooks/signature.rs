//! Webhook signature verification (HMAC-SHA256).
//!
//! Deliveries are signed with a shared secret; the signature arrives in the
//! `X-Hub-Signature-256` header as `sha256=<hex>`. The HTTP intake rejects a
//! delivery whose signature does not verify before parsing it.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER_PREFIX: &str = "sha256=";

/// Shared secret used to sign and verify deliveries.
///
/// An empty secret disables verification: every delivery is accepted.
#[derive(Clone, Default)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        WebhookSecret(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks an `X-Hub-Signature-256` header value against `payload`.
    ///
    /// A missing header verifies only when the secret is empty.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        header.is_some_and(|h| verify_signature(payload, h, &self.0))
    }

    /// The header value a sender with this secret would attach.
    pub fn sign(&self, payload: &[u8]) -> String {
        format_signature_header(&compute_signature(payload, &self.0))
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

/// Decodes `sha256=<hex>` into raw bytes. `None` for any other shape.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix(HEADER_PREFIX)?).ok()
}

pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{HEADER_PREFIX}{}", hex::encode(signature))
}

/// Verifies `signature_header` for `payload` in constant time.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
