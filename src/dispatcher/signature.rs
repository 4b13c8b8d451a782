use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::types::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid,
}

impl SignatureCheck {
    pub fn is_valid(self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }
}

/// Verifies an HMAC-SHA256 signature over `payload`.
///
/// The header may be `sha256=<hex>`, bare hex, or standard base64. Missing or
/// undecodable headers are `Invalid`. The digest comparison is constant-time.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: Option<&str>) -> SignatureCheck {
    let Some(provided) = header.and_then(decode_digest) else {
        return SignatureCheck::Invalid;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return SignatureCheck::Invalid;
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if constant_time_eq(&expected, &provided) {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

/// Produces the `sha256=<hex>` header value a sender would attach.
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    let digest = match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    };
    format!("sha256={}", hex::encode(digest))
}

/// A delivery whose signature checked out. Only [`verify_event`] constructs one.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedEvent<'a> {
    event: &'a WebhookEvent,
}

impl std::ops::Deref for VerifiedEvent<'_> {
    type Target = WebhookEvent;

    fn deref(&self) -> &Self::Target {
        self.event
    }
}

pub fn verify_event<'a>(secret: &[u8], event: &'a WebhookEvent) -> Option<VerifiedEvent<'a>> {
    verify_signature(secret, &event.payload, event.signature.as_deref())
        .is_valid()
        .then_some(VerifiedEvent { event })
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

fn decode_digest(header: &str) -> Option<Vec<u8>> {
    let value = header.trim();
    let value = value.strip_prefix("sha256=").unwrap_or(value);

    if value.len() == 64
        && let Ok(bytes) = hex::decode(value)
    {
        return Some(bytes);
    }

    STANDARD
        .decode(value)
        .ok()
        .filter(|bytes| bytes.len() == 32)
}
