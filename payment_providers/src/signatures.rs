//! HMAC-SHA256 signatures as used by the payment providers.
//!
//! Signatures arrive hex-encoded. They are decoded and checked with [`Mac::verify_slice`], which compares in constant
//! time.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No signing secret has been configured")]
    NoSecret,
    #[error("The signature header is malformed. {0}")]
    MalformedHeader(String),
    #[error("The signature is not valid hex")]
    InvalidHex,
    #[error("The signed timestamp {timestamp} is outside the {tolerance}s tolerance")]
    Expired { timestamp: i64, tolerance: i64 },
    #[error("The signature does not match")]
    Mismatch,
}

fn mac(secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NoSecret);
    }
    HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::NoSecret)
}

/// hex(HMAC-SHA256(secret, message))
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String, SignatureError> {
    let mut mac = mac(secret)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex-encoded HMAC-SHA256 signature of `message`.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature: &str) -> Result<(), SignatureError> {
    let signature = hex::decode(signature.trim()).map_err(|_| SignatureError::InvalidHex)?;
    let mut mac = mac(secret)?;
    mac.update(message);
    mac.verify_slice(&signature).map_err(|_| SignatureError::Mismatch)
}

/// The message Razorpay's checkout signs when a payment completes.
pub fn razorpay_checkout_payload(provider_order_id: &str, payment_id: &str) -> String {
    format!("{provider_order_id}|{payment_id}")
}

/// A parsed `Stripe-Signature` header: `t=<unix time>,v1=<hex>[,v1=<hex>...]`. Stripe sends several `v1` entries
/// while a webhook secret is being rolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl StripeSignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader(format!("Invalid timestamp: {value}")))?;
                    timestamp = Some(t);
                },
                "v1" => signatures.push(value.to_string()),
                _ => trace!("Ignoring signature scheme {key}"),
            }
        }
        let timestamp = timestamp.ok_or_else(|| SignatureError::MalformedHeader("No timestamp".into()))?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader("No v1 signature".into()));
        }
        Ok(Self { timestamp, signatures })
    }
}

/// Verifies a Stripe webhook. `now` is the current unix time; the signed timestamp must be within `tolerance` seconds
/// of it, in either direction.
pub fn verify_stripe_signature(
    secret: &[u8],
    body: &[u8],
    header: &str,
    tolerance: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let header = StripeSignatureHeader::parse(header)?;
    let mut signed = format!("{}.", header.timestamp).into_bytes();
    signed.extend_from_slice(body);
    let matched = header.signatures.iter().any(|sig| verify_hmac_sha256_hex(secret, &signed, sig).is_ok());
    if !matched {
        return Err(SignatureError::Mismatch);
    }
    if (now - header.timestamp).abs() > tolerance {
        return Err(SignatureError::Expired { timestamp: header.timestamp, tolerance });
    }
    Ok(())
}
