//! The payment gateway capability shared by every vendor.
//!
//! Each vendor owns its own signature canonicalization. VNPay signs a sorted,
//! form-encoded query string with HMAC-SHA512; PayOS signs sorted raw
//! `key=value` pairs (and recursively sorted webhook JSON) with HMAC-SHA256.

use crate::error::{BillingError, Result};
use crate::plan::PaymentMethod;
use hmac::digest::KeyInit;
use hmac::Mac;
use serde::{Deserialize, Serialize};

/// What the caller wants to charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: u64,
    /// Whole VND
    pub amount: u64,
    pub description: String,
    /// Client address, required by VNPay
    pub ip_addr: String,
    /// Unix seconds
    pub created_at: u64,
}

/// A prepared request the caller sends (or redirects the user to)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// A verified callback reduced to what the ledger needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub order_id: u64,
    /// Whole VND
    pub amount: u64,
    pub transaction_no: String,
    pub response_code: String,
    pub success: bool,
}

pub trait PaymentGateway: Send + Sync {
    /// Raw callback payload as the vendor delivers it
    type Callback;

    fn method(&self) -> PaymentMethod;

    fn create_payment_link(&self, request: &PaymentRequest) -> Result<PaymentLink>;

    fn verify_signature(&self, callback: &Self::Callback) -> bool;

    fn parse_callback(&self, callback: &Self::Callback) -> Result<PaymentOutcome>;
}

/// Hex HMAC of `data` under `key`
pub(crate) fn sign_hex<M: Mac + KeyInit>(key: &str, data: &str) -> Result<String> {
    let mut mac =
        <M as KeyInit>::new_from_slice(key.as_bytes()).map_err(|_| BillingError::InvalidKey)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex signature against the HMAC of `data` in constant time
pub(crate) fn signature_matches<M: Mac + KeyInit>(key: &str, data: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    match <M as KeyInit>::new_from_slice(key.as_bytes()) {
        Ok(mut mac) => {
            mac.update(data.as_bytes());
            mac.verify_slice(&expected).is_ok()
        }
        Err(_) => false,
    }
}
