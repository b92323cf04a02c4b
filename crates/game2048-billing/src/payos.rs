//! PayOS payment requests and webhook verification

use crate::config::PayOsConfig;
use crate::error::{BillingError, Result};
use crate::gateway::{
    sign_hex, signature_matches, PaymentGateway, PaymentLink, PaymentOutcome, PaymentRequest,
};
use crate::plan::PaymentMethod;
use hmac::Hmac;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_KEY: &str = "signature";

/// Compact JSON with non-ASCII escaped as `\uXXXX`
fn ascii_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

/// Sort object keys at every depth
fn sort_recursive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sort_recursive(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect::<Map<_, _>>())
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_recursive).collect()),
        other => other.clone(),
    }
}

fn webhook_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::String(s) if s == "null" || s == "NULL" => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => ascii_json(value),
    }
}

/// `k=v&k=v` over the recursively sorted webhook `data` object
pub fn webhook_canonical(data: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, Value> =
        data.iter().map(|(k, v)| (k, sort_recursive(v))).collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, webhook_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `k=v&k=v` over sorted request fields, without URL encoding
pub fn request_canonical(fields: &BTreeMap<&str, String>) -> String {
    fields
        .iter()
        .filter(|(k, _)| **k != SIGNATURE_KEY)
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub struct PayOs {
    config: PayOsConfig,
}

impl PayOs {
    pub fn new(config: PayOsConfig) -> Self {
        Self { config }
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-client-id".to_string(), self.config.client_id.clone()),
            ("x-api-key".to_string(), self.config.api_key.clone()),
        ]
    }

    /// Prepared `GET` for the payment status of an order
    pub fn payment_info_request(&self, order_code: u64) -> PaymentLink {
        PaymentLink {
            method: "GET".to_string(),
            url: format!("{}/{}", self.config.api_url, order_code),
            headers: self.auth_headers(),
            body: None,
        }
    }

    /// Prepared `POST` that cancels an open payment link
    pub fn cancel_request(&self, order_code: u64, reason: Option<&str>) -> PaymentLink {
        let body = match reason {
            Some(reason) => json!({ "cancellationReason": reason }),
            None => json!({}),
        };
        let mut headers = self.auth_headers();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        PaymentLink {
            method: "POST".to_string(),
            url: format!("{}/{}/cancel", self.config.api_url, order_code),
            headers,
            body: Some(body),
        }
    }
}

impl PaymentGateway for PayOs {
    /// The webhook JSON body: `{ code, desc, data: {..}, signature }`
    type Callback = Value;

    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayOs
    }

    fn create_payment_link(&self, request: &PaymentRequest) -> Result<PaymentLink> {
        let mut fields: BTreeMap<&str, String> = BTreeMap::new();
        fields.insert("orderCode", request.order_id.to_string());
        fields.insert("amount", request.amount.to_string());
        fields.insert("description", request.description.clone());
        fields.insert("returnUrl", self.config.return_url.clone());
        fields.insert("cancelUrl", self.config.cancel_url.clone());
        let signature =
            sign_hex::<HmacSha256>(&self.config.checksum_key, &request_canonical(&fields))?;

        let body = json!({
            "orderCode": request.order_id,
            "amount": request.amount,
            "description": request.description,
            "returnUrl": self.config.return_url,
            "cancelUrl": self.config.cancel_url,
            "signature": signature,
        });
        let mut headers = self.auth_headers();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));

        log::debug!("payos request for order {} ({} VND)", request.order_id, request.amount);
        Ok(PaymentLink {
            method: "POST".to_string(),
            url: self.config.api_url.clone(),
            headers,
            body: Some(body),
        })
    }

    fn verify_signature(&self, callback: &Value) -> bool {
        let received = callback
            .get(SIGNATURE_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = match callback.get("data").and_then(Value::as_object) {
            Some(data) if !data.is_empty() => data,
            _ => return false,
        };
        if received.is_empty() {
            return false;
        }
        let ok = signature_matches::<HmacSha256>(
            &self.config.checksum_key,
            &webhook_canonical(data),
            received,
        );
        if !ok {
            log::warn!("payos webhook signature mismatch for order {:?}", data.get("orderCode"));
        }
        ok
    }

    fn parse_callback(&self, callback: &Value) -> Result<PaymentOutcome> {
        let data = callback
            .get("data")
            .and_then(Value::as_object)
            .ok_or(BillingError::MissingField("data"))?;
        let number = |name: &'static str| -> Result<u64> {
            let value = data.get(name).ok_or(BillingError::MissingField(name))?;
            value.as_u64().ok_or_else(|| BillingError::MalformedField {
                field: name,
                value: value.to_string(),
            })
        };
        let code = callback
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(PaymentOutcome {
            order_id: number("orderCode")?,
            amount: number("amount")?,
            transaction_no: data
                .get("reference")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            success: code == "00",
            response_code: code,
        })
    }
}
