//! VNPay redirect payments (API version 2.1.0)

use crate::clock::vnpay_timestamp;
use crate::config::VnPayConfig;
use crate::error::{BillingError, Result};
use crate::gateway::{
    sign_hex, signature_matches, PaymentGateway, PaymentLink, PaymentOutcome, PaymentRequest,
};
use crate::plan::PaymentMethod;
use hmac::Hmac;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::collections::BTreeMap;

type HmacSha512 = Hmac<Sha512>;

pub const VERSION: &str = "2.1.0";
pub const SECURE_HASH_KEY: &str = "vnp_SecureHash";

/// Payment window from link creation
pub const EXPIRY_SECS: u64 = 15 * 60;

/// Form encoding with space as `+`; only `A-Za-z0-9_.-~` pass through
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, QUERY_VALUE)
        .to_string()
        .replace("%20", "+")
}

/// `k=v&k=v` in key order, form encoded
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query parameters delivered to the return and IPN URLs
pub type VnPayParams = BTreeMap<String, String>;

pub struct VnPay {
    config: VnPayConfig,
    locale: String,
    order_type: String,
    bank_code: Option<String>,
}

impl VnPay {
    pub fn new(config: VnPayConfig) -> Self {
        Self {
            config,
            locale: "vn".to_string(),
            order_type: "other".to_string(),
            bank_code: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Preselect a bank on the VNPay page
    pub fn with_bank_code(mut self, bank_code: impl Into<String>) -> Self {
        self.bank_code = Some(bank_code.into());
        self
    }

    /// The unsigned parameter set for a payment
    pub fn payment_params(&self, request: &PaymentRequest) -> VnPayParams {
        let mut params = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            params.insert(k.to_string(), v);
        };
        put("vnp_Version", VERSION.to_string());
        put("vnp_Command", "pay".to_string());
        put("vnp_TmnCode", self.config.tmn_code.clone());
        put("vnp_Amount", (request.amount * 100).to_string());
        put("vnp_CreateDate", vnpay_timestamp(request.created_at));
        put("vnp_CurrCode", "VND".to_string());
        put("vnp_IpAddr", request.ip_addr.clone());
        put("vnp_Locale", self.locale.clone());
        put("vnp_OrderInfo", request.description.clone());
        put("vnp_OrderType", self.order_type.clone());
        put("vnp_ReturnUrl", self.config.return_url.clone());
        put("vnp_TxnRef", request.order_id.to_string());
        put("vnp_ExpireDate", vnpay_timestamp(request.created_at + EXPIRY_SECS));
        if let Some(bank) = &self.bank_code {
            put("vnp_BankCode", bank.clone());
        }
        params
    }

    fn sign(&self, query: &str) -> Result<String> {
        sign_hex::<HmacSha512>(&self.config.hash_secret, query)
    }
}

impl PaymentGateway for VnPay {
    type Callback = VnPayParams;

    fn method(&self) -> PaymentMethod {
        PaymentMethod::VnPay
    }

    fn create_payment_link(&self, request: &PaymentRequest) -> Result<PaymentLink> {
        let query = canonical_query(&self.payment_params(request));
        let hash = self.sign(&query)?;
        log::debug!("vnpay link for order {} ({} VND)", request.order_id, request.amount);
        Ok(PaymentLink {
            method: "GET".to_string(),
            url: format!("{}?{}&{}={}", self.config.url, query, SECURE_HASH_KEY, hash),
            headers: Vec::new(),
            body: None,
        })
    }

    fn verify_signature(&self, callback: &VnPayParams) -> bool {
        let Some(received) = callback.get(SECURE_HASH_KEY) else {
            return false;
        };
        let unsigned: VnPayParams = callback
            .iter()
            .filter(|(k, _)| k.as_str() != SECURE_HASH_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let ok = signature_matches::<HmacSha512>(
            &self.config.hash_secret,
            &canonical_query(&unsigned),
            received,
        );
        if !ok {
            log::warn!("vnpay signature mismatch for txn {:?}", callback.get("vnp_TxnRef"));
        }
        ok
    }

    fn parse_callback(&self, callback: &VnPayParams) -> Result<PaymentOutcome> {
        let field = |name: &'static str| callback.get(name).ok_or(BillingError::MissingField(name));
        let number = |name: &'static str| -> Result<u64> {
            let raw = field(name)?;
            raw.parse().map_err(|_| BillingError::MalformedField {
                field: name,
                value: raw.clone(),
            })
        };

        let response_code = field("vnp_ResponseCode")?.clone();
        let status = callback
            .get("vnp_TransactionStatus")
            .map(String::as_str)
            .unwrap_or_default();
        Ok(PaymentOutcome {
            order_id: number("vnp_TxnRef")?,
            amount: number("vnp_Amount")? / 100,
            transaction_no: callback
                .get("vnp_TransactionNo")
                .cloned()
                .unwrap_or_default(),
            success: response_code == "00" && status == "00",
            response_code,
        })
    }
}

/// Human readable text for a VNPay response code
pub fn response_message(code: &str) -> String {
    let text = match code {
        "00" => "Transaction successful",
        "07" => "Transaction flagged as suspected fraud",
        "09" => "Card or account is not registered for internet banking",
        "10" => "Card or account verification failed more than 3 times",
        "11" => "Payment window expired",
        "12" => "Card or account is locked",
        "13" => "Wrong OTP",
        "24" => "Customer cancelled the transaction",
        "51" => "Insufficient balance",
        "65" => "Daily transaction limit exceeded",
        "75" => "Bank is under maintenance",
        "79" => "Wrong payment password too many times",
        "99" => "Other error",
        other => return format!("Error code: {}", other),
    };
    text.to_string()
}

/// Acknowledgement body VNPay expects from the IPN endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpnReply {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnReply {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> VnPay {
        VnPay::new(VnPayConfig {
            tmn_code: "TESTCODE".into(),
            hash_secret: "SECRETKEY".into(),
            url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:5000/vnpay_return".into(),
        })
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: 42,
            amount: 9_000,
            description: "Premium plan: Premium 1 month".into(),
            ip_addr: "127.0.0.1".into(),
            created_at: 1_704_052_800,
        }
    }

    fn query_pairs(url: &str) -> VnPayParams {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| {
                let v = v.replace('+', " ");
                let decoded = percent_encoding::percent_decode_str(&v).decode_utf8_lossy();
                (k.to_string(), decoded.into_owned())
            })
            .collect()
    }

    #[test]
    fn test_form_encoding_matches_quote_plus() {
        assert_eq!(encode_component("a b"), "a+b");
        assert_eq!(encode_component("Premium: 1/month"), "Premium%3A+1%2Fmonth");
        assert_eq!(encode_component("a_b.c-d~e"), "a_b.c-d~e");
        assert_eq!(encode_component("x+y*z"), "x%2By%2Az");
        assert_eq!(
            encode_component("http://localhost:5000/vnpay_return"),
            "http%3A%2F%2Flocalhost%3A5000%2Fvnpay_return"
        );
    }

    #[test]
    fn test_payment_params() {
        let params = gateway().payment_params(&request());
        assert_eq!(params["vnp_Amount"], "900000");
        assert_eq!(params["vnp_Version"], "2.1.0");
        assert_eq!(params["vnp_CreateDate"], "20240101030000");
        assert_eq!(params["vnp_ExpireDate"], "20240101031500");
        assert_eq!(params["vnp_TxnRef"], "42");
        assert!(!params.contains_key("vnp_BankCode"));

        let with_bank = gateway().with_bank_code("NCB").payment_params(&request());
        assert_eq!(with_bank["vnp_BankCode"], "NCB");
    }

    #[test]
    fn test_link_is_sorted_and_signed() {
        let gw = gateway();
        let link = gw.create_payment_link(&request()).unwrap();
        assert_eq!(link.method, "GET");

        let query = link.url.split_once('?').unwrap().1;
        let keys: Vec<&str> = query.split('&').map(|p| p.split('=').next().unwrap()).collect();
        let mut sorted = keys[..keys.len() - 1].to_vec();
        sorted.sort();
        assert_eq!(&keys[..keys.len() - 1], sorted.as_slice());
        assert_eq!(keys.last(), Some(&SECURE_HASH_KEY));

        // The hash covers everything before it
        let (unsigned, hash) = query.rsplit_once("&vnp_SecureHash=").unwrap();
        assert_eq!(hash, sign_hex::<HmacSha512>("SECRETKEY", unsigned).unwrap());
        assert_eq!(hash.len(), 128);
    }

    #[test]
    fn test_callback_round_trip() {
        let gw = gateway();
        let link = gw.create_payment_link(&request()).unwrap();
        let mut callback = query_pairs(&link.url);
        assert!(gw.verify_signature(&callback));

        callback.insert("vnp_Amount".into(), "100".into());
        assert!(!gw.verify_signature(&callback));

        callback.remove(SECURE_HASH_KEY);
        assert!(!gw.verify_signature(&callback));
    }

    #[test]
    fn test_signature_covers_every_param() {
        let gw = gateway();
        let link = gw.create_payment_link(&request()).unwrap();
        let mut callback = query_pairs(&link.url);
        callback.insert("promo".into(), "FREE".into());
        assert!(!gw.verify_signature(&callback));

        callback.remove(SECURE_HASH_KEY);
        let hash = gw.sign(&canonical_query(&callback)).unwrap();
        callback.insert(SECURE_HASH_KEY.into(), hash);
        assert!(gw.verify_signature(&callback));
    }

    #[test]
    fn test_parse_callback() {
        let gw = gateway();
        let mut params = VnPayParams::new();
        for (k, v) in [
            ("vnp_TxnRef", "42"),
            ("vnp_Amount", "900000"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TransactionStatus", "00"),
            ("vnp_TransactionNo", "14012345"),
        ] {
            params.insert(k.into(), v.into());
        }
        let outcome = gw.parse_callback(&params).unwrap();
        assert_eq!(outcome.order_id, 42);
        assert_eq!(outcome.amount, 9_000);
        assert!(outcome.success);

        params.insert("vnp_TransactionStatus".into(), "02".into());
        assert!(!gw.parse_callback(&params).unwrap().success);

        params.insert("vnp_TxnRef".into(), "abc".into());
        assert!(matches!(
            gw.parse_callback(&params).unwrap_err(),
            BillingError::MalformedField { field: "vnp_TxnRef", .. }
        ));
    }

    #[test]
    fn test_response_message() {
        assert_eq!(response_message("24"), "Customer cancelled the transaction");
        assert_eq!(response_message("42"), "Error code: 42");
    }
}
