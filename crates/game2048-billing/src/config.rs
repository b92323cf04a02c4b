//! Gateway credentials read from the environment.
//!
//! A gateway whose credentials are missing is left unconfigured and the
//! ledger falls back to demo payments.

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const VNPAY_SANDBOX_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";
pub const PAYOS_API_URL: &str = "https://api-merchant.payos.vn/v2/payment-requests";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnPayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub url: String,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayOsConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    pub api_url: String,
    pub return_url: String,
    pub cancel_url: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BillingConfig {
    pub base_url: String,
    pub vnpay: Option<VnPayConfig>,
    pub payos: Option<PayOsConfig>,
}

impl BillingConfig {
    /// Read `G2048_BASE_URL`, `VNPAY_*` and `PAYOS_*` from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let base_url = get("G2048_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let vnpay = match (get("VNPAY_TMN_CODE"), get("VNPAY_HASH_SECRET")) {
            (Some(tmn_code), Some(hash_secret)) => Some(VnPayConfig {
                tmn_code,
                hash_secret,
                url: get("VNPAY_URL").unwrap_or_else(|| VNPAY_SANDBOX_URL.to_string()),
                return_url: format!("{}/vnpay_return", base_url),
            }),
            _ => None,
        };

        let payos = match (
            get("PAYOS_CLIENT_ID"),
            get("PAYOS_API_KEY"),
            get("PAYOS_CHECKSUM_KEY"),
        ) {
            (Some(client_id), Some(api_key), Some(checksum_key)) => Some(PayOsConfig {
                client_id,
                api_key,
                checksum_key,
                api_url: PAYOS_API_URL.to_string(),
                return_url: format!("{}/payos/return", base_url),
                cancel_url: format!("{}/payos/cancel", base_url),
                webhook_url: format!("{}/payos/webhook", base_url),
            }),
            _ => None,
        };

        if vnpay.is_none() && payos.is_none() {
            log::info!("no gateway credentials found, billing runs in demo mode");
        }

        Self {
            base_url,
            vnpay,
            payos,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.vnpay.is_none() && self.payos.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_demo_mode_without_credentials() {
        let config = BillingConfig::from_lookup(lookup(&[]));
        assert!(config.is_demo());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_vnpay_from_env() {
        let config = BillingConfig::from_lookup(lookup(&[
            ("VNPAY_TMN_CODE", "DEMO1234"),
            ("VNPAY_HASH_SECRET", "SECRET"),
            ("G2048_BASE_URL", "https://play.example.com/"),
        ]));
        let vnpay = config.vnpay.unwrap();
        assert_eq!(vnpay.url, VNPAY_SANDBOX_URL);
        assert_eq!(vnpay.return_url, "https://play.example.com/vnpay_return");
        assert!(config.payos.is_none());
    }

    #[test]
    fn test_partial_payos_credentials_ignored() {
        let config = BillingConfig::from_lookup(lookup(&[
            ("PAYOS_CLIENT_ID", "cid"),
            ("PAYOS_API_KEY", ""),
            ("PAYOS_CHECKSUM_KEY", "ck"),
        ]));
        assert!(config.payos.is_none());
    }
}
