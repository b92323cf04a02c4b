//! Premium plans, orders and per-user subscriptions

use crate::clock::DAY;
use game2048_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A purchasable premium package. Prices are whole VND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumPlan {
    pub id: u32,
    pub name: String,
    pub duration_days: u32,
    pub price: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// The catalogue a fresh ledger starts with
pub fn default_plans() -> Vec<PremiumPlan> {
    vec![
        PremiumPlan {
            id: 1,
            name: "Premium 1 month".into(),
            duration_days: 30,
            price: 9_000,
            description: "Hints, shuffle and tile swap for 30 days".into(),
            is_active: true,
        },
        PremiumPlan {
            id: 2,
            name: "Premium 3 months".into(),
            duration_days: 90,
            price: 15_000,
            description: "Save more with the 3 month plan".into(),
            is_active: true,
        },
        PremiumPlan {
            id: 3,
            name: "Premium 1 year".into(),
            duration_days: 365,
            price: 19_000,
            description: "Best value, a full year of premium".into(),
            is_active: true,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How an order is (or was) paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "vnpay")]
    VnPay,
    #[serde(rename = "payos")]
    PayOs,
    /// Completes immediately without a gateway
    #[serde(rename = "demo")]
    Demo,
    /// Bookkeeping row written when a user cancels premium
    #[serde(rename = "manual_cancel")]
    ManualCancel,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::VnPay => "vnpay",
            PaymentMethod::PayOs => "payos",
            PaymentMethod::Demo => "demo",
            PaymentMethod::ManualCancel => "manual_cancel",
        }
    }

    /// Whether orders paid this way wait for a gateway callback
    pub fn uses_gateway(self) -> bool {
        matches!(self, PaymentMethod::VnPay | PaymentMethod::PayOs)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vnpay" => Ok(PaymentMethod::VnPay),
            "payos" => Ok(PaymentMethod::PayOs),
            "demo" => Ok(PaymentMethod::Demo),
            other => Err(format!(
                "unknown payment method '{}' (expected vnpay, payos or demo)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub user_id: UserId,
    pub plan_id: Option<u32>,
    pub amount: u64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// A uuid until a gateway reports its own transaction number
    pub transaction_id: String,
    pub created_at: u64,
    #[serde(default)]
    pub completed_at: Option<u64>,
}

/// A user's premium entitlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subscription {
    pub is_premium: bool,
    pub expires_at: Option<u64>,
}

impl Subscription {
    /// Whether premium is active at `now`. An expired subscription is
    /// switched off as a side effect.
    pub fn check_status(&mut self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) if self.is_premium => {
                if now > expires {
                    self.is_premium = false;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Whole days left before expiry, never negative
    pub fn days_left(&self, now: u64) -> u64 {
        self.expires_at
            .map(|expires| expires.saturating_sub(now) / DAY)
            .unwrap_or(0)
    }

    /// Extend by `duration_days`, counting from the current expiry when it
    /// is still in the future
    pub fn activate(&mut self, duration_days: u32, now: u64) {
        let base = match self.expires_at {
            Some(expires) if expires > now => expires,
            _ => now,
        };
        self.is_premium = true;
        self.expires_at = Some(base + u64::from(duration_days) * DAY);
    }

    pub fn clear(&mut self) {
        self.is_premium = false;
        self.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_activation_extends_from_later_of_now_and_expiry() {
        let mut sub = Subscription::default();
        sub.activate(30, NOW);
        assert_eq!(sub.expires_at, Some(NOW + 30 * DAY));

        // Renewing early stacks on top of the remaining time
        sub.activate(30, NOW + 10 * DAY);
        assert_eq!(sub.expires_at, Some(NOW + 60 * DAY));

        // Renewing after expiry starts from now
        let later = NOW + 100 * DAY;
        sub.activate(90, later);
        assert_eq!(sub.expires_at, Some(later + 90 * DAY));
    }

    #[test]
    fn test_lazy_expiry() {
        let mut sub = Subscription::default();
        sub.activate(1, NOW);
        assert!(sub.check_status(NOW + DAY));
        assert!(!sub.check_status(NOW + DAY + 1));
        assert!(!sub.is_premium);
        // The expiry date is kept for display
        assert_eq!(sub.expires_at, Some(NOW + DAY));
    }

    #[test]
    fn test_days_left() {
        let mut sub = Subscription::default();
        assert_eq!(sub.days_left(NOW), 0);
        sub.activate(30, NOW);
        assert_eq!(sub.days_left(NOW), 30);
        assert_eq!(sub.days_left(NOW + 1), 29);
        assert_eq!(sub.days_left(NOW + 31 * DAY), 0);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("vnpay".parse::<PaymentMethod>().unwrap(), PaymentMethod::VnPay);
        assert!("manual_cancel".parse::<PaymentMethod>().is_err());
        assert_eq!(
            serde_json::to_string(&PaymentMethod::ManualCancel).unwrap(),
            "\"manual_cancel\""
        );
    }
}
