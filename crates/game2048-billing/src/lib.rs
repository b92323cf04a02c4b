//! Premium billing for 2048
//!
//! Plans, orders and subscriptions live in a JSON ledger. Payments go through
//! VNPay or PayOS when credentials are configured, or complete instantly in
//! demo mode. The ledger implements [`game2048_core::Entitlements`] so a
//! `GameService` can gate premium moves on it directly.

pub mod clock;
mod config;
mod error;
mod gateway;
mod ledger;
mod payos;
mod plan;
mod vnpay;

pub use config::{BillingConfig, PayOsConfig, VnPayConfig};
pub use error::{BillingError, Result};
pub use gateway::{PaymentGateway, PaymentLink, PaymentOutcome, PaymentRequest};
pub use ledger::{ipn_reply, Billing, PremiumStatus, Settlement, RECENT_ORDERS};
pub use payos::PayOs;
pub use plan::{default_plans, Order, OrderStatus, PaymentMethod, PremiumPlan, Subscription};
pub use vnpay::{response_message, IpnReply, VnPay, VnPayParams};
