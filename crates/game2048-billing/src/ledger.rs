//! The billing ledger: plans, orders and subscriptions in one JSON document.
//!
//! A ledger opened from a path writes itself back after every mutation, the
//! same way the local leaderboard file works. An in-memory ledger never
//! touches the disk.

use crate::clock::display_timestamp;
use crate::error::{BillingError, Result};
use crate::gateway::{PaymentGateway, PaymentLink, PaymentRequest};
use crate::plan::{default_plans, Order, OrderStatus, PaymentMethod, PremiumPlan, Subscription};
use crate::vnpay::IpnReply;
use game2048_core::{unix_now, Entitlements, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Orders shown on the premium page
pub const RECENT_ORDERS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerData {
    plans: Vec<PremiumPlan>,
    #[serde(default)]
    orders: Vec<Order>,
    #[serde(default)]
    subscriptions: HashMap<UserId, Subscription>,
    #[serde(default = "first_order_id")]
    next_order_id: u64,
}

fn first_order_id() -> u64 {
    1
}

impl Default for LedgerData {
    fn default() -> Self {
        Self {
            plans: default_plans(),
            orders: Vec::new(),
            subscriptions: HashMap::new(),
            next_order_id: first_order_id(),
        }
    }
}

impl LedgerData {
    fn new_order(
        &mut self,
        user: UserId,
        plan_id: Option<u32>,
        amount: u64,
        method: PaymentMethod,
        status: OrderStatus,
        now: u64,
    ) -> Order {
        let order = Order {
            id: self.next_order_id,
            user_id: user,
            plan_id,
            amount,
            status,
            payment_method: method,
            transaction_id: Uuid::new_v4().to_string(),
            created_at: now,
            completed_at: (status == OrderStatus::Completed).then_some(now),
        };
        self.next_order_id += 1;
        self.orders.push(order.clone());
        order
    }

    fn active_plan(&self, plan_id: u32) -> Result<PremiumPlan> {
        let plan = self
            .plans
            .iter()
            .find(|p| p.id == plan_id)
            .ok_or(BillingError::UnknownPlan(plan_id))?;
        if !plan.is_active {
            return Err(BillingError::PlanInactive(plan_id));
        }
        Ok(plan.clone())
    }

    fn duration_of(&self, plan_id: Option<u32>) -> Option<u32> {
        let id = plan_id?;
        self.plans.iter().find(|p| p.id == id).map(|p| p.duration_days)
    }

    fn order_index(&self, order_id: u64) -> Result<usize> {
        self.orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or(BillingError::UnknownOrder(order_id))
    }

    fn complete(&mut self, order_id: u64, transaction_no: &str, now: u64) -> Result<bool> {
        let idx = self.order_index(order_id)?;
        if self.orders[idx].status != OrderStatus::Pending {
            log::debug!("order {} already {}", order_id, self.orders[idx].status);
            return Ok(false);
        }

        let duration = self.duration_of(self.orders[idx].plan_id).unwrap_or(0);
        let user = self.orders[idx].user_id;
        {
            let order = &mut self.orders[idx];
            order.status = OrderStatus::Completed;
            order.completed_at = Some(now);
            if !transaction_no.is_empty() {
                order.transaction_id = transaction_no.to_string();
            }
        }
        self.subscriptions.entry(user).or_default().activate(duration, now);
        log::info!("order {} completed, user {} premium +{} days", order_id, user, duration);
        Ok(true)
    }

    fn fail(&mut self, order_id: u64) -> Result<bool> {
        let idx = self.order_index(order_id)?;
        let order = &mut self.orders[idx];
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        order.status = OrderStatus::Failed;
        log::info!("order {} failed", order_id);
        Ok(true)
    }
}

/// A user's premium state as shown to them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub expires_at: Option<u64>,
    pub days_left: u64,
}

impl PremiumStatus {
    pub fn expires_at_display(&self) -> Option<String> {
        self.expires_at.map(display_timestamp)
    }
}

/// Result of applying a verified gateway callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The order was pending and is now paid; premium is active
    Completed(Order),
    /// The order was already settled; nothing changed
    AlreadyProcessed(Order),
    /// The gateway reported a failed payment
    Failed { order: Order, response_code: String },
}

pub struct Billing {
    data: Mutex<LedgerData>,
    path: Option<PathBuf>,
}

impl Default for Billing {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Billing {
    /// A ledger seeded with the default plans that is never persisted
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(LedgerData::default()),
            path: None,
        }
    }

    /// Load the ledger at `path`, starting a fresh one if the file is absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            data: Mutex::new(serde_json::from_str(json)?),
            path: None,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `change` on a copy of the ledger. The copy replaces the live
    /// ledger only after it is written, so a failed write changes nothing.
    /// `change` also reports whether there is anything to write.
    fn commit<T>(&self, change: impl FnOnce(&mut LedgerData) -> Result<(T, bool)>) -> Result<T> {
        let mut data = self.lock();
        let mut next = data.clone();
        let (value, dirty) = change(&mut next)?;
        if dirty {
            self.persist(&next)?;
            *data = next;
        }
        Ok(value)
    }

    fn persist(&self, data: &LedgerData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(data)?)?;
        Ok(())
    }

    /// Active plans, cheapest first
    pub fn plans(&self) -> Vec<PremiumPlan> {
        let mut plans: Vec<PremiumPlan> =
            self.lock().plans.iter().filter(|p| p.is_active).cloned().collect();
        plans.sort_by_key(|p| (p.price, p.id));
        plans
    }

    pub fn order(&self, order_id: u64) -> Option<Order> {
        self.lock().orders.iter().find(|o| o.id == order_id).cloned()
    }

    /// A user's most recent orders, newest first
    pub fn orders_for(&self, user: UserId, limit: usize) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders.truncate(limit);
        orders
    }

    /// Current entitlement, switching off an expired subscription
    pub fn status(&self, user: UserId, now: u64) -> Result<PremiumStatus> {
        self.commit(|data| {
            let Some(sub) = data.subscriptions.get_mut(&user) else {
                let status = PremiumStatus {
                    is_premium: false,
                    expires_at: None,
                    days_left: 0,
                };
                return Ok((status, false));
            };
            let was_premium = sub.is_premium;
            let status = PremiumStatus {
                is_premium: sub.check_status(now),
                expires_at: sub.expires_at,
                days_left: sub.days_left(now),
            };
            let expired = was_premium && !status.is_premium;
            if expired {
                log::info!("premium for user {} expired", user);
            }
            Ok((status, expired))
        })
    }

    /// Start buying `plan_id`. Gateway methods leave a pending order for the
    /// callback to settle; demo payments complete and activate at once.
    pub fn purchase(
        &self,
        user: UserId,
        plan_id: u32,
        method: PaymentMethod,
        now: u64,
    ) -> Result<Order> {
        if method == PaymentMethod::ManualCancel {
            return Err(BillingError::UnsupportedMethod(method));
        }
        self.commit(|data| {
            let plan = data.active_plan(plan_id)?;
            let order = if method.uses_gateway() {
                data.new_order(user, Some(plan.id), plan.price, method, OrderStatus::Pending, now)
            } else {
                let order = data.new_order(
                    user,
                    Some(plan.id),
                    plan.price,
                    method,
                    OrderStatus::Completed,
                    now,
                );
                data.subscriptions
                    .entry(user)
                    .or_default()
                    .activate(plan.duration_days, now);
                log::info!("user {} activated {} via {}", user, plan.name, method);
                order
            };
            Ok((order, true))
        })
    }

    /// Create a pending order and the gateway request that pays for it
    pub fn checkout<G: PaymentGateway>(
        &self,
        gateway: &G,
        user: UserId,
        plan_id: u32,
        ip_addr: &str,
        now: u64,
    ) -> Result<(Order, PaymentLink)> {
        let plan = self.lock().active_plan(plan_id)?;
        let order = self.purchase(user, plan_id, gateway.method(), now)?;
        let request = PaymentRequest {
            order_id: order.id,
            amount: order.amount,
            description: format!("Premium plan: {}", plan.name),
            ip_addr: ip_addr.to_string(),
            created_at: now,
        };
        let link = gateway.create_payment_link(&request)?;
        Ok((order, link))
    }

    /// Mark a pending order paid and extend the buyer's premium.
    ///
    /// Returns `false` without changing anything when the order is not
    /// pending, so a repeated callback never activates twice.
    pub fn complete_order(&self, order_id: u64, transaction_no: &str, now: u64) -> Result<bool> {
        self.commit(|data| {
            let completed = data.complete(order_id, transaction_no, now)?;
            Ok((completed, completed))
        })
    }

    /// Mark a pending order failed. Settled orders are left alone.
    pub fn fail_order(&self, order_id: u64) -> Result<bool> {
        self.commit(|data| {
            let failed = data.fail(order_id)?;
            Ok((failed, failed))
        })
    }

    /// Verify and apply a gateway callback.
    ///
    /// The pending check and the status change happen under one lock, so of
    /// two concurrent deliveries of the same callback only one settles.
    pub fn settle<G: PaymentGateway>(
        &self,
        gateway: &G,
        callback: &G::Callback,
        now: u64,
    ) -> Result<Settlement> {
        if !gateway.verify_signature(callback) {
            return Err(BillingError::InvalidSignature);
        }
        let outcome = gateway.parse_callback(callback)?;
        self.commit(|data| {
            let idx = data.order_index(outcome.order_id)?;
            let order = &data.orders[idx];
            if order.amount != outcome.amount {
                log::warn!(
                    "order {} paid {} but costs {}",
                    order.id,
                    outcome.amount,
                    order.amount
                );
                return Err(BillingError::AmountMismatch {
                    expected: order.amount,
                    paid: outcome.amount,
                });
            }

            let settled = if outcome.success {
                data.complete(outcome.order_id, &outcome.transaction_no, now)?
            } else {
                data.fail(outcome.order_id)?
            };
            let order = data.orders[idx].clone();
            let settlement = match (settled, outcome.success) {
                (false, _) => Settlement::AlreadyProcessed(order),
                (true, true) => Settlement::Completed(order),
                (true, false) => Settlement::Failed {
                    order,
                    response_code: outcome.response_code,
                },
            };
            Ok((settlement, settled))
        })
    }

    /// End premium immediately, leaving a cancelled bookkeeping order
    pub fn cancel(&self, user: UserId, now: u64) -> Result<Order> {
        self.commit(|data| {
            let active = data
                .subscriptions
                .get_mut(&user)
                .map(|sub| sub.check_status(now))
                .unwrap_or(false);
            if !active {
                return Err(BillingError::NotPremium);
            }
            let order = data.new_order(
                user,
                None,
                0,
                PaymentMethod::ManualCancel,
                OrderStatus::Cancelled,
                now,
            );
            if let Some(sub) = data.subscriptions.get_mut(&user) {
                sub.clear();
            }
            log::info!("user {} cancelled premium", user);
            Ok((order, true))
        })
    }
}

impl Entitlements for Billing {
    fn is_premium_active(&self, user: UserId) -> bool {
        match self.status(user, unix_now()) {
            Ok(status) => status.is_premium,
            Err(e) => {
                log::warn!("could not persist premium expiry for user {}: {}", user, e);
                false
            }
        }
    }
}

/// The VNPay IPN acknowledgement for a settlement attempt
pub fn ipn_reply(result: &Result<Settlement>) -> IpnReply {
    match result {
        Ok(Settlement::Completed(_)) => IpnReply::new("00", "Success"),
        Ok(Settlement::Failed { .. }) => IpnReply::new("00", "Confirmed"),
        Ok(Settlement::AlreadyProcessed(_)) => IpnReply::new("02", "Order already confirmed"),
        Err(BillingError::InvalidSignature) => IpnReply::new("97", "Invalid signature"),
        Err(BillingError::UnknownOrder(_)) => IpnReply::new("01", "Order not found"),
        Err(BillingError::AmountMismatch { .. }) => IpnReply::new("04", "Invalid amount"),
        Err(_) => IpnReply::new("99", "Unknown error"),
    }
}
