//! Non-interactive subcommands: score tables and premium administration

use crate::app::Service;
use crate::error::{AppError, AppResult};
use crate::storage::PlayerDirectory;
use game2048_billing::clock::display_timestamp;
use game2048_billing::{
    ipn_reply, response_message, Billing, BillingConfig, BillingError, OrderStatus, PaymentLink,
    PaymentMethod, PayOs, Settlement, VnPay, VnPayParams, RECENT_ORDERS,
};
use game2048_core::{
    history_page, history_stats, leaderboard, ScoreSink, UserId, HISTORY_PAGE_SIZE,
};
use serde_json::json;
use std::io::Write;
use url::Url;

/// A gateway callback as handed to `premium verify`
pub enum Callback {
    /// Return or IPN query string, or the full return URL
    VnPay(String),
    /// Webhook JSON body
    PayOs(String),
}

pub fn show_leaderboard(
    service: &Service,
    players: &PlayerDirectory,
    limit: usize,
    as_json: bool,
    out: &mut impl Write,
) -> AppResult<()> {
    let records = service.scores().records()?;
    let rows = leaderboard(&records, limit);

    if as_json {
        let rows: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "rank": row.rank,
                    "player": players.name_of(row.record.user_id),
                    "score": row.record.score,
                    "maxTile": row.record.max_tile,
                    "moves": row.record.moves,
                    "createdAt": row.record.created_at,
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    if rows.is_empty() {
        writeln!(out, "No finished games yet")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:>4}  {:<16} {:>8} {:>6} {:>6}  {}",
        "#", "Player", "Score", "Tile", "Moves", "Date"
    )?;
    for row in rows {
        writeln!(
            out,
            "{:>4}  {:<16} {:>8} {:>6} {:>6}  {}",
            row.rank,
            players.name_of(row.record.user_id),
            row.record.score,
            row.record.max_tile,
            row.record.moves,
            display_timestamp(row.record.created_at)
        )?;
    }
    Ok(())
}

pub fn show_history(
    service: &Service,
    user: UserId,
    page: usize,
    as_json: bool,
    out: &mut impl Write,
) -> AppResult<()> {
    let records = service.scores().records()?;
    let page = history_page(&records, user, page, HISTORY_PAGE_SIZE);
    let stats = history_stats(&records, user);

    if as_json {
        let body = json!({ "page": page, "stats": stats });
        writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        return Ok(());
    }

    writeln!(
        out,
        "Games {}  Best {}  Best tile {}  Average {:.1}  Moves {}",
        stats.total_games, stats.best_score, stats.best_tile, stats.avg_score, stats.total_moves
    )?;
    for record in &page.records {
        writeln!(
            out,
            "{}  {:>8} {:>6} {:>6}",
            display_timestamp(record.created_at),
            record.score,
            record.max_tile,
            record.moves
        )?;
    }
    writeln!(out, "page {}/{}", page.page, page.pages().max(1))?;
    Ok(())
}

pub fn submit_score(
    service: &Service,
    user: UserId,
    score: i64,
    max_tile: i64,
    moves: i64,
    out: &mut impl Write,
) -> AppResult<()> {
    let record = service.submit_score(user, score, max_tile, moves)?;
    writeln!(
        out,
        "Recorded score {} (max tile {}, {} moves)",
        record.score, record.max_tile, record.moves
    )?;
    Ok(())
}

// ==================== Premium ====================

pub fn show_plans(billing: &Billing, as_json: bool, out: &mut impl Write) -> AppResult<()> {
    let plans = billing.plans();
    if as_json {
        writeln!(out, "{}", serde_json::to_string_pretty(&plans)?)?;
        return Ok(());
    }
    for plan in plans {
        writeln!(
            out,
            "[{}] {:<18} {:>4} days {:>8} VND  {}",
            plan.id, plan.name, plan.duration_days, plan.price, plan.description
        )?;
    }
    Ok(())
}

pub fn show_status(
    billing: &Billing,
    config: &BillingConfig,
    user: UserId,
    now: u64,
    out: &mut impl Write,
) -> AppResult<()> {
    let status = billing.status(user, now)?;
    match status.expires_at_display() {
        Some(expires) if status.is_premium => writeln!(
            out,
            "Premium: active, {} days left (expires {} UTC)",
            status.days_left, expires
        )?,
        Some(expires) => writeln!(out, "Premium: expired on {} UTC", expires)?,
        None => writeln!(out, "Premium: inactive")?,
    }

    let mode = match (&config.vnpay, &config.payos) {
        (None, None) => "demo (no gateway configured)".to_string(),
        (vnpay, payos) => {
            let mut names = Vec::new();
            if vnpay.is_some() {
                names.push("vnpay");
            }
            if payos.is_some() {
                names.push("payos");
            }
            names.join(", ")
        }
    };
    writeln!(out, "Payments: {}", mode)?;
    if let Some(payos) = &config.payos {
        writeln!(out, "PayOS webhook: {}", payos.webhook_url)?;
    }

    let orders = billing.orders_for(user, RECENT_ORDERS);
    if !orders.is_empty() {
        writeln!(out, "Recent orders:")?;
    }
    for order in orders {
        writeln!(
            out,
            "  #{:<5} {}  {:>8} VND  {:<13} {:<9} {}",
            order.id,
            display_timestamp(order.created_at),
            order.amount,
            order.payment_method,
            order.status,
            order.transaction_id
        )?;
    }
    Ok(())
}

/// The method used when `buy` is not told one: the first configured gateway
fn default_method(config: &BillingConfig) -> PaymentMethod {
    if config.vnpay.is_some() {
        PaymentMethod::VnPay
    } else if config.payos.is_some() {
        PaymentMethod::PayOs
    } else {
        PaymentMethod::Demo
    }
}

fn vnpay_gateway(config: &BillingConfig) -> AppResult<VnPay> {
    let vnpay = config
        .vnpay
        .clone()
        .ok_or(BillingError::GatewayUnavailable("vnpay"))?;
    Ok(VnPay::new(vnpay))
}

fn payos_gateway(config: &BillingConfig) -> AppResult<PayOs> {
    let payos = config
        .payos
        .clone()
        .ok_or(BillingError::GatewayUnavailable("payos"))?;
    Ok(PayOs::new(payos))
}

pub struct BuyRequest<'a> {
    pub plan_id: u32,
    pub method: Option<PaymentMethod>,
    pub ip_addr: &'a str,
    pub bank_code: Option<&'a str>,
}

pub fn buy(
    billing: &Billing,
    config: &BillingConfig,
    user: UserId,
    request: BuyRequest<'_>,
    now: u64,
    out: &mut impl Write,
) -> AppResult<()> {
    match request.method.unwrap_or_else(|| default_method(config)) {
        PaymentMethod::VnPay => {
            let mut gateway = vnpay_gateway(config)?;
            if let Some(bank) = request.bank_code {
                gateway = gateway.with_bank_code(bank);
            }
            let (order, link) =
                billing.checkout(&gateway, user, request.plan_id, request.ip_addr, now)?;
            writeln!(out, "Order #{} pending. Pay here:", order.id)?;
            writeln!(out, "{}", link.url)?;
        }
        PaymentMethod::PayOs => {
            let gateway = payos_gateway(config)?;
            let (order, link) =
                billing.checkout(&gateway, user, request.plan_id, request.ip_addr, now)?;
            writeln!(out, "Order #{} pending. Send this request to PayOS:", order.id)?;
            print_request(&link, out)?;
        }
        method => {
            let order = billing.purchase(user, request.plan_id, method, now)?;
            let status = billing.status(user, now)?;
            writeln!(
                out,
                "Order #{} completed. Premium active until {} UTC",
                order.id,
                status.expires_at_display().unwrap_or_default()
            )?;
        }
    }
    Ok(())
}

fn print_request(link: &PaymentLink, out: &mut impl Write) -> AppResult<()> {
    writeln!(out, "{} {}", link.method, link.url)?;
    for (name, value) in &link.headers {
        writeln!(out, "{}: {}", name, value)?;
    }
    if let Some(body) = &link.body {
        writeln!(out, "{}", serde_json::to_string_pretty(body)?)?;
    }
    Ok(())
}

/// One of the user's orders. A PayOS order also prints the prepared status
/// lookup, or with `cancel` the request that withdraws its payment link.
pub fn show_order(
    billing: &Billing,
    config: &BillingConfig,
    user: UserId,
    order_id: u64,
    cancel: Option<Option<&str>>,
    out: &mut impl Write,
) -> AppResult<()> {
    let order = billing
        .order(order_id)
        .filter(|order| order.user_id == user)
        .ok_or(BillingError::UnknownOrder(order_id))?;
    writeln!(
        out,
        "Order #{} {}: {} VND via {}, created {} UTC",
        order.id,
        order.status,
        order.amount,
        order.payment_method,
        display_timestamp(order.created_at)
    )?;
    if let Some(completed) = order.completed_at {
        writeln!(out, "Completed {} UTC ({})", display_timestamp(completed), order.transaction_id)?;
    }

    if order.payment_method != PaymentMethod::PayOs {
        if cancel.is_some() {
            return Err(BillingError::UnsupportedMethod(order.payment_method).into());
        }
        return Ok(());
    }
    let gateway = payos_gateway(config)?;
    match cancel {
        Some(reason) => {
            if order.status != OrderStatus::Pending {
                writeln!(out, "Nothing to cancel, the order is already {}", order.status)?;
                return Ok(());
            }
            writeln!(out, "Send this request to PayOS to cancel the payment link:")?;
            print_request(&gateway.cancel_request(order.id, reason), out)
        }
        None => {
            writeln!(out, "Payment status request:")?;
            print_request(&gateway.payment_info_request(order.id), out)
        }
    }
}

fn parse_vnpay_query(raw: &str) -> AppResult<VnPayParams> {
    let raw = raw.trim();
    let query = if raw.contains("://") {
        let url = Url::parse(raw).map_err(|e| AppError::Callback(e.to_string()))?;
        url.query().unwrap_or_default().to_string()
    } else {
        raw.trim_start_matches('?').to_string()
    };
    Ok(url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect())
}

/// Settle a gateway callback against the ledger and print the reply the
/// gateway expects
pub fn verify(
    billing: &Billing,
    config: &BillingConfig,
    callback: Callback,
    now: u64,
    out: &mut impl Write,
) -> AppResult<()> {
    match callback {
        Callback::VnPay(raw) => {
            let gateway = vnpay_gateway(config)?;
            let params = parse_vnpay_query(&raw)?;
            let result = billing.settle(&gateway, &params, now);
            let reply = ipn_reply(&result);
            match &result {
                Ok(Settlement::Completed(order)) => {
                    writeln!(out, "Order #{} paid, premium activated", order.id)?
                }
                Ok(Settlement::Failed { order, response_code }) => writeln!(
                    out,
                    "Order #{} failed: {}",
                    order.id,
                    response_message(response_code)
                )?,
                Ok(Settlement::AlreadyProcessed(order)) => {
                    writeln!(out, "Order #{} was already {}", order.id, order.status)?
                }
                Err(e) => writeln!(out, "Rejected: {}", e)?,
            }
            writeln!(out, "{}", serde_json::to_string(&reply)?)?;
        }
        Callback::PayOs(body) => {
            let gateway = payos_gateway(config)?;
            let webhook: serde_json::Value =
                serde_json::from_str(&body).map_err(|e| AppError::Callback(e.to_string()))?;
            let settlement = billing.settle(&gateway, &webhook, now)?;
            let message = match &settlement {
                Settlement::Completed(order) => format!("Order #{} paid", order.id),
                Settlement::Failed { order, response_code } => {
                    format!("Order #{} failed with code {}", order.id, response_code)
                }
                Settlement::AlreadyProcessed(order) => {
                    format!("Order #{} was already {}", order.id, order.status)
                }
            };
            writeln!(out, "{}", json!({ "success": true, "message": message }))?;
        }
    }
    Ok(())
}

pub fn cancel(billing: &Billing, user: UserId, now: u64, out: &mut impl Write) -> AppResult<()> {
    let order = billing.cancel(user, now)?;
    writeln!(out, "Premium cancelled (order #{})", order.id)?;
    Ok(())
}
