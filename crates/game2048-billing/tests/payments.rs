use game2048_billing::{
    ipn_reply, Billing, BillingConfig, BillingError, OrderStatus, PaymentGateway, PaymentMethod,
    PayOs, Settlement, VnPay, VnPayParams,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::{Sha256, Sha512};

const NOW: u64 = 1_704_052_800;

fn config() -> BillingConfig {
    let env = [
        ("VNPAY_TMN_CODE", "TESTCODE"),
        ("VNPAY_HASH_SECRET", "SECRETKEY"),
        ("PAYOS_CLIENT_ID", "client"),
        ("PAYOS_API_KEY", "api"),
        ("PAYOS_CHECKSUM_KEY", "checksum"),
    ];
    BillingConfig::from_lookup(|key| {
        env.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
}

fn hmac_hex<M: Mac + hmac::digest::KeyInit>(key: &str, data: &str) -> String {
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key.as_bytes()).unwrap();
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A VNPay return query, signed the way VNPay signs it
fn vnpay_callback(order_id: u64, amount: u64, response_code: &str) -> VnPayParams {
    let mut params = VnPayParams::new();
    for (k, v) in [
        ("vnp_Amount", (amount * 100).to_string()),
        ("vnp_BankCode", "NCB".to_string()),
        ("vnp_ResponseCode", response_code.to_string()),
        ("vnp_TmnCode", "TESTCODE".to_string()),
        ("vnp_TransactionNo", "14012345".to_string()),
        ("vnp_TransactionStatus", response_code.to_string()),
        ("vnp_TxnRef", order_id.to_string()),
    ] {
        params.insert(k.to_string(), v);
    }
    let canonical = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    params.insert(
        "vnp_SecureHash".to_string(),
        hmac_hex::<Hmac<Sha512>>("SECRETKEY", &canonical),
    );
    params
}

#[test]
fn test_vnpay_checkout_and_ipn() {
    let billing = Billing::in_memory();
    let vnpay = VnPay::new(config().vnpay.unwrap());

    let (order, link) = billing.checkout(&vnpay, 7, 1, "127.0.0.1", NOW).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_method, PaymentMethod::VnPay);
    assert!(link.url.contains("vnp_Amount=900000"));
    assert!(link.url.contains(&format!("vnp_TxnRef={}", order.id)));

    let callback = vnpay_callback(order.id, 9_000, "00");
    let settled = billing.settle(&vnpay, &callback, NOW + 30);
    assert_eq!(ipn_reply(&settled).rsp_code, "00");
    match settled.unwrap() {
        Settlement::Completed(done) => {
            assert_eq!(done.status, OrderStatus::Completed);
            assert_eq!(done.transaction_id, "14012345");
            assert_eq!(done.completed_at, Some(NOW + 30));
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(billing.status(7, NOW + 30).unwrap().is_premium);

    // VNPay retries the IPN; the second delivery is acknowledged but ignored
    let again = billing.settle(&vnpay, &callback, NOW + 60);
    assert!(matches!(again, Ok(Settlement::AlreadyProcessed(_))));
    assert_eq!(ipn_reply(&again).rsp_code, "02");
}

#[test]
fn test_concurrent_ipn_settles_once() {
    let billing = Billing::in_memory();
    let vnpay = VnPay::new(config().vnpay.unwrap());
    let (order, _) = billing.checkout(&vnpay, 7, 1, "127.0.0.1", NOW).unwrap();
    let callback = vnpay_callback(order.id, 9_000, "00");

    let results: Vec<Settlement> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| billing.settle(&vnpay, &callback, NOW + 30).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let completed = results
        .iter()
        .filter(|s| matches!(s, Settlement::Completed(_)))
        .count();
    assert_eq!(completed, 1);
    assert!(results
        .iter()
        .all(|s| matches!(s, Settlement::Completed(_) | Settlement::AlreadyProcessed(_))));

    let status = billing.status(7, NOW + 30).unwrap();
    assert_eq!(status.expires_at, Some(NOW + 30 + 30 * 86_400));
}

#[test]
fn test_settle_reports_completion_by_a_concurrent_path() {
    let billing = Billing::in_memory();
    let vnpay = VnPay::new(config().vnpay.unwrap());
    let (order, _) = billing.checkout(&vnpay, 7, 1, "127.0.0.1", NOW).unwrap();
    assert!(billing.complete_order(order.id, "14012345", NOW + 10).unwrap());

    let settled = billing.settle(&vnpay, &vnpay_callback(order.id, 9_000, "00"), NOW + 30);
    assert!(matches!(settled, Ok(Settlement::AlreadyProcessed(_))));
    assert_eq!(
        billing.status(7, NOW + 30).unwrap().expires_at,
        Some(NOW + 10 + 30 * 86_400)
    );
}

#[test]
fn test_vnpay_rejections() {
    let billing = Billing::in_memory();
    let vnpay = VnPay::new(config().vnpay.unwrap());
    let (order, _) = billing.checkout(&vnpay, 7, 2, "127.0.0.1", NOW).unwrap();

    let mut forged = vnpay_callback(order.id, 15_000, "00");
    forged.insert("vnp_Amount".into(), "100".into());
    let result = billing.settle(&vnpay, &forged, NOW);
    assert!(matches!(result, Err(BillingError::InvalidSignature)));
    assert_eq!(ipn_reply(&result).rsp_code, "97");

    let underpaid = billing.settle(&vnpay, &vnpay_callback(order.id, 1_000, "00"), NOW);
    assert_eq!(ipn_reply(&underpaid).rsp_code, "04");

    let missing = billing.settle(&vnpay, &vnpay_callback(999, 15_000, "00"), NOW);
    assert_eq!(ipn_reply(&missing).rsp_code, "01");

    assert_eq!(billing.order(order.id).unwrap().status, OrderStatus::Pending);
    assert!(!billing.status(7, NOW).unwrap().is_premium);
}

#[test]
fn test_vnpay_cancelled_payment_fails_order() {
    let billing = Billing::in_memory();
    let vnpay = VnPay::new(config().vnpay.unwrap());
    let (order, _) = billing.checkout(&vnpay, 3, 1, "127.0.0.1", NOW).unwrap();

    let result = billing.settle(&vnpay, &vnpay_callback(order.id, 9_000, "24"), NOW);
    assert_eq!(ipn_reply(&result).rsp_code, "00");
    match result.unwrap() {
        Settlement::Failed {
            order,
            response_code,
        } => {
            assert_eq!(order.status, OrderStatus::Failed);
            assert_eq!(response_code, "24");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!billing.status(3, NOW).unwrap().is_premium);
}

#[test]
fn test_payos_checkout_and_webhook() {
    let billing = Billing::in_memory();
    let payos = PayOs::new(config().payos.unwrap());

    let (order, link) = billing.checkout(&payos, 9, 3, "", NOW).unwrap();
    assert_eq!(link.method, "POST");
    let body = link.body.unwrap();
    assert_eq!(body["orderCode"], order.id);
    assert_eq!(body["amount"], 19_000);

    let canonical = format!("amount=19000&orderCode={}&reference=FT001", order.id);
    let webhook = json!({
        "code": "00",
        "desc": "success",
        "data": { "orderCode": order.id, "amount": 19000, "reference": "FT001" },
        "signature": hmac_hex::<Hmac<Sha256>>("checksum", &canonical),
    });
    assert!(payos.verify_signature(&webhook));
    let settled = billing.settle(&payos, &webhook, NOW + 5).unwrap();
    assert!(matches!(settled, Settlement::Completed(_)));

    let status = billing.status(9, NOW + 5).unwrap();
    assert!(status.is_premium);
    assert_eq!(status.days_left, 365);
}

#[test]
fn test_ledger_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("billing").join("ledger.json");

    {
        let billing = Billing::open(&path).unwrap();
        billing.purchase(1, 2, PaymentMethod::Demo, NOW).unwrap();
        billing.purchase(1, 1, PaymentMethod::VnPay, NOW + 1).unwrap();
    }
    assert!(path.exists());

    let reopened = Billing::open(&path).unwrap();
    let status = reopened.status(1, NOW).unwrap();
    assert!(status.is_premium);
    assert_eq!(status.days_left, 90);

    let orders = reopened.orders_for(1, 10);
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[1].status, OrderStatus::Completed);

    reopened.cancel(1, NOW + 10).unwrap();
    let after_cancel = Billing::open(&path).unwrap();
    assert!(!after_cancel.status(1, NOW + 10).unwrap().is_premium);
    assert_eq!(after_cancel.orders_for(1, 10).len(), 3);
}

#[test]
fn test_corrupt_ledger_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(Billing::open(&path), Err(BillingError::Codec(_))));
}

#[test]
fn test_billing_gates_service_premium() {
    use game2048_core::{CoreError, Entitlements, GameService, MemoryScoreBook, MemorySessionStore};

    let billing = Billing::in_memory();
    assert!(!billing.is_premium_active(5));

    let service = GameService::with_seed(
        MemorySessionStore::new(),
        MemoryScoreBook::new(),
        billing,
        1,
    );
    service.start("s").unwrap();
    assert!(matches!(service.hint("s", 5), Err(CoreError::PremiumRequired)));

    service
        .entitlements()
        .purchase(5, 1, PaymentMethod::Demo, game2048_core::unix_now())
        .unwrap();
    assert!(service.hint("s", 5).is_ok());
}
