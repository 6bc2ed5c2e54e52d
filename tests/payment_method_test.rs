use std::sync::{Arc, Mutex};

use rust_decimal_macros::dec;
use serde_json::json;
use tideway_cashier::testing::{InMemoryBillingStore, MockGateway, TestBillable, nonces};
use tideway_cashier::{
    BillableEntity, BillingAuditEvent, BillingAuditLogger, Cashier, CashierError,
    NoOpAuditLogger, PaymentDetails, Params, params,
};

type TestCashier = Cashier<InMemoryBillingStore, MockGateway, NoOpAuditLogger>;

fn gateway() -> MockGateway {
    let gateway = MockGateway::new();
    gateway.add_plan("monthly", dec!(10), 1);
    gateway
}

fn cashier() -> TestCashier {
    Cashier::new(InMemoryBillingStore::new(), gateway()).with_audit_logger(NoOpAuditLogger)
}

/// Audit logger that keeps every event.
#[derive(Clone, Default)]
struct RecordingAuditLogger {
    events: Arc<Mutex<Vec<BillingAuditEvent>>>,
}

impl RecordingAuditLogger {
    fn events(&self) -> Vec<BillingAuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl BillingAuditLogger for RecordingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn default_token(cashier: &TestCashier, user: &TestBillable) -> String {
    let customer = cashier.gateway().customer(user.processor_id().unwrap()).unwrap();
    customer.payment_methods[0].token().to_string()
}

// =============================================================================
// Customer provisioning
// =============================================================================

#[tokio::test]
async fn test_single_word_name() {
    let cashier = cashier();
    let mut user = TestBillable::new().with_name("Cher");

    let customer = cashier
        .create_as_processor_customer(&mut user, nonces::VALID, Params::new())
        .await
        .unwrap();

    assert_eq!(customer.first_name.as_deref(), Some("Cher"));
    assert!(customer.last_name.is_none());
}

#[tokio::test]
async fn test_extra_name_tokens_are_dropped() {
    let cashier = cashier();
    let mut user = TestBillable::new().with_name("Mary Jane Watson");

    cashier
        .create_as_processor_customer(&mut user, nonces::VALID, Params::new())
        .await
        .unwrap();

    let sent = cashier.gateway().last_request("create_customer").unwrap();
    assert_eq!(sent["firstName"], json!("Mary"));
    assert_eq!(sent["lastName"], json!("Jane"));
    assert_eq!(sent["email"], json!(user.email));
    assert_eq!(sent["paymentMethodNonce"], json!(nonces::VALID));
    assert_eq!(
        sent["customFields"],
        json!({ "billable_id": user.billable_id(), "billable_type": "user" })
    );
}

#[tokio::test]
async fn test_caller_customer_options_kept_when_not_colliding() {
    let cashier = cashier();
    let mut user = TestBillable::new().without_name();

    let options = params(json!({
        "company": "Laravel",
        "creditCard": { "billingAddress": { "postalCode": "94107" } },
        "customFields": { "billable_type": "team", "region": "eu" },
    }));
    cashier
        .create_as_processor_customer(&mut user, nonces::VALID, options)
        .await
        .unwrap();

    let sent = cashier.gateway().last_request("create_customer").unwrap();
    assert_eq!(sent["company"], json!("Laravel"));
    assert_eq!(sent["creditCard"]["billingAddress"]["postalCode"], json!("94107"));
    assert_eq!(sent["creditCard"]["options"]["verifyCard"], json!(true));
    assert_eq!(sent["firstName"], json!(null));
    assert_eq!(sent["customFields"]["billable_type"], json!("user"));
    assert_eq!(sent["customFields"]["region"], json!("eu"));
}

// =============================================================================
// Payment method updates
// =============================================================================

#[tokio::test]
async fn test_update_card_to_paypal_clears_card_fields() {
    let cashier = cashier();
    let mut user = TestBillable::new();
    cashier
        .create_as_processor_customer(&mut user, nonces::VALID_VISA, Params::new())
        .await
        .unwrap();
    assert_eq!(user.payment_details, PaymentDetails::card("Visa", "1881"));

    cashier.update_card(&mut user, nonces::PAYPAL_ACCOUNT).await.unwrap();

    assert!(user.payment_details.card_brand.is_none());
    assert!(user.payment_details.card_last_four.is_none());
    assert!(user.payment_details.paypal_email.is_some());

    let stored = cashier.store().billable(user.billable_id()).unwrap();
    assert_eq!(stored.payment_details, Some(user.payment_details.clone()));

    let sent = cashier.gateway().last_request("create_payment_method").unwrap();
    assert_eq!(sent["customerId"], json!(user.processor_id().unwrap()));
    assert_eq!(sent["paymentMethodNonce"], json!(nonces::PAYPAL_ACCOUNT));
    assert_eq!(sent["options"], json!({ "makeDefault": true, "verifyCard": true }));
}

#[tokio::test]
async fn test_update_card_moves_only_active_subscriptions() {
    let cashier = cashier();
    let mut user = TestBillable::new();

    let default = cashier
        .new_subscription("default", "monthly")
        .create(&mut user, Some(nonces::VALID_VISA), Params::new())
        .await
        .unwrap();
    let grace = cashier
        .new_subscription("grace", "monthly")
        .create(&mut user, None, Params::new())
        .await
        .unwrap();
    let ended = cashier
        .new_subscription("ended", "monthly")
        .create(&mut user, None, Params::new())
        .await
        .unwrap();
    cashier.cancel_subscription(&user, "grace").await.unwrap();
    cashier.cancel_subscription_now(&user, "ended").await.unwrap();
    let old_token = default_token(&cashier, &user);
    let before = cashier.gateway().request_count("update_subscription");

    cashier.update_card(&mut user, nonces::VALID_MASTERCARD).await.unwrap();

    let new_token = default_token(&cashier, &user);
    assert_ne!(new_token, old_token);
    assert_eq!(user.payment_details, PaymentDetails::card("MasterCard", "4444"));

    let gateway = cashier.gateway();
    assert_eq!(gateway.request_count("update_subscription") - before, 2);
    assert_eq!(gateway.processor_subscription(&default.processor_id).unwrap().payment_method_token, new_token);
    assert_eq!(gateway.processor_subscription(&grace.processor_id).unwrap().payment_method_token, new_token);
    assert_eq!(gateway.processor_subscription(&ended.processor_id).unwrap().payment_method_token, old_token);
}

#[tokio::test]
async fn test_update_card_declined() {
    let cashier = cashier();
    let mut user = TestBillable::new();
    cashier
        .create_as_processor_customer(&mut user, nonces::VALID_VISA, Params::new())
        .await
        .unwrap();

    let err = cashier.update_card(&mut user, nonces::DECLINED).await.unwrap_err();
    assert!(matches!(err, CashierError::PaymentMethodCreationFailed(ref m) if m == "Do Not Honor"));
    assert_eq!(user.payment_details, PaymentDetails::card("Visa", "1881"));
}

#[tokio::test]
async fn test_update_card_without_customer() {
    let cashier = cashier();
    let mut user = TestBillable::new();

    let err = cashier.update_card(&mut user, nonces::VALID).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(cashier.gateway().request_count("create_payment_method"), 0);
}

#[tokio::test]
async fn test_update_card_interrupted_local_write_leaves_store_stale() {
    let cashier = cashier();
    let mut user = TestBillable::new();
    let subscription = cashier
        .new_subscription("default", "monthly")
        .create(&mut user, Some(nonces::VALID_VISA), Params::new())
        .await
        .unwrap();
    let old_token = default_token(&cashier, &user);

    cashier.store().fail_billable_writes(true);
    let err = cashier.update_card(&mut user, nonces::VALID_MASTERCARD).await.unwrap_err();
    assert!(matches!(err, CashierError::Store(_)));

    // The processor has the new default, the stored record still has the old card.
    assert_ne!(default_token(&cashier, &user), old_token);
    let stored = cashier.store().billable(user.billable_id()).unwrap();
    assert_eq!(stored.payment_details, Some(PaymentDetails::card("Visa", "1881")));
    assert_eq!(
        cashier.gateway().processor_subscription(&subscription.processor_id).unwrap().payment_method_token,
        old_token
    );
}

// =============================================================================
// Audit
// =============================================================================

#[tokio::test]
async fn test_audit_events() {
    let audit = RecordingAuditLogger::default();
    let cashier = Cashier::new(InMemoryBillingStore::new(), gateway()).with_audit_logger(audit.clone());
    let mut user = TestBillable::new();

    cashier
        .new_subscription("default", "monthly")
        .create(&mut user, Some(nonces::VALID_VISA), Params::new())
        .await
        .unwrap();
    cashier.update_card(&mut user, nonces::VALID_MASTERCARD).await.unwrap();
    cashier.charge(&user, dec!(5), Params::new()).await.unwrap();
    // Refusals are not audited.
    assert!(cashier.charge(&user, dec!(2100), Params::new()).await.is_err());

    let events = audit.events();
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], BillingAuditEvent::CustomerCreated { .. }));
    assert!(matches!(events[1], BillingAuditEvent::SubscriptionCreated { ref plan_id, .. } if plan_id == "monthly"));
    assert!(matches!(events[2], BillingAuditEvent::PaymentMethodUpdated { subscriptions_updated: 1, .. }));
    assert!(matches!(events[3], BillingAuditEvent::ChargeSucceeded { .. }));
}
