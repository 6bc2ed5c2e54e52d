use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{Duration, Months, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use super::{read, write};
use crate::charge::{Transaction, TransactionGateway, TransactionStatus};
use crate::client::GatewayResponse;
use crate::customer::{Customer, CustomerGateway};
use crate::error::GatewayError;
use crate::invoice::TransactionSearch;
use crate::options::Params;
use crate::payment::{CreditCard, PayPalAccount, PaymentMethod, PaymentMethodGateway};
use crate::subscription::{Discount, Plan, ProcessorSubscription, SubscriptionGateway};

type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The processor's well-known sandbox nonces.
pub mod nonces {
    /// Visa ending in 1881.
    pub const VALID: &str = "fake-valid-nonce";
    /// Visa ending in 1881.
    pub const VALID_VISA: &str = "fake-valid-visa-nonce";
    /// MasterCard ending in 4444.
    pub const VALID_MASTERCARD: &str = "fake-valid-mastercard-nonce";
    /// A PayPal account with a billing agreement.
    pub const PAYPAL_ACCOUNT: &str = "fake-paypal-billing-agreement-nonce";
    /// Card that fails verification.
    pub const DECLINED: &str = "fake-processor-declined-visa-nonce";
    /// Nonce that has already been used.
    pub const CONSUMED: &str = "fake-consumed-nonce";
}

/// Email on the PayPal account behind [`nonces::PAYPAL_ACCOUNT`].
const PAYPAL_EMAIL: &str = "payer@example.com";

/// A mock processor client implementing every gateway trait.
///
/// Sales between 2000.00 and 2999.99 are declined, as in the processor's
/// sandbox. Cloning shares state.
#[derive(Default, Clone)]
pub struct MockGateway {
    inner: Arc<MockGatewayInner>,
}

#[derive(Default)]
struct MockGatewayInner {
    counter: AtomicU64,
    unavailable: AtomicBool,
    customers: RwLock<HashMap<String, Customer>>,
    transactions: RwLock<HashMap<String, Transaction>>,
    subscriptions: RwLock<HashMap<String, ProcessorSubscription>>,
    plans: RwLock<HashMap<String, Plan>>,
    coupons: RwLock<HashMap<String, Decimal>>,
    requests: RwLock<Vec<(&'static str, Params)>>,
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plan.
    pub fn add_plan(&self, id: &str, price: Decimal, billing_frequency: u32) {
        write(&self.inner.plans).insert(
            id.to_string(),
            Plan {
                id: id.to_string(),
                price,
                billing_frequency,
            },
        );
    }

    /// Register a coupon (discount) usable by subscriptions.
    pub fn add_coupon(&self, id: &str, amount: Decimal) {
        write(&self.inner.coupons).insert(id.to_string(), amount);
    }

    /// Seed a transaction directly.
    pub fn add_transaction(&self, transaction: Transaction) {
        write(&self.inner.transactions).insert(transaction.id.clone(), transaction);
    }

    /// Mark a transaction as settled. Returns false if it does not exist.
    pub fn settle_transaction(&self, id: &str) -> bool {
        match write(&self.inner.transactions).get_mut(id) {
            Some(transaction) => {
                transaction.status = TransactionStatus::Settled;
                true
            }
            None => false,
        }
    }

    /// Make every call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Parameters of the most recent call to `operation` (e.g. `"sale"`).
    pub fn last_request(&self, operation: &str) -> Option<Params> {
        read(&self.inner.requests)
            .iter()
            .rev()
            .find(|(op, _)| *op == operation)
            .map(|(_, params)| params.clone())
    }

    /// Number of calls made to `operation`.
    pub fn request_count(&self, operation: &str) -> usize {
        read(&self.inner.requests)
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    pub fn customer(&self, id: &str) -> Option<Customer> {
        read(&self.inner.customers).get(id).cloned()
    }

    pub fn processor_subscription(&self, id: &str) -> Option<ProcessorSubscription> {
        read(&self.inner.subscriptions).get(id).cloned()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_mock_{}", prefix, self.inner.counter.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, operation: &'static str, params: &Params) -> GatewayResult<()> {
        self.check_available()?;
        write(&self.inner.requests).push((operation, params.clone()));
        Ok(())
    }

    fn check_available(&self) -> GatewayResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::transport("connection refused"));
        }
        Ok(())
    }

    /// Exchange a nonce for a payment method, as the vault would.
    fn vault(&self, nonce: &str, default: bool) -> std::result::Result<PaymentMethod, String> {
        let card = |card_type: &str, last_four: &str| {
            PaymentMethod::CreditCard(CreditCard {
                token: self.next_id("tok"),
                card_type: card_type.to_string(),
                last_four: last_four.to_string(),
                expiration_date: Some("12/2030".to_string()),
                default,
            })
        };

        match nonce {
            nonces::VALID | nonces::VALID_VISA => Ok(card("Visa", "1881")),
            nonces::VALID_MASTERCARD => Ok(card("MasterCard", "4444")),
            nonces::PAYPAL_ACCOUNT => Ok(PaymentMethod::PayPalAccount(PayPalAccount {
                token: self.next_id("tok"),
                email: PAYPAL_EMAIL.to_string(),
                default,
            })),
            nonces::DECLINED => Err("Do Not Honor".to_string()),
            nonces::CONSUMED => Err("Cannot use a payment_method_nonce more than once.".to_string()),
            _ => Err("Unknown payment_method_nonce.".to_string()),
        }
    }

    fn owner_of_token(&self, token: &str) -> Option<String> {
        read(&self.inner.customers)
            .values()
            .find(|c| c.payment_methods.iter().any(|m| m.token() == token))
            .map(|c| c.id.clone())
    }

    /// Apply `discounts.add` / `discounts.remove` to a subscription.
    fn apply_discounts(
        &self,
        subscription: &mut ProcessorSubscription,
        params: &Params,
    ) -> std::result::Result<(), String> {
        let Some(discounts) = params.get("discounts") else {
            return Ok(());
        };

        if let Some(remove) = discounts.get("remove").and_then(Value::as_array) {
            let remove: Vec<&str> = remove.iter().filter_map(Value::as_str).collect();
            subscription.discounts.retain(|d| !remove.contains(&d.id.as_str()));
        }

        if let Some(add) = discounts.get("add").and_then(Value::as_array) {
            let coupons = read(&self.inner.coupons);
            for entry in add {
                let id = entry
                    .get("inheritedFromId")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let Some(amount) = coupons.get(id) else {
                    return Err("Inherited From ID is invalid.".to_string());
                };
                subscription.discounts.push(Discount {
                    id: id.to_string(),
                    amount: *amount,
                });
            }
        }

        Ok(())
    }
}

fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn parse_amount(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

impl CustomerGateway for MockGateway {
    async fn find_customer(&self, customer_id: &str) -> GatewayResult<Customer> {
        self.check_available()?;
        self.customer(customer_id)
            .ok_or_else(|| GatewayError::not_found("Customer", customer_id))
    }

    async fn create_customer(&self, params: Params) -> GatewayResult<GatewayResponse<Customer>> {
        self.record("create_customer", &params)?;

        let payment_methods = match str_param(&params, "paymentMethodNonce") {
            Some(nonce) => match self.vault(nonce, true) {
                Ok(method) => vec![method],
                Err(message) => return Ok(GatewayResponse::failure(message)),
            },
            None => Vec::new(),
        };

        let customer = Customer {
            id: self.next_id("cus"),
            first_name: str_param(&params, "firstName").map(String::from),
            last_name: str_param(&params, "lastName").map(String::from),
            email: str_param(&params, "email").map(String::from),
            payment_methods,
        };

        write(&self.inner.customers).insert(customer.id.clone(), customer.clone());
        Ok(GatewayResponse::Success(customer))
    }
}

impl PaymentMethodGateway for MockGateway {
    async fn create_payment_method(
        &self,
        params: Params,
    ) -> GatewayResult<GatewayResponse<PaymentMethod>> {
        self.record("create_payment_method", &params)?;

        let customer_id = str_param(&params, "customerId").unwrap_or_default();
        let nonce = str_param(&params, "paymentMethodNonce").unwrap_or_default();
        let make_default = params
            .get("options")
            .and_then(|o| o.get("makeDefault"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut customers = write(&self.inner.customers);
        let Some(customer) = customers.get_mut(customer_id) else {
            return Ok(GatewayResponse::failure("Customer ID is invalid."));
        };

        let method = match self.vault(nonce, make_default) {
            Ok(method) => method,
            Err(message) => return Ok(GatewayResponse::failure(message)),
        };

        if make_default {
            for existing in &mut customer.payment_methods {
                match existing {
                    PaymentMethod::CreditCard(card) => card.default = false,
                    PaymentMethod::PayPalAccount(account) => account.default = false,
                }
            }
            customer.payment_methods.insert(0, method.clone());
        } else {
            customer.payment_methods.push(method.clone());
        }

        Ok(GatewayResponse::Success(method))
    }
}

impl TransactionGateway for MockGateway {
    async fn sale(&self, params: Params) -> GatewayResult<GatewayResponse<Transaction>> {
        self.record("sale", &params)?;

        let Some(amount) = parse_amount(params.get("amount")) else {
            return Ok(GatewayResponse::failure("Amount is an invalid format."));
        };
        if amount >= Decimal::from(2000) && amount < Decimal::from(3000) {
            return Ok(GatewayResponse::failure("Do Not Honor"));
        }

        let token = str_param(&params, "paymentMethodToken").unwrap_or_default();
        let Some(customer_id) = self.owner_of_token(token) else {
            return Ok(GatewayResponse::failure("Payment method token is invalid."));
        };

        let submit = params
            .get("options")
            .and_then(|o| o.get("submitForSettlement"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let custom_fields: HashMap<String, String> = params
            .get("customFields")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let transaction = Transaction {
            id: self.next_id("txn"),
            status: if submit {
                TransactionStatus::SubmittedForSettlement
            } else {
                TransactionStatus::Authorized
            },
            amount,
            tax_amount: parse_amount(params.get("taxAmount")),
            currency: "USD".to_string(),
            customer_id: Some(customer_id),
            subscription_id: None,
            payment_method_token: Some(token.to_string()),
            custom_fields,
            add_ons: Vec::new(),
            discounts: Vec::new(),
            created_at: Utc::now(),
        };

        self.add_transaction(transaction.clone());
        Ok(GatewayResponse::Success(transaction))
    }

    async fn find_transaction(&self, transaction_id: &str) -> GatewayResult<Transaction> {
        self.check_available()?;
        read(&self.inner.transactions)
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("Transaction", transaction_id))
    }

    async fn search_transactions(&self, search: &TransactionSearch) -> GatewayResult<Vec<Transaction>> {
        self.check_available()?;
        let mut found: Vec<Transaction> = read(&self.inner.transactions)
            .values()
            .filter(|t| search.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

impl SubscriptionGateway for MockGateway {
    async fn create_subscription(
        &self,
        params: Params,
    ) -> GatewayResult<GatewayResponse<ProcessorSubscription>> {
        self.record("create_subscription", &params)?;

        let plan_id = str_param(&params, "planId").unwrap_or_default();
        let Some(plan) = read(&self.inner.plans).get(plan_id).cloned() else {
            return Ok(GatewayResponse::failure("Plan ID is invalid."));
        };

        let token = str_param(&params, "paymentMethodToken").unwrap_or_default();
        if self.owner_of_token(token).is_none() {
            return Ok(GatewayResponse::failure("Payment method token is invalid."));
        }

        let now = Utc::now();
        let trial_ends_at = params
            .get("trialPeriod")
            .and_then(Value::as_bool)
            .filter(|on| *on)
            .and_then(|_| params.get("trialDuration").and_then(Value::as_i64))
            .map(|days| now + Duration::days(days));

        let mut subscription = ProcessorSubscription {
            id: self.next_id("sub"),
            plan_id: plan.id,
            status: "Active".to_string(),
            payment_method_token: token.to_string(),
            discounts: Vec::new(),
            paid_through_date: now.checked_add_months(Months::new(plan.billing_frequency)),
            trial_ends_at,
        };

        if let Err(message) = self.apply_discounts(&mut subscription, &params) {
            return Ok(GatewayResponse::failure(message));
        }

        write(&self.inner.subscriptions).insert(subscription.id.clone(), subscription.clone());
        Ok(GatewayResponse::Success(subscription))
    }

    async fn find_subscription(&self, subscription_id: &str) -> GatewayResult<ProcessorSubscription> {
        self.check_available()?;
        self.processor_subscription(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription", subscription_id))
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        params: Params,
    ) -> GatewayResult<GatewayResponse<ProcessorSubscription>> {
        self.record("update_subscription", &params)?;

        let Some(mut subscription) = self.processor_subscription(subscription_id) else {
            return Err(GatewayError::not_found("Subscription", subscription_id));
        };

        let changes_terms = params.contains_key("planId") || params.contains_key("discounts");
        if subscription.status == "Canceled" && changes_terms {
            return Ok(GatewayResponse::failure("Subscription has been canceled."));
        }

        if let Some(token) = str_param(&params, "paymentMethodToken") {
            if self.owner_of_token(token).is_none() {
                return Ok(GatewayResponse::failure("Payment method token is invalid."));
            }
            subscription.payment_method_token = token.to_string();
        }

        if let Some(plan_id) = str_param(&params, "planId") {
            if !read(&self.inner.plans).contains_key(plan_id) {
                return Ok(GatewayResponse::failure("Plan ID is invalid."));
            }
            subscription.plan_id = plan_id.to_string();
        }

        if let Err(message) = self.apply_discounts(&mut subscription, &params) {
            return Ok(GatewayResponse::failure(message));
        }

        write(&self.inner.subscriptions).insert(subscription.id.clone(), subscription.clone());
        Ok(GatewayResponse::Success(subscription))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> GatewayResult<GatewayResponse<ProcessorSubscription>> {
        self.record("cancel_subscription", &Params::new())?;

        let mut subscriptions = write(&self.inner.subscriptions);
        let Some(subscription) = subscriptions.get_mut(subscription_id) else {
            return Err(GatewayError::not_found("Subscription", subscription_id));
        };

        if subscription.status == "Canceled" {
            return Ok(GatewayResponse::failure("Subscription has already been canceled."));
        }

        subscription.status = "Canceled".to_string();
        Ok(GatewayResponse::Success(subscription.clone()))
    }

    async fn find_plan(&self, plan_id: &str) -> GatewayResult<Plan> {
        self.check_available()?;
        read(&self.inner.plans)
            .get(plan_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("Plan", plan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn params(value: Value) -> Params {
        crate::options::params(value)
    }

    #[tokio::test]
    async fn test_nonces() {
        let gateway = MockGateway::new();

        let ok = gateway
            .create_customer(params(json!({ "paymentMethodNonce": nonces::VALID_MASTERCARD })))
            .await
            .unwrap();
        let GatewayResponse::Success(customer) = ok else {
            panic!("expected success");
        };
        assert_eq!(customer.payment_methods[0].details().card_last_four.as_deref(), Some("4444"));

        let declined = gateway
            .create_customer(params(json!({ "paymentMethodNonce": nonces::DECLINED })))
            .await
            .unwrap();
        assert_eq!(declined, GatewayResponse::failure("Do Not Honor"));
    }

    #[tokio::test]
    async fn test_declined_sale_amount() {
        let gateway = MockGateway::new();
        let GatewayResponse::Success(customer) = gateway
            .create_customer(params(json!({ "paymentMethodNonce": nonces::VALID })))
            .await
            .unwrap()
        else {
            panic!("expected success");
        };
        let token = customer.payment_methods[0].token().to_string();

        let sale = gateway
            .sale(params(json!({ "amount": "2000.00", "paymentMethodToken": token })))
            .await
            .unwrap();
        assert!(!sale.is_success());

        let sale = gateway
            .sale(params(json!({ "amount": "10.00", "paymentMethodToken": token })))
            .await
            .unwrap();
        assert!(sale.is_success());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let gateway = MockGateway::new();
        gateway.add_plan("monthly", dec!(10), 1);
        gateway.set_unavailable(true);

        let err = gateway.find_plan("monthly").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));

        gateway.set_unavailable(false);
        assert!(gateway.find_plan("monthly").await.is_ok());
    }
}
