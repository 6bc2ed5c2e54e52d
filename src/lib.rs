//! Tideway Cashier - subscription billing for billable entities
//!
//! Cashier gives any user or organization type billing behavior on top of a
//! payment processor: one-off charges, subscriptions with trials and coupons,
//! invoices, payment method updates and customer provisioning. The processor
//! does the payment work; Cashier formats requests and keeps a handful of
//! returned fields on your records.
//!
//! # Features
//!
//! - **Subscriptions**: named subscriptions, trials, grace periods, plan swaps
//! - **Invoices**: settled (and optionally pending) transactions as invoices
//! - **Charges**: one-off charges with an overridable tax percentage
//! - **Payment methods**: card and PayPal updates propagated to subscriptions
//! - **Testing**: in-memory store and a mock processor client (`test-billing` feature)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tideway_cashier::{Cashier, CashierConfig, Params};
//!
//! tideway_cashier::init_tracing();
//!
//! let cashier = Cashier::new(store, gateway).with_config(CashierConfig::from_env()?);
//!
//! let mut user = load_user().await?;
//! cashier.new_subscription("default", "monthly")
//!     .trial_days(14)
//!     .create(&mut user, Some(&nonce), Params::new())
//!     .await?;
//!
//! for invoice in cashier.invoices(&user, false, vec![]).await? {
//!     println!("{} {}", invoice.date(), invoice.total());
//! }
//! ```

#![allow(async_fn_in_trait)]

mod audit;
mod builder;
mod cashier;
mod charge;
mod client;
mod config;
mod customer;
mod entity;
mod error;
mod invoice;
mod options;
mod payment;
mod storage;
mod subscription;
#[cfg(any(test, feature = "test-billing"))]
pub mod testing;
pub mod utils;

// Re-exports for public API
pub use audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger, TracingAuditLogger};
pub use builder::SubscriptionBuilder;
pub use cashier::Cashier;
pub use charge::{
    Adjustment, Transaction, TransactionGateway, TransactionStatus, apply_tax,
    format_processor_amount,
};
pub use client::{GatewayResponse, PaymentGateway};
pub use config::{CashierConfig, CashierConfigBuilder};
pub use customer::{Customer, CustomerGateway};
pub use entity::{BillableEntity, BillableUpdate, PaymentDetails, split_name};
pub use error::{CashierError, GatewayError, Result};
pub use invoice::{Invoice, SearchCriterion, TransactionSearch};
pub use options::{Params, merge_caller_wins, merge_defaults_win_recursive, params};
pub use payment::{CreditCard, PayPalAccount, PaymentMethod, PaymentMethodGateway};
pub use storage::BillingStore;
pub use subscription::{
    Discount, Plan, ProcessorSubscription, Subscription, SubscriptionGateway, SubscriptionStatus,
    any_on_plan, find_named,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "tideway_cashier=debug")
/// - `CASHIER_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
