//! The billing facade.
//!
//! [`Cashier`] owns the store, the processor client, the configuration and the
//! audit logger. Operations are grouped by concern in their own modules
//! ([`subscription`](crate::subscription), [`invoice`](crate::invoice),
//! [`charge`](crate::charge), [`payment`](crate::payment),
//! [`customer`](crate::customer)) as `impl Cashier` blocks bounded by the
//! processor traits each concern needs.

use crate::audit::{BillingAuditLogger, TracingAuditLogger};
use crate::config::CashierConfig;
use crate::storage::BillingStore;

/// Billing operations for any [`BillableEntity`](crate::BillableEntity).
///
/// # Example
///
/// ```rust,ignore
/// use tideway_cashier::{Cashier, CashierConfig, Params};
///
/// let cashier = Cashier::new(store, gateway)
///     .with_config(CashierConfig::from_env()?);
///
/// if !cashier.subscribed(&user, "default", None).await? {
///     cashier.new_subscription("default", "monthly")
///         .trial_days(14)
///         .create(&mut user, Some(nonce), Params::new())
///         .await?;
/// }
/// ```
pub struct Cashier<S, G, A = TracingAuditLogger> {
    pub(crate) store: S,
    pub(crate) gateway: G,
    pub(crate) config: CashierConfig,
    pub(crate) audit: A,
}

impl<S, G> Cashier<S, G, TracingAuditLogger>
where
    S: BillingStore,
{
    /// Create a new cashier with default configuration and tracing audit logs.
    #[must_use]
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            store,
            gateway,
            config: CashierConfig::default(),
            audit: TracingAuditLogger,
        }
    }
}

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    A: BillingAuditLogger,
{
    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CashierConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the audit logger.
    #[must_use]
    pub fn with_audit_logger<L: BillingAuditLogger>(self, audit: L) -> Cashier<S, G, L> {
        Cashier {
            store: self.store,
            gateway: self.gateway,
            config: self.config,
            audit,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CashierConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The underlying processor client.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}
