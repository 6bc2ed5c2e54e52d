//! Audit logging for billing operations.
//!
//! Every successful processor mutation emits one [`BillingAuditEvent`].
//! Processor-reported failures are returned to the caller, not audited.

use std::fmt;

use rust_decimal::Decimal;

/// Audit event types for billing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAuditEvent {
    /// Processor customer created.
    CustomerCreated {
        billable_id: String,
        customer_id: String,
    },
    /// One-off charge submitted for settlement.
    ChargeSucceeded {
        billable_id: String,
        transaction_id: String,
        amount: Decimal,
    },
    /// Default payment method replaced.
    PaymentMethodUpdated {
        billable_id: String,
        token: String,
        subscriptions_updated: usize,
    },
    /// Coupon applied to a subscription.
    CouponApplied {
        billable_id: String,
        subscription_id: String,
        coupon: String,
    },
    /// Subscription created.
    SubscriptionCreated {
        billable_id: String,
        subscription_id: String,
        plan_id: String,
    },
    /// Subscription moved to another plan.
    SubscriptionSwapped {
        billable_id: String,
        subscription_id: String,
        from_plan: String,
        to_plan: String,
    },
    /// Subscription cancelled.
    SubscriptionCancelled {
        billable_id: String,
        subscription_id: String,
        immediate: bool,
    },
}

impl fmt::Display for BillingAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomerCreated { billable_id, customer_id } => {
                write!(f, "Customer created: billable={}, customer={}", billable_id, customer_id)
            }
            Self::ChargeSucceeded { billable_id, transaction_id, amount } => {
                write!(f, "Charge succeeded: billable={}, transaction={}, amount={}", billable_id, transaction_id, amount)
            }
            Self::PaymentMethodUpdated { billable_id, token, subscriptions_updated } => {
                write!(f, "Payment method updated: billable={}, token={}, subscriptions={}", billable_id, token, subscriptions_updated)
            }
            Self::CouponApplied { billable_id, subscription_id, coupon } => {
                write!(f, "Coupon applied: billable={}, sub={}, coupon={}", billable_id, subscription_id, coupon)
            }
            Self::SubscriptionCreated { billable_id, subscription_id, plan_id } => {
                write!(f, "Subscription created: billable={}, sub={}, plan={}", billable_id, subscription_id, plan_id)
            }
            Self::SubscriptionSwapped { billable_id, subscription_id, from_plan, to_plan } => {
                write!(f, "Subscription swapped: billable={}, sub={}, from={}, to={}", billable_id, subscription_id, from_plan, to_plan)
            }
            Self::SubscriptionCancelled { billable_id, subscription_id, immediate } => {
                write!(f, "Subscription cancelled: billable={}, sub={}, immediate={}", billable_id, subscription_id, immediate)
            }
        }
    }
}

/// Trait for audit logging backends.
///
/// Implement this trait to integrate with your logging system (e.g., database,
/// external service, file-based logging).
#[allow(async_fn_in_trait)]
pub trait BillingAuditLogger: Send + Sync {
    /// Log a billing audit event.
    ///
    /// Implementations should handle their own failures; billing operations
    /// do not wait on or react to audit outcomes.
    async fn log(&self, event: BillingAuditEvent);
}

/// No-op audit logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

impl BillingAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: BillingAuditEvent) {}
}

/// Tracing-based audit logger.
///
/// Logs audit events using the `tracing` crate at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl BillingAuditLogger for TracingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        tracing::info!(
            target: "billing::audit",
            event_type = %event_kind(&event),
            "{}", event
        );
    }
}

/// Get the event kind as a string for structured logging.
fn event_kind(event: &BillingAuditEvent) -> &'static str {
    match event {
        BillingAuditEvent::CustomerCreated { .. } => "customer_created",
        BillingAuditEvent::ChargeSucceeded { .. } => "charge_succeeded",
        BillingAuditEvent::PaymentMethodUpdated { .. } => "payment_method_updated",
        BillingAuditEvent::CouponApplied { .. } => "coupon_applied",
        BillingAuditEvent::SubscriptionCreated { .. } => "subscription_created",
        BillingAuditEvent::SubscriptionSwapped { .. } => "subscription_swapped",
        BillingAuditEvent::SubscriptionCancelled { .. } => "subscription_cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_noop_logger() {
        let logger = NoOpAuditLogger;
        logger.log(BillingAuditEvent::CustomerCreated {
            billable_id: "user_1".to_string(),
            customer_id: "cus_1".to_string(),
        }).await;
    }

    #[test]
    fn test_event_display() {
        let event = BillingAuditEvent::ChargeSucceeded {
            billable_id: "user_1".to_string(),
            transaction_id: "txn_9".to_string(),
            amount: dec!(12.50),
        };
        let display = event.to_string();
        assert!(display.contains("user_1"));
        assert!(display.contains("txn_9"));
        assert!(display.contains("12.50"));
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(event_kind(&BillingAuditEvent::CouponApplied {
            billable_id: String::new(),
            subscription_id: String::new(),
            coupon: String::new(),
        }), "coupon_applied");

        assert_eq!(event_kind(&BillingAuditEvent::SubscriptionCancelled {
            billable_id: String::new(),
            subscription_id: String::new(),
            immediate: true,
        }), "subscription_cancelled");
    }
}
