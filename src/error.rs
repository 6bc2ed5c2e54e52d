//! Error types for billing operations.
//!
//! Processor-reported failures (the processor answered, but said no) are kept
//! apart from gateway errors (the processor could not be reached, or the
//! record does not exist) so callers can tell a declined card from an outage.

/// Errors raised by the payment processor client itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The processor has no record with the given identifier.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The request could not be delivered or the response could not be read.
    #[error("Payment processor transport error: {0}")]
    Transport(String),

    /// The request could not be built, or the processor rejected its shape.
    #[error("Invalid processor request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Check if this error means the record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The main error type for cashier operations.
#[derive(Debug, thiserror::Error)]
pub enum CashierError {
    #[error("Unable to perform a charge: {0}")]
    ChargeFailed(String),

    #[error("Unable to create payment method: {0}")]
    PaymentMethodCreationFailed(String),

    #[error("Unable to create customer: {0}")]
    CustomerCreationFailed(String),

    #[error("Unable to create subscription: {0}")]
    SubscriptionCreationFailed(String),

    #[error("Unable to update subscription: {0}")]
    SubscriptionUpdateFailed(String),

    #[error("Unable to apply coupon: {0}")]
    CouponApplicationFailed(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Subscription '{0}' does not exist")]
    InvalidSubscription(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CashierError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if the processor answered but reported the operation as unsuccessful.
    #[must_use]
    pub fn is_processor_failure(&self) -> bool {
        matches!(
            self,
            Self::ChargeFailed(_)
                | Self::PaymentMethodCreationFailed(_)
                | Self::CustomerCreationFailed(_)
                | Self::SubscriptionCreationFailed(_)
                | Self::SubscriptionUpdateFailed(_)
                | Self::CouponApplicationFailed(_)
        )
    }

    /// Check if this error means a requested record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::InvoiceNotFound(_) | Self::InvalidSubscription(_) => true,
            Self::Gateway(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for cashier operations.
pub type Result<T> = std::result::Result<T, CashierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CashierError::ChargeFailed("Insufficient Funds".to_string());
        assert_eq!(err.to_string(), "Unable to perform a charge: Insufficient Funds");

        let err = CashierError::InvalidSubscription("main".to_string());
        assert_eq!(err.to_string(), "Subscription 'main' does not exist");

        let err: CashierError = GatewayError::not_found("Customer", "cus_1").into();
        assert_eq!(err.to_string(), "Customer not found: cus_1");
    }

    #[test]
    fn test_error_classification() {
        let err = CashierError::CustomerCreationFailed("Do Not Honor".to_string());
        assert!(err.is_processor_failure());
        assert!(!err.is_not_found());

        let err: CashierError = GatewayError::transport("connection reset").into();
        assert!(!err.is_processor_failure());
        assert!(!err.is_not_found());

        let err = CashierError::InvoiceNotFound("txn_1".to_string());
        assert!(err.is_not_found());

        let err: CashierError = GatewayError::not_found("Transaction", "txn_2").into();
        assert!(err.is_not_found());
    }
}
