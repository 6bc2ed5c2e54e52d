//! Consolidated payment processor client types.
//!
//! Each concern keeps its own trait ([`CustomerGateway`], [`PaymentMethodGateway`],
//! [`TransactionGateway`], [`SubscriptionGateway`]); this module ties them
//! together and defines the response shape they share.

use crate::charge::TransactionGateway;
use crate::customer::CustomerGateway;
use crate::error::{CashierError, Result};
use crate::payment::PaymentMethodGateway;
use crate::subscription::SubscriptionGateway;

/// Outcome of a processor call that reached the processor.
///
/// A `Failure` means the processor answered and declined the operation;
/// transport problems are reported as [`GatewayError`](crate::GatewayError) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum GatewayResponse<T> {
    /// The processor performed the operation.
    Success(T),
    /// The processor refused, with its human-readable message.
    Failure { message: String },
}

impl<T> GatewayResponse<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Turn a refusal into the given error, carrying the processor message.
    pub fn into_result<F>(self, on_failure: F) -> Result<T>
    where
        F: FnOnce(String) -> CashierError,
    {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure { message } => {
                tracing::warn!(
                    message = %message,
                    "payment processor reported failure"
                );
                Err(on_failure(message))
            }
        }
    }
}

/// A type that implements all processor client traits.
///
/// Use this bound when an operation spans several concerns, e.g. creating a
/// subscription for a customer that does not exist yet.
pub trait PaymentGateway:
    CustomerGateway + PaymentMethodGateway + TransactionGateway + SubscriptionGateway
{
}

/// Blanket implementation for any type that implements all traits.
impl<T> PaymentGateway for T where
    T: CustomerGateway + PaymentMethodGateway + TransactionGateway + SubscriptionGateway
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        let ok: GatewayResponse<u32> = GatewayResponse::Success(7);
        assert!(ok.is_success());
        assert_eq!(ok.into_result(CashierError::ChargeFailed).unwrap(), 7);

        let refused: GatewayResponse<u32> = GatewayResponse::failure("Do Not Honor");
        assert!(!refused.is_success());
        let err = refused.into_result(CashierError::ChargeFailed).unwrap_err();
        assert!(matches!(err, CashierError::ChargeFailed(ref m) if m == "Do Not Honor"));
    }
}
