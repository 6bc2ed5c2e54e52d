//! Testing utilities for billing code.
//!
//! - [`InMemoryBillingStore`]: a [`BillingStore`](crate::BillingStore) backed by hash maps
//! - [`MockGateway`]: a processor client that understands the processor's
//!   well-known test nonces (see [`nonces`])
//! - [`TestBillable`]: a ready-made [`BillableEntity`](crate::BillableEntity)
//!
//! Compiled for this crate's own tests and with the `test-billing` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use tideway_cashier::testing::{InMemoryBillingStore, MockGateway, TestBillable, nonces};
//! use tideway_cashier::{Cashier, Params};
//!
//! #[tokio::test]
//! async fn test_subscribe() {
//!     let gateway = MockGateway::new();
//!     gateway.add_plan("monthly", dec!(10), 1);
//!     let cashier = Cashier::new(InMemoryBillingStore::new(), gateway);
//!
//!     let mut user = TestBillable::new();
//!     cashier.new_subscription("default", "monthly")
//!         .create(&mut user, Some(nonces::VALID_VISA), Params::new())
//!         .await
//!         .unwrap();
//!
//!     assert!(cashier.subscribed(&user, "default", None).await.unwrap());
//! }
//! ```

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

mod fixtures;
mod gateway;
mod store;

pub use fixtures::{TestBillable, fake};
pub use gateway::{MockGateway, nonces};
pub use store::InMemoryBillingStore;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
