pub mod cart_snapshot;
pub mod checkout_service;
pub mod dto;
pub mod order_submitter;
pub mod payment_method_resolver;
pub mod price_calculator;
pub mod settlement_resumer;

#[cfg(test)]
pub(crate) mod test_support;

pub use cart_snapshot::CartSnapshot;
pub use checkout_service::{CheckoutService, CheckoutSettings};
pub use dto::*;
pub use order_submitter::{OrderDraft, OrderSubmitter, SettlementBranch, SubmitOutcome};
pub use payment_method_resolver::PaymentMethodResolver;
pub use price_calculator::{PriceCalculator, Recalculation};
pub use settlement_resumer::{
    CallbackKind, ChallengeOutcome, Reconciliation, SettlementResumer, SettlementVerdict,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Guards here only wrap plain data, so a poisoned lock is still usable
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
