//! Use cases driving the payment lifecycle.
//!
//! `CheckoutService` creates payments, `PaymentConfirmService` confirms them
//! against the PSP through the outcome `classifier`, and
//! `PaymentRecoveryService` periodically re-drives payments whose outcome
//! could not be determined.

pub mod checkout;
pub mod classifier;
pub mod confirm;
pub mod recovery;
