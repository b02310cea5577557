use super::execution::{PaymentExtraDetails, PaymentFailure};
use super::payment::{Amount, PaymentStatus};
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Deterministic idempotency key for a checkout.
///
/// The same caller seed always yields the same key, so a resubmitted checkout
/// collides with the first one in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn from_seed(seed: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdempotencyKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A product with its authoritative seller and price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub seller_id: u64,
    pub name: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCommand {
    pub cart_id: u64,
    pub buyer_id: u64,
    pub product_ids: Vec<u64>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResult {
    pub order_id: String,
    pub order_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentConfirmCommand {
    pub payment_key: String,
    pub order_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentConfirmationResult {
    pub status: PaymentStatus,
    pub failure: Option<PaymentFailure>,
}

/// Outcome of the storage-level compare-and-set into `Executing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTransition {
    Started,
    /// The orders are settled, or owned by another live attempt.
    AlreadyProcessed {
        status: PaymentStatus,
        payment_key: Option<String>,
    },
}

/// A status change to persist once a confirm attempt has an outcome.
///
/// Only settled or unknown outcomes can be expressed, and each carries the
/// payload its status requires.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentStatusUpdate {
    Success {
        payment_key: String,
        order_id: String,
        extra_details: PaymentExtraDetails,
    },
    Failure {
        payment_key: String,
        order_id: String,
        failure: PaymentFailure,
    },
    Unknown {
        payment_key: String,
        order_id: String,
        failure: PaymentFailure,
    },
}

impl PaymentStatusUpdate {
    /// Builds an update from a status and optional parts, rejecting
    /// combinations the variants cannot represent.
    pub fn try_new(
        payment_key: impl Into<String>,
        order_id: impl Into<String>,
        status: PaymentStatus,
        extra_details: Option<PaymentExtraDetails>,
        failure: Option<PaymentFailure>,
    ) -> Result<Self, PaymentError> {
        let payment_key = payment_key.into();
        let order_id = order_id.into();
        match (status, extra_details, failure) {
            (PaymentStatus::Success, Some(extra_details), _) => Ok(Self::Success {
                payment_key,
                order_id,
                extra_details,
            }),
            (PaymentStatus::Success, None, _) => Err(PaymentError::ContractViolation(
                "extra details are required for a SUCCESS update".to_string(),
            )),
            (PaymentStatus::Failure, _, Some(failure)) => Ok(Self::Failure {
                payment_key,
                order_id,
                failure,
            }),
            (PaymentStatus::Failure, _, None) => Err(PaymentError::ContractViolation(
                "failure detail is required for a FAILURE update".to_string(),
            )),
            (PaymentStatus::Unknown, _, failure) => Ok(Self::Unknown {
                payment_key,
                order_id,
                failure: failure.unwrap_or_else(|| PaymentFailure::new("UNKNOWN", "UNKNOWN")),
            }),
            (status, _, _) => Err(PaymentError::ContractViolation(format!(
                "{status} is not a valid status update target"
            ))),
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            Self::Success { .. } => PaymentStatus::Success,
            Self::Failure { .. } => PaymentStatus::Failure,
            Self::Unknown { .. } => PaymentStatus::Unknown,
        }
    }

    pub fn payment_key(&self) -> &str {
        match self {
            Self::Success { payment_key, .. }
            | Self::Failure { payment_key, .. }
            | Self::Unknown { payment_key, .. } => payment_key,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            Self::Success { order_id, .. }
            | Self::Failure { order_id, .. }
            | Self::Unknown { order_id, .. } => order_id,
        }
    }

    pub fn failure(&self) -> Option<&PaymentFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { failure, .. } | Self::Unknown { failure, .. } => Some(failure),
        }
    }

    pub fn extra_details(&self) -> Option<&PaymentExtraDetails> {
        match self {
            Self::Success { extra_details, .. } => Some(extra_details),
            _ => None,
        }
    }

    /// History reason recorded alongside the status change.
    pub fn reason(&self) -> String {
        match self.failure() {
            None => "PAYMENT_CONFIRMATION_DONE".to_string(),
            Some(failure) => format!("{}: {}", failure.error_code, failure.message),
        }
    }
}

/// Why a confirm attempt did not reach a PSP success.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfirmError {
    #[error("payment is already processed with status {status}: {message}")]
    AlreadyProcessed {
        status: PaymentStatus,
        message: String,
    },
    #[error("payment validation failed ({rule}): {message}")]
    ValidationFailed { rule: String, message: String },
    #[error("PSP rejected the payment ({code}): {message}")]
    PspRejected { code: String, message: String },
    #[error("payment outcome is indeterminate ({code}): {message}")]
    Indeterminate { code: String, message: String },
}

impl From<super::execution::PspError> for ConfirmError {
    fn from(error: super::execution::PspError) -> Self {
        use super::execution::PspError;
        match error {
            PspError::Rejected { code, message } => Self::PspRejected { code, message },
            PspError::Indeterminate { code, message, .. } => Self::Indeterminate { code, message },
            PspError::Timeout(message) => Self::Indeterminate {
                code: "TIMEOUT".to_string(),
                message,
            },
            PspError::Network(message) => Self::Indeterminate {
                code: "NETWORK_ERROR".to_string(),
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPaymentOrder {
    pub product_id: u64,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub fail_count: u8,
    pub threshold: u8,
}

/// A payment the recovery sweep should re-drive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPayment {
    pub order_id: String,
    pub payment_key: String,
    pub orders: Vec<PendingPaymentOrder>,
}

impl PendingPayment {
    pub fn total_amount(&self) -> Decimal {
        self.orders.iter().map(|order| order.amount).sum()
    }

    pub fn to_confirm_command(&self) -> PaymentConfirmCommand {
        PaymentConfirmCommand {
            payment_key: self.payment_key.clone(),
            order_id: self.order_id.clone(),
            amount: self.total_amount(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::PspError;

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let a = IdempotencyKey::from_seed("cart-1:buyer-1");
        let b = IdempotencyKey::from_seed("cart-1:buyer-1");
        let c = IdempotencyKey::from_seed("cart-2:buyer-1");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_success_update_requires_extra_details() {
        let result = PaymentStatusUpdate::try_new("pk", "order", PaymentStatus::Success, None, None);
        assert!(matches!(result, Err(PaymentError::ContractViolation(_))));
    }

    #[test]
    fn test_failure_update_requires_failure_detail() {
        let result = PaymentStatusUpdate::try_new("pk", "order", PaymentStatus::Failure, None, None);
        assert!(matches!(result, Err(PaymentError::ContractViolation(_))));

        let ok = PaymentStatusUpdate::try_new(
            "pk",
            "order",
            PaymentStatus::Failure,
            None,
            Some(PaymentFailure::new("REJECT_CARD_PAYMENT", "declined")),
        )
        .unwrap();
        assert_eq!(ok.status(), PaymentStatus::Failure);
    }

    #[test]
    fn test_lifecycle_states_are_not_update_targets() {
        for status in [PaymentStatus::NotStarted, PaymentStatus::Executing] {
            let result = PaymentStatusUpdate::try_new(
                "pk",
                "order",
                status,
                None,
                Some(PaymentFailure::new("X", "Y")),
            );
            assert!(matches!(result, Err(PaymentError::ContractViolation(_))));
        }
    }

    #[test]
    fn test_psp_errors_map_to_confirm_errors() {
        let rejected: ConfirmError = PspError::Rejected {
            code: "REJECT_CARD_PAYMENT".into(),
            message: "limit exceeded".into(),
        }
        .into();
        assert!(matches!(rejected, ConfirmError::PspRejected { .. }));

        let timeout: ConfirmError = PspError::Timeout("30s elapsed".into()).into();
        assert!(matches!(
            timeout,
            ConfirmError::Indeterminate { ref code, .. } if code == "TIMEOUT"
        ));
    }
}
