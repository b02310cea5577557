use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Normal,
    Billing,
    Brandpay,
}

/// Payment method as reported by the PSP.
///
/// The PSP reports methods by their localized display names, so those are
/// the serialized forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "카드")]
    Card,
    #[serde(rename = "가상계좌")]
    VirtualAccount,
    #[serde(rename = "간편결제")]
    EasyPay,
    #[serde(rename = "휴대폰")]
    MobilePhone,
    #[serde(rename = "계좌이체")]
    Transfer,
    #[serde(rename = "문화상품권")]
    CultureGiftCertificate,
    #[serde(rename = "도서문화상품권")]
    BookGiftCertificate,
    #[serde(rename = "게임문화상품권")]
    GameGiftCertificate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PspConfirmationStatus {
    Ready,
    InProgress,
    WaitingForDeposit,
    Done,
    Canceled,
    PartialCanceled,
    Aborted,
    Expired,
}

/// Details the PSP hands back for an approved payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentExtraDetails {
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub total_amount: Decimal,
    pub order_name: String,
    pub psp_confirmation_status: PspConfirmationStatus,
    pub approved_at: DateTime<Utc>,
    pub psp_raw_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub error_code: String,
    pub message: String,
}

impl PaymentFailure {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

/// What the PSP decided. Exactly one outcome exists per result.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(PaymentExtraDetails),
    Failure(PaymentFailure),
    Unknown(PaymentFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentExecutionResult {
    pub payment_key: String,
    pub order_id: String,
    pub outcome: ExecutionOutcome,
}

impl PaymentExecutionResult {
    pub fn success(
        payment_key: impl Into<String>,
        order_id: impl Into<String>,
        extra_details: PaymentExtraDetails,
    ) -> Self {
        Self {
            payment_key: payment_key.into(),
            order_id: order_id.into(),
            outcome: ExecutionOutcome::Success(extra_details),
        }
    }
}

/// Errors raised by a PSP call instead of a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PspError {
    /// The PSP definitively declined the payment.
    #[error("PSP rejected the payment ({code}): {message}")]
    Rejected { code: String, message: String },
    /// The PSP answered, but not in a way that settles the payment.
    #[error("PSP outcome is indeterminate ({code}): {message}")]
    Indeterminate {
        code: String,
        message: String,
        retryable: bool,
    },
    #[error("PSP call timed out: {0}")]
    Timeout(String),
    #[error("PSP network error: {0}")]
    Network(String),
}

impl PspError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { .. } => false,
            Self::Indeterminate { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            Self::Network(_) => false,
        }
    }
}
