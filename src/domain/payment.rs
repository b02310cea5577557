use super::command::{PaymentStatusUpdate, PendingPayment, PendingPaymentOrder};
use super::execution::{PaymentFailure, PaymentMethod, PaymentType, PspConfirmationStatus};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Default number of unsuccessful attempts before the recovery sweep gives up.
pub const DEFAULT_RETRY_THRESHOLD: u8 = 5;

/// A strictly positive monetary amount quoted by the product catalog.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidCheckout(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Sum<Amount> for Decimal {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Decimal::ZERO, |acc, amount| acc + amount.0)
    }
}

/// Lifecycle of a payment order.
///
/// Variants are ordered by lifecycle, not by severity. `Unknown` leaves the
/// happy path but stays eligible for recovery; `Success` and `Failure` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    NotStarted,
    Executing,
    Success,
    Failure,
    Unknown,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Executing => "EXECUTING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One line of a checkout: what a single seller is owed for a single product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub seller_id: u64,
    pub product_id: u64,
    pub order_id: String,
    amount: Amount,
    pub status: PaymentStatus,
    /// Unsuccessful confirm attempts so far.
    pub fail_count: u8,
    /// Attempts allowed before recovery stops picking this order up.
    pub threshold: u8,
    pub ledger_updated: bool,
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    pub fn new(
        seller_id: u64,
        product_id: u64,
        order_id: impl Into<String>,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            seller_id,
            product_id,
            order_id: order_id.into(),
            amount,
            status: PaymentStatus::NotStarted,
            fail_count: 0,
            threshold: DEFAULT_RETRY_THRESHOLD,
            ledger_updated: false,
            updated_at: now,
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn is_ledger_updated(&self) -> bool {
        self.ledger_updated
    }

    pub fn has_retries_left(&self) -> bool {
        self.fail_count < self.threshold
    }

    /// Whether recovery should re-drive this order.
    ///
    /// `stale_before` is the cutoff for `Executing` orders: anything updated at
    /// or before it is presumed abandoned by a crashed confirm attempt.
    pub fn is_recovery_candidate(&self, stale_before: DateTime<Utc>) -> bool {
        let stuck = match self.status {
            PaymentStatus::Unknown => true,
            PaymentStatus::Executing => self.updated_at <= stale_before,
            _ => false,
        };
        stuck && self.has_retries_left()
    }
}

/// A single recorded status change of a payment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrderHistory {
    pub order_id: String,
    pub product_id: u64,
    pub previous_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

/// Result of attempting the `Executing` transition on an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Orders moved to `Executing`; the history rows must be persisted with them.
    Applied(Vec<PaymentOrderHistory>),
    /// Orders were left untouched because they are settled or already in flight.
    Rejected(PaymentStatus),
}

/// Aggregate root created once per checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub buyer_id: u64,
    /// Globally unique; doubles as the checkout idempotency key.
    pub order_id: String,
    pub order_name: String,
    pub payment_key: Option<String>,
    pub payment_type: Option<PaymentType>,
    pub payment_method: Option<PaymentMethod>,
    pub approved_at: Option<DateTime<Utc>>,
    pub psp_confirmation_status: Option<PspConfirmationStatus>,
    /// Total the PSP approved, as it reported it.
    pub psp_total_amount: Option<Decimal>,
    /// Unparsed PSP confirm response, kept for reconciliation.
    pub psp_raw_data: Option<String>,
    /// Detail of the latest unsuccessful attempt. Cleared on success.
    pub failure: Option<PaymentFailure>,
    pub payment_orders: Vec<PaymentOrder>,
}

impl PaymentEvent {
    pub fn new(
        buyer_id: u64,
        order_id: impl Into<String>,
        order_name: impl Into<String>,
        payment_orders: Vec<PaymentOrder>,
    ) -> Self {
        Self {
            buyer_id,
            order_id: order_id.into(),
            order_name: order_name.into(),
            payment_key: None,
            payment_type: None,
            payment_method: None,
            approved_at: None,
            psp_confirmation_status: None,
            psp_total_amount: None,
            psp_raw_data: None,
            failure: None,
            payment_orders,
        }
    }

    pub fn total_amount(&self) -> Decimal {
        self.payment_orders.iter().map(PaymentOrder::amount).sum()
    }

    pub fn is_payment_done(&self) -> bool {
        !self.payment_orders.is_empty()
            && self
                .payment_orders
                .iter()
                .all(|order| order.status.is_terminal())
    }

    /// The status to report for the event as a whole.
    ///
    /// A settled order wins over anything else, since orders of one event are
    /// always moved together.
    pub fn status(&self) -> PaymentStatus {
        self.payment_orders
            .iter()
            .map(|order| order.status)
            .find(|status| status.is_terminal())
            .or_else(|| self.payment_orders.first().map(|order| order.status))
            .unwrap_or(PaymentStatus::NotStarted)
    }

    /// Moves every order to `Executing` and records the PSP payment key.
    ///
    /// Settled orders reject the transition with their stored status. An
    /// `Executing` order updated after `stale_before` is still owned by a live
    /// attempt and rejects with `Executing`; a stale one is taken over unless
    /// its retry budget is spent. Orders out of retries reject with their
    /// stored status.
    pub fn begin_execution(
        &mut self,
        payment_key: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Transition {
        if let Some(settled) = self
            .payment_orders
            .iter()
            .find(|order| order.status.is_terminal())
        {
            return Transition::Rejected(settled.status);
        }
        if self
            .payment_orders
            .iter()
            .any(|order| order.status == PaymentStatus::Executing && order.updated_at > stale_before)
        {
            return Transition::Rejected(PaymentStatus::Executing);
        }
        if let Some(exhausted) = self
            .payment_orders
            .iter()
            .find(|order| !order.has_retries_left())
        {
            return Transition::Rejected(exhausted.status);
        }

        self.payment_key = Some(payment_key.to_string());
        let history = self
            .payment_orders
            .iter_mut()
            .map(|order| {
                let previous_status = order.status;
                order.status = PaymentStatus::Executing;
                order.updated_at = now;
                PaymentOrderHistory {
                    order_id: order.order_id.clone(),
                    product_id: order.product_id,
                    previous_status,
                    new_status: PaymentStatus::Executing,
                    reason: "PAYMENT_CONFIRMATION_START".to_string(),
                    changed_at: now,
                }
            })
            .collect();
        Transition::Applied(history)
    }

    /// Applies a final (or `Unknown`) outcome to every unsettled order.
    ///
    /// Non-success outcomes count as a failed attempt. Orders that are already
    /// settled are left as they are and produce no history.
    pub fn apply_update(
        &mut self,
        update: &PaymentStatusUpdate,
        now: DateTime<Utc>,
    ) -> Vec<PaymentOrderHistory> {
        if self.is_payment_done() {
            return Vec::new();
        }
        let new_status = update.status();
        let reason = update.reason();

        if let PaymentStatusUpdate::Success { extra_details, .. } = update {
            self.payment_type = Some(extra_details.payment_type);
            self.payment_method = Some(extra_details.method);
            self.approved_at = Some(extra_details.approved_at);
            self.order_name = extra_details.order_name.clone();
            self.psp_confirmation_status = Some(extra_details.psp_confirmation_status);
            self.psp_total_amount = Some(extra_details.total_amount);
            self.psp_raw_data = Some(extra_details.psp_raw_data.clone());
        }
        self.failure = update.failure().cloned();
        self.payment_key = Some(update.payment_key().to_string());

        self.payment_orders
            .iter_mut()
            .filter(|order| !order.status.is_terminal())
            .map(|order| {
                let previous_status = order.status;
                order.status = new_status;
                order.updated_at = now;
                if new_status != PaymentStatus::Success {
                    order.fail_count = order.fail_count.saturating_add(1);
                }
                PaymentOrderHistory {
                    order_id: order.order_id.clone(),
                    product_id: order.product_id,
                    previous_status,
                    new_status,
                    reason: reason.clone(),
                    changed_at: now,
                }
            })
            .collect()
    }

    /// Builds the recovery view of this event, if any of its orders qualify.
    pub fn to_pending(&self, stale_before: DateTime<Utc>) -> Option<PendingPayment> {
        let payment_key = self.payment_key.clone()?;
        let orders: Vec<PendingPaymentOrder> = self
            .payment_orders
            .iter()
            .filter(|order| order.is_recovery_candidate(stale_before))
            .map(|order| PendingPaymentOrder {
                product_id: order.product_id,
                status: order.status,
                amount: order.amount(),
                fail_count: order.fail_count,
                threshold: order.threshold,
            })
            .collect();

        if orders.is_empty() {
            return None;
        }
        Some(PendingPayment {
            order_id: self.order_id.clone(),
            payment_key,
            orders,
        })
    }
}
