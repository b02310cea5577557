#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payment_core::domain::command::{
    ExecutionTransition, PaymentConfirmCommand, PaymentStatusUpdate, PendingPayment, Product,
};
use payment_core::domain::execution::{
    PaymentExecutionResult, PaymentExtraDetails, PaymentMethod, PaymentType,
    PspConfirmationStatus, PspError,
};
use payment_core::domain::payment::{
    Amount, PaymentEvent, PaymentOrder, PaymentOrderHistory, PaymentStatus,
};
use payment_core::domain::ports::{PaymentExecution, PaymentStore};
use payment_core::error::{PaymentError, Result};
use payment_core::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryProductCatalog};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Behavior =
    Box<dyn Fn(&PaymentConfirmCommand) -> std::result::Result<PaymentExecutionResult, PspError> + Send + Sync>;

/// Scripted PSP that counts calls and tracks how many are in flight.
pub struct MockPsp {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPsp {
    pub fn new(
        behavior: impl Fn(&PaymentConfirmCommand) -> std::result::Result<PaymentExecutionResult, PspError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            behavior: Box::new(behavior),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn approving() -> Self {
        Self::new(|command| Ok(approved(command)))
    }

    pub fn failing_with(error: PspError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentExecution for MockPsp {
    async fn execute(
        &self,
        command: &PaymentConfirmCommand,
    ) -> std::result::Result<PaymentExecutionResult, PspError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.behavior)(command);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub const APPROVED_RAW: &str = r#"{"status":"DONE","method":"간편결제"}"#;

pub fn approved(command: &PaymentConfirmCommand) -> PaymentExecutionResult {
    PaymentExecutionResult::success(
        command.payment_key.clone(),
        command.order_id.clone(),
        PaymentExtraDetails {
            payment_type: PaymentType::Normal,
            method: PaymentMethod::EasyPay,
            total_amount: command.amount,
            order_name: "Keyboard, Mouse, Hub".to_string(),
            psp_confirmation_status: PspConfirmationStatus::Done,
            approved_at: Utc::now(),
            psp_raw_data: APPROVED_RAW.to_string(),
        },
    )
}

pub fn timeout() -> PspError {
    PspError::Timeout("read timed out".to_string())
}

/// Products 1, 2 and 3 priced 10000, 20000 and 30000.
pub fn catalog() -> InMemoryProductCatalog {
    InMemoryProductCatalog::new([
        product(1, "Keyboard", dec!(10000)),
        product(2, "Mouse", dec!(20000)),
        product(3, "Hub", dec!(30000)),
    ])
}

pub fn product(id: u64, name: &str, amount: Decimal) -> Product {
    Product {
        id,
        seller_id: id * 100,
        name: name.to_string(),
        amount: Amount::new(amount).unwrap(),
    }
}

/// A two-order event worth 30000 in total.
pub fn event(order_id: &str) -> PaymentEvent {
    let now = Utc::now();
    PaymentEvent::new(
        1,
        order_id,
        "Keyboard, Mouse",
        vec![
            PaymentOrder::new(100, 1, order_id, Amount::new(dec!(10000)).unwrap(), now),
            PaymentOrder::new(200, 2, order_id, Amount::new(dec!(20000)).unwrap(), now),
        ],
    )
}

pub fn unknown_update(order_id: &str, payment_key: &str) -> PaymentStatusUpdate {
    PaymentStatusUpdate::Unknown {
        payment_key: payment_key.to_string(),
        order_id: order_id.to_string(),
        failure: payment_core::domain::execution::PaymentFailure::new("TIMEOUT", "timed out"),
    }
}

/// Stores an event that a previous confirm attempt left `Unknown`.
pub async fn seed_unknown(store: &InMemoryPaymentStore, order_id: &str) {
    store.create_payment(event(order_id)).await.unwrap();
    store.transition_to_executing(order_id, "pk").await.unwrap();
    store
        .update_status(unknown_update(order_id, "pk"))
        .await
        .unwrap();
}

pub async fn statuses(store: &InMemoryPaymentStore, order_id: &str) -> Vec<PaymentStatus> {
    store
        .find_payment(order_id)
        .await
        .unwrap()
        .unwrap()
        .payment_orders
        .iter()
        .map(|order| order.status)
        .collect()
}

/// In-memory store whose status updates fail for one order id.
pub struct FailingUpdateStore {
    pub inner: InMemoryPaymentStore,
    pub failing_order_id: String,
}

#[async_trait]
impl PaymentStore for FailingUpdateStore {
    async fn create_payment(&self, event: PaymentEvent) -> Result<()> {
        self.inner.create_payment(event).await
    }

    async fn transition_to_executing(
        &self,
        order_id: &str,
        payment_key: &str,
    ) -> Result<ExecutionTransition> {
        self.inner.transition_to_executing(order_id, payment_key).await
    }

    async fn update_status(&self, update: PaymentStatusUpdate) -> Result<()> {
        if update.order_id() == self.failing_order_id {
            return Err(PaymentError::Storage("disk full".to_string()));
        }
        self.inner.update_status(update).await
    }

    async fn query_stale_or_unknown(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingPayment>> {
        self.inner.query_stale_or_unknown(now, limit).await
    }

    async fn find_payment(&self, order_id: &str) -> Result<Option<PaymentEvent>> {
        self.inner.find_payment(order_id).await
    }

    async fn order_history(&self, order_id: &str) -> Result<Vec<PaymentOrderHistory>> {
        self.inner.order_history(order_id).await
    }
}
