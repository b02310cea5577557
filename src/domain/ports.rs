use super::command::{ExecutionTransition, PaymentConfirmCommand, PaymentStatusUpdate, PendingPayment, Product};
use super::execution::{PaymentExecutionResult, PspError};
use super::payment::{PaymentEvent, PaymentOrderHistory};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Durable storage of payment aggregates.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the event and all of its orders atomically.
    ///
    /// Fails with `PaymentError::DuplicateCheckout` if the order id exists.
    async fn create_payment(&self, event: PaymentEvent) -> Result<()>;

    /// Compare-and-set of every order of `order_id` into `Executing`.
    async fn transition_to_executing(
        &self,
        order_id: &str,
        payment_key: &str,
    ) -> Result<ExecutionTransition>;

    async fn update_status(&self, update: PaymentStatusUpdate) -> Result<()>;

    /// Payments left `Unknown`, or `Executing` past the staleness window,
    /// that still have retries left. At most `limit` are returned.
    async fn query_stale_or_unknown(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingPayment>>;

    async fn find_payment(&self, order_id: &str) -> Result<Option<PaymentEvent>>;

    async fn order_history(&self, order_id: &str) -> Result<Vec<PaymentOrderHistory>>;
}

#[async_trait]
pub trait PaymentValidation: Send + Sync {
    async fn is_amount_valid(&self, order_id: &str, amount: Decimal) -> Result<bool>;
}

/// Confirms a payment against the PSP.
#[async_trait]
pub trait PaymentExecution: Send + Sync {
    async fn execute(
        &self,
        command: &PaymentConfirmCommand,
    ) -> std::result::Result<PaymentExecutionResult, PspError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_products(&self, cart_id: u64, product_ids: &[u64]) -> Result<Vec<Product>>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type PaymentValidationRef = Arc<dyn PaymentValidation>;
pub type PaymentExecutionRef = Arc<dyn PaymentExecution>;
pub type ProductCatalogRef = Arc<dyn ProductCatalog>;
