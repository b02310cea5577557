use crate::domain::command::{ExecutionTransition, PaymentStatusUpdate, PendingPayment, Product};
use crate::domain::payment::{PaymentEvent, PaymentOrderHistory, Transition};
use crate::domain::ports::{PaymentStore, PaymentValidation, ProductCatalog};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default age after which an `Executing` payment is presumed abandoned.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(180);

#[derive(Default)]
struct Tables {
    events: HashMap<String, PaymentEvent>,
    histories: HashMap<String, Vec<PaymentOrderHistory>>,
}

/// A thread-safe in-memory payment store.
///
/// Every mutation happens under one write lock, which makes the `Executing`
/// transition a compare-and-set and keeps events and their history in step.
/// Clones share the same tables.
#[derive(Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<Tables>>,
    staleness_window: TimeDelta,
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self {
            tables: Arc::default(),
            staleness_window: staleness(DEFAULT_STALENESS_WINDOW),
        }
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = staleness(window);
        self
    }

    /// Overwrites a stored event as is. Meant for seeding fixtures.
    pub async fn put_event(&self, event: PaymentEvent) {
        let mut tables = self.tables.write().await;
        tables.events.insert(event.order_id.clone(), event);
    }
}

pub(crate) fn staleness(window: Duration) -> TimeDelta {
    TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX)
}

pub(crate) fn stale_cutoff(now: DateTime<Utc>, window: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, event: PaymentEvent) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.order_id) {
            return Err(PaymentError::DuplicateCheckout(event.order_id));
        }
        tables.histories.insert(event.order_id.clone(), Vec::new());
        tables.events.insert(event.order_id.clone(), event);
        Ok(())
    }

    async fn transition_to_executing(
        &self,
        order_id: &str,
        payment_key: &str,
    ) -> Result<ExecutionTransition> {
        let now = Utc::now();
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let event = tables
            .events
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::PaymentNotFound(order_id.to_string()))?;

        match event.begin_execution(payment_key, now, stale_cutoff(now, self.staleness_window)) {
            Transition::Applied(history) => {
                tables
                    .histories
                    .entry(order_id.to_string())
                    .or_default()
                    .extend(history);
                Ok(ExecutionTransition::Started)
            }
            Transition::Rejected(status) => Ok(ExecutionTransition::AlreadyProcessed {
                status,
                payment_key: event.payment_key.clone(),
            }),
        }
    }

    async fn update_status(&self, update: PaymentStatusUpdate) -> Result<()> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let event = tables
            .events
            .get_mut(update.order_id())
            .ok_or_else(|| PaymentError::PaymentNotFound(update.order_id().to_string()))?;

        let history = event.apply_update(&update, Utc::now());
        tables
            .histories
            .entry(update.order_id().to_string())
            .or_default()
            .extend(history);
        Ok(())
    }

    async fn query_stale_or_unknown(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingPayment>> {
        let stale_before = stale_cutoff(now, self.staleness_window);
        let tables = self.tables.read().await;

        let mut events: Vec<&PaymentEvent> = tables.events.values().collect();
        events.sort_by_key(|event| {
            event
                .payment_orders
                .iter()
                .map(|order| order.updated_at)
                .min()
        });

        Ok(events
            .into_iter()
            .filter_map(|event| event.to_pending(stale_before))
            .take(limit)
            .collect())
    }

    async fn find_payment(&self, order_id: &str) -> Result<Option<PaymentEvent>> {
        let tables = self.tables.read().await;
        Ok(tables.events.get(order_id).cloned())
    }

    async fn order_history(&self, order_id: &str) -> Result<Vec<PaymentOrderHistory>> {
        let tables = self.tables.read().await;
        Ok(tables.histories.get(order_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PaymentValidation for InMemoryPaymentStore {
    async fn is_amount_valid(&self, order_id: &str, amount: Decimal) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .get(order_id)
            .is_some_and(|event| event.total_amount() == amount))
    }
}

/// Product catalog backed by a fixed set of products.
#[derive(Default, Clone)]
pub struct InMemoryProductCatalog {
    products: Arc<HashMap<u64, Product>>,
}

impl InMemoryProductCatalog {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: Arc::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_products(&self, _cart_id: u64, product_ids: &[u64]) -> Result<Vec<Product>> {
        product_ids
            .iter()
            .map(|id| {
                self.products
                    .get(id)
                    .cloned()
                    .ok_or(PaymentError::ProductNotFound(*id))
            })
            .collect()
    }
}
