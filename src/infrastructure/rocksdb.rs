use super::in_memory::{DEFAULT_STALENESS_WINDOW, stale_cutoff, staleness};
use crate::domain::command::{ExecutionTransition, PaymentStatusUpdate, PendingPayment};
use crate::domain::payment::{PaymentEvent, PaymentOrderHistory, Transition};
use crate::domain::ports::{PaymentStore, PaymentValidation};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Column Family for payment events, keyed by order id.
pub const CF_PAYMENT_EVENTS: &str = "payment_events";
/// Column Family for the status history of each event's orders.
pub const CF_ORDER_HISTORIES: &str = "payment_order_histories";

/// A persistent payment store using RocksDB.
///
/// Events and their histories live in separate Column Families and are
/// written together in one `WriteBatch`. Read-modify-write sequences run
/// under a store-wide mutex; RocksDB holds an exclusive lock on its
/// directory, so this is the only writer.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    staleness_window: TimeDelta,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_events = ColumnFamilyDescriptor::new(CF_PAYMENT_EVENTS, Options::default());
        let cf_histories = ColumnFamilyDescriptor::new(CF_ORDER_HISTORIES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_events, cf_histories])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            staleness_window: staleness(DEFAULT_STALENESS_WINDOW),
        })
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = staleness(window);
        self
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("{name} column family not found")))
    }

    fn read_event(&self, order_id: &str) -> Result<Option<PaymentEvent>> {
        let cf = self.cf(CF_PAYMENT_EVENTS)?;
        match self.db.get_cf(cf, order_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_history(&self, order_id: &str) -> Result<Vec<PaymentOrderHistory>> {
        let cf = self.cf(CF_ORDER_HISTORIES)?;
        match self.db.get_cf(cf, order_id.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Writes the event and appends `history` in a single batch.
    fn write_event(&self, event: &PaymentEvent, history: Vec<PaymentOrderHistory>) -> Result<()> {
        let mut all_history = self.read_history(&event.order_id)?;
        all_history.extend(history);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_PAYMENT_EVENTS)?,
            event.order_id.as_bytes(),
            serde_json::to_vec(event)?,
        );
        batch.put_cf(
            self.cf(CF_ORDER_HISTORIES)?,
            event.order_id.as_bytes(),
            serde_json::to_vec(&all_history)?,
        );
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create_payment(&self, event: PaymentEvent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_PAYMENT_EVENTS)?;
        if self.db.get_pinned_cf(cf, event.order_id.as_bytes())?.is_some() {
            return Err(PaymentError::DuplicateCheckout(event.order_id));
        }
        self.write_event(&event, Vec::new())
    }

    async fn transition_to_executing(
        &self,
        order_id: &str,
        payment_key: &str,
    ) -> Result<ExecutionTransition> {
        let _guard = self.write_lock.lock().await;
        let mut event = self
            .read_event(order_id)?
            .ok_or_else(|| PaymentError::PaymentNotFound(order_id.to_string()))?;

        let now = Utc::now();
        match event.begin_execution(payment_key, now, stale_cutoff(now, self.staleness_window)) {
            Transition::Applied(history) => {
                self.write_event(&event, history)?;
                Ok(ExecutionTransition::Started)
            }
            Transition::Rejected(status) => Ok(ExecutionTransition::AlreadyProcessed {
                status,
                payment_key: event.payment_key,
            }),
        }
    }

    async fn update_status(&self, update: PaymentStatusUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut event = self
            .read_event(update.order_id())?
            .ok_or_else(|| PaymentError::PaymentNotFound(update.order_id().to_string()))?;

        let history = event.apply_update(&update, Utc::now());
        self.write_event(&event, history)
    }

    async fn query_stale_or_unknown(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingPayment>> {
        let stale_before = stale_cutoff(now, self.staleness_window);
        let cf = self.cf(CF_PAYMENT_EVENTS)?;

        let mut pending = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            if pending.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            let event: PaymentEvent = serde_json::from_slice(&value)?;
            if let Some(candidate) = event.to_pending(stale_before) {
                pending.push(candidate);
            }
        }
        Ok(pending)
    }

    async fn find_payment(&self, order_id: &str) -> Result<Option<PaymentEvent>> {
        self.read_event(order_id)
    }

    async fn order_history(&self, order_id: &str) -> Result<Vec<PaymentOrderHistory>> {
        self.read_history(order_id)
    }
}

#[async_trait]
impl PaymentValidation for RocksDBStore {
    async fn is_amount_valid(&self, order_id: &str, amount: Decimal) -> Result<bool> {
        Ok(self
            .read_event(order_id)?
            .is_some_and(|event| event.total_amount() == amount))
    }
}
