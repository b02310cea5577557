use crate::domain::command::{CheckoutCommand, CheckoutResult, Product};
use crate::domain::payment::{PaymentEvent, PaymentOrder};
use crate::domain::ports::{PaymentStoreRef, ProductCatalogRef};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

/// Turns a cart into a persisted payment, once per idempotency key.
pub struct CheckoutService {
    catalog: ProductCatalogRef,
    store: PaymentStoreRef,
}

impl CheckoutService {
    pub fn new(catalog: ProductCatalogRef, store: PaymentStoreRef) -> Self {
        Self { catalog, store }
    }

    #[instrument(
        skip(self, command),
        fields(order_id = command.idempotency_key.as_str(), cart_id = command.cart_id)
    )]
    pub async fn checkout(&self, command: CheckoutCommand) -> Result<CheckoutResult> {
        if command.product_ids.is_empty() {
            return Err(PaymentError::InvalidCheckout(
                "at least one product is required".to_string(),
            ));
        }

        let products = self
            .catalog
            .get_products(command.cart_id, &command.product_ids)
            .await?;
        let event = build_payment_event(&command, &products, Utc::now());

        let result = CheckoutResult {
            order_id: event.order_id.clone(),
            order_name: event.order_name.clone(),
            amount: event.total_amount(),
        };

        if let Err(e) = self.store.create_payment(event).await {
            if matches!(e, PaymentError::DuplicateCheckout(_)) {
                warn!("Checkout rejected, order already exists");
            }
            return Err(e);
        }

        info!(amount = %result.amount, orders = products.len(), "Checkout created");
        Ok(result)
    }
}

fn build_payment_event(
    command: &CheckoutCommand,
    products: &[Product],
    now: DateTime<Utc>,
) -> PaymentEvent {
    let order_id = command.idempotency_key.as_str();
    let order_name = products
        .iter()
        .map(|product| product.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let orders = products
        .iter()
        .map(|product| {
            PaymentOrder::new(product.seller_id, product.id, order_id, product.amount, now)
        })
        .collect();

    PaymentEvent::new(command.buyer_id, order_id, order_name, orders)
}
