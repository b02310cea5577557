use super::classifier::{self, Classification};
use crate::domain::command::{
    ConfirmError, ExecutionTransition, PaymentConfirmCommand, PaymentConfirmationResult,
};
use crate::domain::execution::PaymentExecutionResult;
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::{PaymentExecutionRef, PaymentStoreRef, PaymentValidationRef};
use crate::error::Result;
use tracing::{info, instrument, warn};

/// Drives one payment from pending to a settled or unknown status.
///
/// Expected failure modes (validation, PSP rejection, timeouts) are turned
/// into a persisted status. Only storage faults while claiming the payment or
/// while persisting the outcome are returned as errors.
pub struct PaymentConfirmService {
    store: PaymentStoreRef,
    validation: PaymentValidationRef,
    execution: PaymentExecutionRef,
}

impl PaymentConfirmService {
    pub fn new(
        store: PaymentStoreRef,
        validation: PaymentValidationRef,
        execution: PaymentExecutionRef,
    ) -> Self {
        Self {
            store,
            validation,
            execution,
        }
    }

    #[instrument(skip(self, command), fields(order_id = %command.order_id))]
    pub async fn confirm(
        &self,
        command: &PaymentConfirmCommand,
    ) -> Result<PaymentConfirmationResult> {
        let transition = self
            .store
            .transition_to_executing(&command.order_id, &command.payment_key)
            .await?;

        let outcome = match transition {
            ExecutionTransition::Started => self.validate_and_execute(command).await,
            ExecutionTransition::AlreadyProcessed {
                status,
                payment_key,
            } => Err(already_processed(command, status, payment_key)),
        };

        match classifier::classify(command, outcome) {
            Classification::AlreadyProcessed { status, failure } => {
                info!(%status, "Payment already processed, skipping PSP call");
                Ok(PaymentConfirmationResult {
                    status,
                    failure: Some(failure),
                })
            }
            Classification::Settle(update) => {
                let result = PaymentConfirmationResult {
                    status: update.status(),
                    failure: update.failure().cloned(),
                };
                self.store.update_status(update).await?;
                info!(status = %result.status, "Payment confirmation settled");
                Ok(result)
            }
        }
    }

    async fn validate_and_execute(
        &self,
        command: &PaymentConfirmCommand,
    ) -> std::result::Result<PaymentExecutionResult, ConfirmError> {
        match self
            .validation
            .is_amount_valid(&command.order_id, command.amount)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(amount = %command.amount, "Requested amount does not match checkout total");
                return Err(ConfirmError::ValidationFailed {
                    rule: "AMOUNT_MISMATCH".to_string(),
                    message: format!(
                        "amount {} does not match the checked out total of order {}",
                        command.amount, command.order_id
                    ),
                });
            }
            Err(e) => {
                warn!(error = %e, "Amount validation could not be performed");
                return Err(ConfirmError::Indeterminate {
                    code: "VALIDATION_UNAVAILABLE".to_string(),
                    message: e.to_string(),
                });
            }
        }

        self.execution.execute(command).await.map_err(|e| {
            warn!(error = %e, "PSP confirmation did not succeed");
            ConfirmError::from(e)
        })
    }
}

/// A key mismatch still reports the stored status; it is only called out in
/// the failure message and the logs.
fn already_processed(
    command: &PaymentConfirmCommand,
    status: PaymentStatus,
    stored_key: Option<String>,
) -> ConfirmError {
    let message = match stored_key {
        Some(stored) if stored != command.payment_key => {
            warn!(%status, "Confirm attempted with a different payment key than the stored one");
            format!("payment is already {status} under a different payment key")
        }
        _ if status == PaymentStatus::Executing => {
            "payment is being executed by another attempt".to_string()
        }
        _ if status == PaymentStatus::Unknown => {
            warn!("Confirm refused, retry budget exhausted");
            "payment has exhausted its retry budget and needs manual intervention".to_string()
        }
        _ => format!("payment is already {status}"),
    };
    ConfirmError::AlreadyProcessed { status, message }
}
