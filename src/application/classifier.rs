use crate::domain::command::{ConfirmError, PaymentConfirmCommand, PaymentStatusUpdate};
use crate::domain::execution::{ExecutionOutcome, PaymentExecutionResult, PaymentFailure};
use crate::domain::payment::PaymentStatus;

/// Failure code reported when a confirm finds the payment already handled.
pub const ALREADY_PROCESSED_CODE: &str = "ALREADY_PROCESSED";

/// What a confirm attempt amounts to once its outcome is known.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Persist this update.
    Settle(PaymentStatusUpdate),
    /// The order was not ours to process; report its stored status as is.
    AlreadyProcessed {
        status: PaymentStatus,
        failure: PaymentFailure,
    },
}

/// Maps the outcome of validating and executing a confirm into a status.
///
/// Anything that does not prove success or a definitive rejection ends up
/// `Unknown`: the PSP may have charged the buyer, so it must not be failed.
pub fn classify(
    command: &PaymentConfirmCommand,
    outcome: Result<PaymentExecutionResult, ConfirmError>,
) -> Classification {
    let payment_key = command.payment_key.clone();
    let order_id = command.order_id.clone();

    match outcome {
        Ok(result) => match result.outcome {
            ExecutionOutcome::Success(extra_details) => {
                Classification::Settle(PaymentStatusUpdate::Success {
                    payment_key,
                    order_id,
                    extra_details,
                })
            }
            ExecutionOutcome::Failure(failure) => {
                Classification::Settle(PaymentStatusUpdate::Failure {
                    payment_key,
                    order_id,
                    failure,
                })
            }
            ExecutionOutcome::Unknown(failure) => {
                Classification::Settle(PaymentStatusUpdate::Unknown {
                    payment_key,
                    order_id,
                    failure,
                })
            }
        },
        Err(ConfirmError::AlreadyProcessed { status, message }) => {
            Classification::AlreadyProcessed {
                status,
                failure: PaymentFailure::new(ALREADY_PROCESSED_CODE, message),
            }
        }
        Err(ConfirmError::ValidationFailed { rule, message }) => {
            Classification::Settle(PaymentStatusUpdate::Failure {
                payment_key,
                order_id,
                failure: PaymentFailure::new(rule, message),
            })
        }
        Err(ConfirmError::PspRejected { code, message }) => {
            Classification::Settle(PaymentStatusUpdate::Failure {
                payment_key,
                order_id,
                failure: PaymentFailure::new(code, message),
            })
        }
        Err(ConfirmError::Indeterminate { code, message }) => {
            Classification::Settle(PaymentStatusUpdate::Unknown {
                payment_key,
                order_id,
                failure: PaymentFailure::new(code, message),
            })
        }
    }
}
