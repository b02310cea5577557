//! Toss Payments adapter for the PSP execution port.
//!
//! Confirms payments through `POST /v1/payments/confirm`. Error codes the PSP
//! documents as definitive declines become rejections; provider-side and
//! unrecognized errors stay indeterminate so the payment ends up `Unknown`
//! and gets picked up by recovery.

use crate::config::PspConfig;
use crate::domain::command::PaymentConfirmCommand;
use crate::domain::execution::{
    PaymentExecutionResult, PaymentExtraDetails, PaymentMethod, PaymentType,
    PspConfirmationStatus, PspError,
};
use crate::domain::ports::PaymentExecution;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::header::AUTHORIZATION;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// How the PSP's error code settles (or doesn't settle) a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TossErrorKind {
    /// The PSP already confirmed this payment key.
    AlreadyProcessed,
    /// Definitive decline; retrying cannot change the outcome.
    Rejected,
    Unknown { retryable: bool },
}

pub fn classify_error_code(code: &str) -> TossErrorKind {
    match code {
        "ALREADY_PROCESSED_PAYMENT" => TossErrorKind::AlreadyProcessed,
        "PROVIDER_ERROR"
        | "CARD_PROCESSING_ERROR"
        | "FAILED_PAYMENT_INTERNAL_SYSTEM_PROCESSING"
        | "FAILED_INTERNAL_SYSTEM_PROCESSING"
        | "UNKNOWN_PAYMENT_ERROR" => TossErrorKind::Unknown { retryable: true },
        "INVALID_REQUEST"
        | "INVALID_API_KEY"
        | "INVALID_REJECT_CARD"
        | "INVALID_CARD_EXPIRATION"
        | "INVALID_STOPPED_CARD"
        | "INVALID_CARD_LOST_OR_STOLEN"
        | "INVALID_CARD_NUMBER"
        | "INVALID_CARD_INSTALLMENT_PLAN"
        | "INVALID_AUTHORIZE_AUTH"
        | "INVALID_UNREGISTERED_SUBMALL"
        | "INVALID_ACCOUNT_INFO_RE_REGISTER"
        | "INVALID_PASSWORD"
        | "INCORRECT_BASIC_AUTH_FORMAT"
        | "BELOW_MINIMUM_AMOUNT"
        | "EXCEED_MAX_CARD_INSTALLMENT_PLAN"
        | "EXCEED_MAX_DAILY_PAYMENT_COUNT"
        | "EXCEED_MAX_PAYMENT_AMOUNT"
        | "EXCEED_MAX_AMOUNT"
        | "EXCEED_MAX_AUTH_COUNT"
        | "EXCEED_MAX_ONE_DAY_AMOUNT"
        | "EXCEED_MAX_ONE_DAY_WITHDRAW_AMOUNT"
        | "EXCEED_MAX_ONE_TIME_WITHDRAW_AMOUNT"
        | "NOT_ALLOWED_POINT_USE"
        | "NOT_SUPPORTED_INSTALLMENT_PLAN_CARD_OR_MERCHANT"
        | "NOT_SUPPORTED_MONTHLY_INSTALLMENT_PLAN"
        | "NOT_AVAILABLE_PAYMENT"
        | "NOT_AVAILABLE_BANK"
        | "NOT_REGISTERED_BUSINESS"
        | "NOT_FOUND_TERMINAL_ID"
        | "NOT_FOUND_PAYMENT"
        | "NOT_FOUND_PAYMENT_SESSION"
        | "RESTRICTED_TRANSFER_ACCOUNT"
        | "REJECT_ACCOUNT_PAYMENT"
        | "REJECT_CARD_PAYMENT"
        | "REJECT_CARD_COMPANY"
        | "REJECT_TOSSPAY_INVALID_ACCOUNT"
        | "FORBIDDEN_REQUEST"
        | "UNAUTHORIZED_KEY"
        | "UNAPPROVED_ORDER_ID"
        | "FDS_ERROR" => TossErrorKind::Rejected,
        _ => TossErrorKind::Unknown { retryable: false },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TossConfirmRequest<'a> {
    payment_key: &'a str,
    order_id: &'a str,
    amount: i64,
}

/// The subset of the Toss `Payment` object this service records.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TossPayment {
    payment_key: String,
    order_id: String,
    order_name: String,
    #[serde(rename = "type")]
    payment_type: PaymentType,
    method: PaymentMethod,
    total_amount: Decimal,
    status: PspConfirmationStatus,
    approved_at: DateTime<FixedOffset>,
}

#[derive(Debug, Deserialize)]
struct TossFailure {
    code: String,
    message: String,
}

/// PSP execution port backed by the Toss Payments HTTP API.
pub struct TossPaymentExecutor {
    client: reqwest::Client,
    config: PspConfig,
    authorization: String,
}

impl TossPaymentExecutor {
    pub fn new(config: PspConfig) -> Result<Self, PspError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PspError::Network(e.to_string()))?;
        let authorization = format!("Basic {}", STANDARD.encode(format!("{}:", config.secret_key)));

        Ok(Self {
            client,
            config,
            authorization,
        })
    }

    async fn confirm_once(
        &self,
        command: &PaymentConfirmCommand,
    ) -> Result<PaymentExecutionResult, PspError> {
        let request = TossConfirmRequest {
            payment_key: &command.payment_key,
            order_id: &command.order_id,
            amount: whole_amount(command.amount)?,
        };

        let response = self
            .client
            .post(format!("{}/v1/payments/confirm", self.config.base_url))
            .header(AUTHORIZATION, &self.authorization)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(%status, order_id = %command.order_id, "PSP confirm responded");

        if status.is_success() {
            return parse_payment(&body).map(|payment| to_success(payment, body));
        }

        let failure = parse_failure(status.as_u16(), &body);
        match classify_error_code(&failure.code) {
            TossErrorKind::AlreadyProcessed => self.lookup_processed(command).await,
            TossErrorKind::Rejected => Err(PspError::Rejected {
                code: failure.code,
                message: failure.message,
            }),
            TossErrorKind::Unknown { retryable } => Err(PspError::Indeterminate {
                code: failure.code,
                message: failure.message,
                retryable,
            }),
        }
    }

    /// Fetches a payment the PSP reports as already confirmed.
    ///
    /// It only counts as a success if it is done and matches the order and
    /// amount being confirmed.
    async fn lookup_processed(
        &self,
        command: &PaymentConfirmCommand,
    ) -> Result<PaymentExecutionResult, PspError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payments/{}",
                self.config.base_url, command.payment_key
            ))
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let failure = parse_failure(status.as_u16(), &body);
            return Err(PspError::Indeterminate {
                code: failure.code,
                message: failure.message,
                retryable: false,
            });
        }

        let payment = parse_payment(&body)?;
        let matches = payment.status == PspConfirmationStatus::Done
            && payment.order_id == command.order_id
            && payment.total_amount == command.amount;
        if !matches {
            warn!(
                order_id = %command.order_id,
                psp_status = ?payment.status,
                "PSP reports the payment processed, but not as requested"
            );
            return Err(PspError::Indeterminate {
                code: "ALREADY_PROCESSED_PAYMENT".to_string(),
                message: "processed payment does not match the confirm request".to_string(),
                retryable: false,
            });
        }
        Ok(to_success(payment, body))
    }
}

#[async_trait]
impl PaymentExecution for TossPaymentExecutor {
    async fn execute(
        &self,
        command: &PaymentConfirmCommand,
    ) -> Result<PaymentExecutionResult, PspError> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_randomization_factor(0.1)
            .with_max_elapsed_time(None)
            .build();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.config.max_retries;

        retry(backoff, || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            self.confirm_once(command).await.map_err(|e| {
                if e.is_retryable() && attempt < max_retries {
                    warn!(attempt, error = %e, "Retrying PSP confirm");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

fn whole_amount(amount: Decimal) -> Result<i64, PspError> {
    if !amount.fract().is_zero() {
        return Err(PspError::Rejected {
            code: "INVALID_AMOUNT".to_string(),
            message: format!("amount {amount} is not a whole currency unit"),
        });
    }
    amount.to_i64().ok_or_else(|| PspError::Rejected {
        code: "INVALID_AMOUNT".to_string(),
        message: format!("amount {amount} is out of range"),
    })
}

fn transport_error(error: reqwest::Error) -> PspError {
    if error.is_timeout() {
        PspError::Timeout(error.to_string())
    } else {
        PspError::Network(error.to_string())
    }
}

fn parse_payment(body: &str) -> Result<TossPayment, PspError> {
    serde_json::from_str(body).map_err(|e| PspError::Indeterminate {
        code: "UNRECOGNIZED_RESPONSE".to_string(),
        message: e.to_string(),
        retryable: false,
    })
}

fn parse_failure(status: u16, body: &str) -> TossFailure {
    serde_json::from_str(body).unwrap_or_else(|_| TossFailure {
        code: format!("HTTP_{status}"),
        message: body.chars().take(200).collect(),
    })
}

fn to_success(payment: TossPayment, raw: String) -> PaymentExecutionResult {
    PaymentExecutionResult::success(
        payment.payment_key,
        payment.order_id,
        PaymentExtraDetails {
            payment_type: payment.payment_type,
            method: payment.method,
            total_amount: payment.total_amount,
            order_name: payment.order_name,
            psp_confirmation_status: payment.status,
            approved_at: payment.approved_at.with_timezone(&Utc),
            psp_raw_data: raw,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExecutionOutcome;
    use rust_decimal_macros::dec;

    const CONFIRMED: &str = r#"{
        "paymentKey": "tgen_20240101",
        "orderId": "order-1",
        "orderName": "Keyboard, Mouse",
        "type": "NORMAL",
        "method": "카드",
        "totalAmount": 30000,
        "status": "DONE",
        "approvedAt": "2024-01-01T12:00:00+09:00",
        "currency": "KRW"
    }"#;

    #[test]
    fn test_error_code_classification() {
        assert_eq!(
            classify_error_code("REJECT_CARD_COMPANY"),
            TossErrorKind::Rejected
        );
        assert_eq!(
            classify_error_code("PROVIDER_ERROR"),
            TossErrorKind::Unknown { retryable: true }
        );
        assert_eq!(
            classify_error_code("ALREADY_PROCESSED_PAYMENT"),
            TossErrorKind::AlreadyProcessed
        );
        assert_eq!(
            classify_error_code("SOMETHING_NEW"),
            TossErrorKind::Unknown { retryable: false }
        );
    }

    #[test]
    fn test_confirmed_payment_maps_to_success() {
        let payment = parse_payment(CONFIRMED).unwrap();
        let result = to_success(payment, CONFIRMED.to_string());

        match result.outcome {
            ExecutionOutcome::Success(details) => {
                assert_eq!(details.method, PaymentMethod::Card);
                assert_eq!(details.total_amount, dec!(30000));
                assert_eq!(details.psp_confirmation_status, PspConfirmationStatus::Done);
                assert_eq!(details.approved_at.to_rfc3339(), "2024-01-01T03:00:00+00:00");
                assert_eq!(details.psp_raw_data, CONFIRMED);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_success_body_is_indeterminate() {
        let result = parse_payment("<html>gateway</html>");
        assert!(matches!(result, Err(PspError::Indeterminate { .. })));
    }

    #[test]
    fn test_failure_body_fallback() {
        let failure = parse_failure(502, "Bad Gateway");
        assert_eq!(failure.code, "HTTP_502");
        assert_eq!(classify_error_code(&failure.code), TossErrorKind::Unknown { retryable: false });

        let failure = parse_failure(
            400,
            r#"{"code":"REJECT_CARD_PAYMENT","message":"한도초과"}"#,
        );
        assert_eq!(failure.code, "REJECT_CARD_PAYMENT");
        assert_eq!(failure.message, "한도초과");
    }

    #[test]
    fn test_whole_amount() {
        assert_eq!(whole_amount(dec!(60000)).unwrap(), 60000);
        assert_eq!(whole_amount(dec!(60000.00)).unwrap(), 60000);
        assert!(matches!(
            whole_amount(dec!(10.5)),
            Err(PspError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_psp_is_not_a_rejection() {
        let executor = TossPaymentExecutor::new(PspConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            secret_key: "test_sk".to_string(),
            max_retries: 0,
            ..PspConfig::default()
        })
        .unwrap();
        let command = PaymentConfirmCommand {
            payment_key: "pk".to_string(),
            order_id: "order-1".to_string(),
            amount: dec!(30000),
        };

        let result = executor.execute(&command).await;
        assert!(matches!(
            result,
            Err(PspError::Network(_)) | Err(PspError::Timeout(_))
        ));
    }
}
