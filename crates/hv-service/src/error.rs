use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hv_ledger::{BuildError, LedgerError, TxnConfirmationError};
use hv_types::Amount;
use serde_json::json;

use crate::db::DbError;
use crate::memstore::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("the note you provided is not valid")]
    InvalidNote,

    #[error("note amount too small, the maximum you can withdraw is {}", max_withdrawal.display)]
    NoteTooSmall { max_withdrawal: Amount },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("{error}")]
    Confirmation {
        error: TxnConfirmationError,
        /// Largest amount the caller could have afforded, when known.
        max_amount: Option<Amount>,
    },

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("database: {0}")]
    Db(#[from] DbError),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<TxnConfirmationError> for ServiceError {
    fn from(error: TxnConfirmationError) -> Self {
        ServiceError::Confirmation {
            error,
            max_amount: None,
        }
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidNote | Self::NoteTooSmall { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Session(_) => StatusCode::NOT_FOUND,
            Self::Build(e) => match e {
                BuildError::BelowMinimumDeposit { .. }
                | BuildError::ZeroAmount
                | BuildError::FeeBelowBudget { .. }
                | BuildError::MissingLeafIndex => StatusCode::UNPROCESSABLE_ENTITY,
                BuildError::SignedTxnMismatch | BuildError::MalformedProof(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Confirmation { error, .. } => match error {
                TxnConfirmationError::Rejected(_)
                | TxnConfirmationError::OverSpend(_)
                | TxnConfirmationError::MinBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TxnConfirmationError::Expired(_) | TxnConfirmationError::WaitTimeout(_) => {
                    StatusCode::REQUEST_TIMEOUT
                }
                TxnConfirmationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Ledger(_) => StatusCode::BAD_GATEWAY,
            Self::Db(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the caller should do next.
    pub fn remedy(&self) -> String {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => "correct the request and resubmit".into(),
            Self::InvalidNote => "check the note text; it must belong to a confirmed deposit".into(),
            Self::NoteTooSmall { max_withdrawal } => {
                format!("withdraw at most {}", max_withdrawal.display)
            }
            Self::Session(_) => "prepare the deposit again".into(),
            Self::Confirmation { error, max_amount } => match error {
                TxnConfirmationError::Rejected(_) => {
                    "the network rejected the transaction, please try again".into()
                }
                TxnConfirmationError::OverSpend(_) | TxnConfirmationError::MinBalance(_) => {
                    match max_amount {
                        Some(max) => format!("the maximum amount you can deposit is {}", max.display),
                        None => "you do not have enough funds to cover this transaction".into(),
                    }
                }
                TxnConfirmationError::Expired(_) => {
                    "the transaction expired before it was sent, please try again".into()
                }
                TxnConfirmationError::WaitTimeout(_) => {
                    "not confirmed yet; it may still confirm, check again in a few minutes".into()
                }
                TxnConfirmationError::Internal(_) => {
                    "something went wrong and nothing was processed, please try again".into()
                }
            },
            Self::Build(_) | Self::Ledger(_) | Self::Db(_) | Self::Internal(_) => {
                "something went wrong, please try again later".into()
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let max_amount = match &self {
            Self::Confirmation { max_amount, .. } => max_amount.as_ref().map(|a| a.units),
            Self::NoteTooSmall { max_withdrawal } => Some(max_withdrawal.units),
            _ => None,
        };
        // server faults do not leak internals
        let message = if status.is_server_error() {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({
            "error": message,
            "remedy": self.remedy(),
            "max_amount": max_amount,
        });
        (status, Json(body)).into_response()
    }
}
