use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use signalbot_db::DbError;
use signalbot_db::models::PaymentStatus;
use signalbot_shared::{CatalogError, NotesError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("payment link {0} already exists")]
    DuplicateLinkId(String),

    #[error("amount mismatch for plan {plan}: expected {expected}, got {actual}")]
    AmountMismatch {
        plan: String,
        expected: i64,
        actual: i64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payment {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("payment {link_id} cannot move from {status}")]
    InvalidTransition {
        link_id: String,
        status: PaymentStatus,
    },

    /// The plan was retired between purchase and confirmation
    #[error("plan {0} is no longer offered")]
    UnknownPlan(String),

    #[error("webhook signature is missing or invalid")]
    SignatureInvalid,

    #[error("delivery to chat {chat_id} failed: {reason}")]
    DeliveryFailed { chat_id: i64, reason: String },

    #[error("invalid payment notes: {0}")]
    InvalidNotes(#[from] NotesError),

    #[error("payment notes do not match payment {0}")]
    NotesMismatch(String),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl BillingError {
    /// Errors that point at tampering or a catalog/data problem and need a human.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            Self::AmountMismatch { .. } | Self::UnknownPlan(_) | Self::NotesMismatch(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPlan(_)
            | Self::SignatureInvalid
            | Self::InvalidNotes(_)
            | Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateLinkId(_)
            | Self::AlreadyFinalized(_)
            | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::AmountMismatch { .. } | Self::UnknownPlan(_) | Self::NotesMismatch(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::DeliveryFailed { .. } | Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CatalogError> for BillingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidPlan(plan) => Self::InvalidPlan(plan),
            CatalogError::Config(msg) => Self::InvalidPlan(msg),
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Store errors may carry SQL details
        let message = match &self {
            Self::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "status": "error", "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_go_to_operator() {
        assert!(
            BillingError::AmountMismatch {
                plan: "gold".into(),
                expected: 1499,
                actual: 1
            }
            .needs_operator()
        );
        assert!(BillingError::UnknownPlan("gold".into()).needs_operator());
        assert!(!BillingError::NotFound("plink".into()).needs_operator());
        assert!(!BillingError::SignatureInvalid.needs_operator());
    }

    #[test]
    fn maps_to_http_status() {
        assert_eq!(BillingError::SignatureInvalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BillingError::AlreadyFinalized("plink".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            BillingError::Store(DbError::InvalidPeriod).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
