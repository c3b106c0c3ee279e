use serde_json::{Value, json};
use thiserror::Error;

use crate::plans::PlanId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotesError {
    #[error("notes must be a JSON object")]
    NotAnObject,

    #[error("missing note field `{0}`")]
    Missing(&'static str),

    #[error("malformed note field `{field}`: {value}")]
    Malformed { field: &'static str, value: String },
}

/// Correlation data attached to every payment link. The gateway echoes it
/// back untouched, so it is the only way to tie a confirmation to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentNotes {
    pub telegram_id: i64,
    pub plan: PlanId,
}

impl PaymentNotes {
    pub fn new(telegram_id: i64, plan: PlanId) -> Self {
        Self { telegram_id, plan }
    }

    /// Gateway notes are string-valued, so the id is written as a string.
    pub fn to_value(&self) -> Value {
        json!({
            "telegram_id": self.telegram_id.to_string(),
            "plan": self.plan.as_str(),
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, NotesError> {
        // Razorpay serializes empty notes as `[]`
        let map = value.as_object().ok_or(NotesError::NotAnObject)?;

        let raw_id = map.get("telegram_id").ok_or(NotesError::Missing("telegram_id"))?;
        let telegram_id = match raw_id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| NotesError::Malformed {
            field: "telegram_id",
            value: raw_id.to_string(),
        })?;

        let raw_plan = map.get("plan").ok_or(NotesError::Missing("plan"))?;
        let plan = raw_plan
            .as_str()
            .and_then(|s| s.parse::<PlanId>().ok())
            .ok_or_else(|| NotesError::Malformed {
                field: "plan",
                value: raw_plan.to_string(),
            })?;

        Ok(Self { telegram_id, plan })
    }
}
