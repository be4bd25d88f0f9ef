//! Error taxonomy for the schedule engine.
//!
//! Expansion that yields zero dates is not an error, and materialization
//! races are absorbed by the store's keyed insert, so neither shows up here.

use chrono::NaiveDate;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Malformed input, rejected before any write.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The mutation would rewrite an occurrence dated before today.
    #[error("rule {rule_id} cannot change {date}: dates before today are frozen")]
    ForwardOnly { rule_id: String, date: NaiveDate },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ScheduleError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
