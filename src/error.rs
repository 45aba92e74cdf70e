// ⚠️ Error Types
// Typed failures for ingestion and ranking; binaries wrap these in anyhow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LtvError {
    /// A required field is missing or cannot be parsed
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Same as `MalformedEvent`, annotated with the event's position in its batch
    #[error("malformed event at index {index}: {reason}")]
    MalformedEventAt { index: usize, reason: String },

    /// Customer has no recorded entry time (never saw a CUSTOMER event)
    #[error("customer {customer_id} has no entry time")]
    IncompleteCustomer { customer_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LtvError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        LtvError::MalformedEvent {
            reason: reason.into(),
        }
    }

    pub fn incomplete(customer_id: &str) -> Self {
        LtvError::IncompleteCustomer {
            customer_id: customer_id.to_string(),
        }
    }

    /// Attach a batch index to a malformed-event error; other errors pass through
    pub fn at_index(self, index: usize) -> Self {
        match self {
            LtvError::MalformedEvent { reason } => LtvError::MalformedEventAt { index, reason },
            other => other,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            LtvError::MalformedEvent { .. } | LtvError::MalformedEventAt { .. }
        )
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, LtvError::IncompleteCustomer { .. })
    }
}

pub type Result<T> = std::result::Result<T, LtvError>;
