use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write lost a race or hit a busy database. Safe to retry as a whole.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored row could not be decoded back into a record.
    #[error("corrupt {entity} row: {detail}")]
    Corrupt { entity: &'static str, detail: String },

    #[error("storage backend: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransactionAborted(_))
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound { entity, id: id.to_string() }
    }

    pub fn corrupt(entity: &'static str, detail: impl ToString) -> Self {
        StoreError::Corrupt { entity, detail: detail.to_string() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
