use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid {field} stored: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        StoreError::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
