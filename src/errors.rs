use sea_orm::error::DbErr;
use thiserror::Error;

/// Service-level error taxonomy.
///
/// Business-rule failures (`InsufficientStock`, `OverReceipt`) are expected
/// outcomes surfaced to the caller and are never retried automatically.
/// `Conflict` covers optimistic-locking collisions and is the only class a
/// caller should retry with backoff.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error(
        "No stock record for product {product_id} in warehouse {warehouse_id}"
    )]
    UnknownStockRecord { product_id: i64, warehouse_id: i64 },

    #[error(
        "Insufficient stock for product {product_id} in warehouse {warehouse_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        warehouse_id: i64,
        requested: i64,
        available: i64,
    },

    #[error(
        "Over-receipt for product {product_id}: ordered {ordered}, received {received}"
    )]
    OverReceipt {
        product_id: i64,
        ordered: i64,
        received: i64,
    },

    #[error(
        "Kit {product_id} exceeds maximum component nesting depth {max_depth}; possible cyclic kit definition"
    )]
    KitTooDeep { product_id: i64, max_depth: u32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Shortfall amount for `InsufficientStock`, `None` for other variants.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            ServiceError::InsufficientStock {
                requested,
                available,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }

    /// True for failures that only a new state of the world can resolve
    /// (no point retrying without stock arriving or data changing).
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            ServiceError::InsufficientStock { .. }
                | ServiceError::OverReceipt { .. }
                | ServiceError::KitTooDeep { .. }
        )
    }

    /// True for transient failures eligible for caller-driven retry with
    /// backoff (lock contention on the serialization point).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}
