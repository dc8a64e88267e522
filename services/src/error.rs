use sea_orm::DbErr;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the ledger core.
///
/// Single-item operations fail fast and leave no partial state. Bulk
/// operations only return one of these for a malformed request as a whole;
/// per-target failures are collected into the bulk report instead.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}
