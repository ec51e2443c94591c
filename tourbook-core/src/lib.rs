pub mod account;
pub mod availability;
pub mod booking;
pub mod booking_number;
pub mod catalog;
pub mod payment;
pub mod pii;
pub mod pricing;
pub mod repository;
pub mod seats;
pub mod validation;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not enough seats: requested {requested}, available {available}")]
    CapacityExceeded { requested: i32, available: i32 },
    #[error("Booking number {0} is already taken")]
    DuplicateBookingNumber(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store error: {0}")]
    StoreError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
