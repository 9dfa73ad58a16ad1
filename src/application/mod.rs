//! Application layer - orchestrating services over the ports.

pub mod health;
pub mod notifications;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{BusError, StoreError};

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::new(ErrorCode::StoreFailure, err.to_string())
    }
}

impl From<BusError> for DomainError {
    fn from(err: BusError) -> Self {
        DomainError::new(ErrorCode::BusFailure, err.to_string())
    }
}
