//! Check data model and domain errors.

pub mod check;
pub mod error;

pub use check::{
    CategoryStatus, CategoryStatuses, Check, CheckId, CheckOutcome, CheckResult, CheckStatus,
    LogEntry, LogLevel,
};
pub use error::{RegistryError, RegistryResult, ValidationError};
