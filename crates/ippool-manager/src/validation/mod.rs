//! Admission of pool records
//!
//! - [`mutate_pool`]: normalise a record before it is checked
//! - [`PoolInvariantValidator`]: create/update checks, violations collected
//!   as [`FieldErrors`]

mod field;
mod mutate;
mod validator;

pub use field::{FieldError, FieldErrorKind, FieldErrors};
pub use mutate::mutate_pool;
pub use validator::PoolInvariantValidator;
