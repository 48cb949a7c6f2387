//! Address allocation
//!
//! - [`AllocationEngine`]: allocate, release and re-key reservations of a pool
//! - [`retry_on_conflict`]: the reload/compute/compare-and-swap driver the
//!   engine's operations share

mod engine;
mod retry;

pub use engine::{
    AllocatedIp, AllocationEngine, AllocatorConfig, IpAndOwner, IpAndOwnerKey,
    DEFAULT_MAX_ALLOCATED_IPS,
};
pub use retry::{
    retry_on_conflict, Attempt, CallContext, RetryPolicy, DEFAULT_MAX_RETRY_DELAY,
};
