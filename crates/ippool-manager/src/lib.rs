//! IP Pool Manager
//!
//! Address management for container network interfaces:
//! - Range arithmetic over IPv4 and IPv6 (union, difference, intersection,
//!   merge, overlap) that never enumerates address space eagerly
//! - Pool address spaces built from a base CIDR, include and exclude ranges
//! - Allocation, release and re-keying of addresses against a shared,
//!   versioned pool record with bounded retry on version conflicts
//! - Admission checks that keep pools disjoint and gateways, routes and live
//!   reservations consistent with each pool's address space
//!
//! Persistence is left to a [`store::PoolStore`]; the crate ships an
//! in-memory implementation.

pub mod address;
pub mod allocator;
pub mod auto_pool;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;

// Re-export core types
pub use address::{AddressRange, AddressSet, IpVersion, Subnet};
pub use allocator::{
    AllocatedIp, AllocationEngine, AllocatorConfig, CallContext, IpAndOwner, IpAndOwnerKey,
    RetryPolicy,
};
pub use auto_pool::AutoPoolSizing;
pub use config::{IpamConfig, RetryConfig};
pub use error::{Error, Result};
pub use models::{
    IpPool, IpPoolSpec, IpPoolStatus, OwnerKey, OwnerKind, OwnerReference, PoolIpAllocation,
    ResourceVersion, Route,
};
pub use store::{
    CasOutcome, InMemoryPoolStore, PoolSelector, PoolStore, ReservedAddressSource,
    StaticReservedAddresses,
};
pub use validation::{mutate_pool, FieldError, FieldErrorKind, FieldErrors, PoolInvariantValidator};
