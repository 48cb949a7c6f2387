//! Collaborator seams for pool records and cluster-wide reserved addresses
//!
//! The engine never owns pool state. It reads records through a
//! [`PoolStore`] and writes status back with compare-and-swap on the
//! record's [`ResourceVersion`].

mod memory;

pub use memory::{InMemoryPoolStore, StaticReservedAddresses};

use crate::address::{AddressRange, IpVersion};
use crate::models::{IpPool, IpPoolStatus, ResourceVersion};
use crate::Result;
use async_trait::async_trait;

/// Result of a compare-and-swap status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Write applied; the record now carries this version
    Swapped(ResourceVersion),
    /// The record changed since it was read; reload and try again
    Conflict,
}

/// Filter for listing pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSelector {
    pub ip_version: Option<IpVersion>,
}

impl PoolSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ip_version(version: IpVersion) -> Self {
        Self {
            ip_version: Some(version),
        }
    }

    pub fn matches(&self, pool: &IpPool) -> bool {
        match self.ip_version {
            Some(version) => pool.spec.version().ok() == Some(version),
            None => true,
        }
    }
}

/// Storage of pool records with optimistic concurrency
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Fetch the latest record, bypassing any read cache
    async fn get(&self, name: &str) -> Result<IpPool>;

    /// Replace the status if the record still carries `expected`
    ///
    /// A version mismatch is reported as [`CasOutcome::Conflict`], never as an
    /// error.
    async fn compare_and_swap_status(
        &self,
        name: &str,
        expected: ResourceVersion,
        status: IpPoolStatus,
    ) -> Result<CasOutcome>;

    /// List records matching the selector
    async fn list(&self, selector: &PoolSelector) -> Result<Vec<IpPool>>;
}

/// Addresses that must never be handed out by any pool
#[async_trait]
pub trait ReservedAddressSource: Send + Sync {
    async fn reserved_ranges(&self, version: IpVersion) -> Result<Vec<AddressRange>>;
}
