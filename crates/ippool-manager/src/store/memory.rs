//! In-process implementations of the store seams

use super::{CasOutcome, PoolSelector, PoolStore, ReservedAddressSource};
use crate::address::{AddressRange, AddressSet, IpVersion};
use crate::models::{IpPool, IpPoolSpec, IpPoolStatus, ResourceVersion};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

/// Pool records held in memory, with versioned status writes
#[derive(Debug, Default)]
pub struct InMemoryPoolStore {
    pools: DashMap<String, IpPool>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a whole record and return its new version
    pub fn insert(&self, mut pool: IpPool) -> ResourceVersion {
        let name = pool.metadata.name.clone();
        let version = self
            .pools
            .get(&name)
            .map(|existing| existing.metadata.resource_version.next())
            .unwrap_or_else(|| ResourceVersion::new(1));
        pool.metadata.resource_version = version;
        self.pools.insert(name, pool);
        version
    }

    /// Replace the spec of an existing record
    pub fn update_spec(&self, name: &str, spec: IpPoolSpec) -> Result<ResourceVersion> {
        let mut entry = self
            .pools
            .get_mut(name)
            .ok_or_else(|| Error::PoolNotFound(name.to_string()))?;
        entry.spec = spec;
        entry.metadata.resource_version = entry.metadata.resource_version.next();
        Ok(entry.metadata.resource_version)
    }

    pub fn remove(&self, name: &str) -> Option<IpPool> {
        self.pools.remove(name).map(|(_, pool)| pool)
    }

    /// Current record without going through the async interface
    pub fn snapshot(&self, name: &str) -> Option<IpPool> {
        self.pools.get(name).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn get(&self, name: &str) -> Result<IpPool> {
        self.snapshot(name)
            .ok_or_else(|| Error::PoolNotFound(name.to_string()))
    }

    async fn compare_and_swap_status(
        &self,
        name: &str,
        expected: ResourceVersion,
        status: IpPoolStatus,
    ) -> Result<CasOutcome> {
        let mut entry = self
            .pools
            .get_mut(name)
            .ok_or_else(|| Error::PoolNotFound(name.to_string()))?;

        if entry.metadata.resource_version != expected {
            return Ok(CasOutcome::Conflict);
        }

        entry.status = status;
        entry.metadata.resource_version = expected.next();
        Ok(CasOutcome::Swapped(entry.metadata.resource_version))
    }

    async fn list(&self, selector: &PoolSelector) -> Result<Vec<IpPool>> {
        let mut pools: Vec<IpPool> = self
            .pools
            .iter()
            .filter(|p| selector.matches(p.value()))
            .map(|p| p.value().clone())
            .collect();
        pools.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(pools)
    }
}

/// Reserved addresses configured up front and replaceable at runtime
#[derive(Debug)]
pub struct StaticReservedAddresses {
    v4: RwLock<AddressSet>,
    v6: RwLock<AddressSet>,
}

impl Default for StaticReservedAddresses {
    fn default() -> Self {
        Self {
            v4: RwLock::new(AddressSet::empty(IpVersion::V4)),
            v6: RwLock::new(AddressSet::empty(IpVersion::V6)),
        }
    }
}

impl StaticReservedAddresses {
    /// No reserved addresses
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse IPv4 and IPv6 range texts
    pub fn from_texts(v4: &[&str], v6: &[&str]) -> Result<Self> {
        Ok(Self {
            v4: RwLock::new(AddressSet::parse(IpVersion::V4, v4)?),
            v6: RwLock::new(AddressSet::parse(IpVersion::V6, v6)?),
        })
    }

    /// Replace the reserved set of the set's family
    pub fn replace(&self, set: AddressSet) {
        match set.version() {
            IpVersion::V4 => *self.v4.write() = set,
            IpVersion::V6 => *self.v6.write() = set,
        }
    }
}

#[async_trait]
impl ReservedAddressSource for StaticReservedAddresses {
    async fn reserved_ranges(&self, version: IpVersion) -> Result<Vec<AddressRange>> {
        let set = match version {
            IpVersion::V4 => self.v4.read(),
            IpVersion::V6 => self.v6.read(),
        };
        Ok(set.ranges().to_vec())
    }
}
