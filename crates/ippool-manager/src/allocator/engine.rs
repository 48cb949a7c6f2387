//! Address allocation against a shared pool record
//!
//! The engine keeps no state between calls. Each operation reloads the pool
//! from the [`PoolStore`], computes the next status with a pure planning
//! function and writes it back with a compare-and-swap. Losing the race means
//! reloading and planning again, see [`retry_on_conflict`].

use super::retry::{retry_on_conflict, Attempt, CallContext, RetryPolicy};
use crate::address::{AddressRange, AddressSet, IpVersion};
use crate::models::{IpPool, IpPoolStatus, OwnerKey, OwnerReference, PoolIpAllocation, Route};
use crate::store::{CasOutcome, PoolStore, ReservedAddressSource};
use crate::{Error, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// Default soft ceiling on reservations per pool
pub const DEFAULT_MAX_ALLOCATED_IPS: i64 = 5000;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocatorConfig {
    pub retry: RetryPolicy,
    /// Allocation fails once a pool would hold more reservations than this
    pub max_allocated_ips: i64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_allocated_ips: DEFAULT_MAX_ALLOCATED_IPS,
        }
    }
}

/// Address handed out by [`AllocationEngine::allocate`]
///
/// Carries everything needed to configure the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedIp {
    pub pool: String,
    pub address: IpAddr,
    /// Prefix length of the pool subnet
    pub prefix_len: u8,
    pub version: IpVersion,
    pub gateway: Option<IpAddr>,
    pub routes: Vec<Route>,
    pub interface: String,
}

impl AllocatedIp {
    /// Address with the pool's prefix length (e.g., "172.18.40.10/24")
    pub fn cidr(&self) -> Result<IpNet> {
        IpNet::new(self.address, self.prefix_len).map_err(|_| {
            Error::WrongInput(format!(
                "invalid prefix length {} for {}",
                self.prefix_len, self.address
            ))
        })
    }
}

/// Release request for one reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAndOwnerKey {
    pub ip: IpAddr,
    pub owner: OwnerKey,
}

impl IpAndOwnerKey {
    pub fn new(ip: IpAddr, owner: OwnerKey) -> Self {
        Self { ip, owner }
    }
}

/// Re-key request for one reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAndOwner {
    pub ip: IpAddr,
    pub owner: OwnerReference,
}

impl IpAndOwner {
    pub fn new(ip: IpAddr, owner: OwnerReference) -> Self {
        Self { ip, owner }
    }
}

/// Hands out, reclaims and re-keys addresses of pools held in a [`PoolStore`]
pub struct AllocationEngine {
    store: Arc<dyn PoolStore>,
    reserved: Arc<dyn ReservedAddressSource>,
    config: AllocatorConfig,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn PoolStore>, reserved: Arc<dyn ReservedAddressSource>) -> Self {
        Self::with_config(store, reserved, AllocatorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn PoolStore>,
        reserved: Arc<dyn ReservedAddressSource>,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            store,
            reserved,
            config,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Reserve the lowest free address of `pool` for `owner`
    ///
    /// Fails with [`Error::IpUsedOut`] when nothing is free or the pool is at
    /// its reservation ceiling; neither is retried.
    pub async fn allocate(
        &self,
        ctx: &CallContext,
        pool: &str,
        interface: &str,
        owner: &OwnerReference,
    ) -> Result<AllocatedIp> {
        let allocated = retry_on_conflict(&self.config.retry, ctx, pool, move |attempt| async move {
            let record = self.store.get(pool).await?;
            let version = record.spec.version()?;
            let reserved = self.reserved.reserved_ranges(version).await?;

            let plan = plan_allocation(
                &record,
                &reserved,
                interface,
                owner,
                self.config.max_allocated_ips,
            )?;

            match self.write_status(&record, plan.status).await? {
                CasOutcome::Swapped(_) => {
                    tracing::debug!(
                        pool = %pool,
                        attempt,
                        ip = %plan.allocated.address,
                        "Status written"
                    );
                    Ok(Attempt::Done(plan.allocated))
                }
                CasOutcome::Conflict => Ok(Attempt::Conflict),
            }
        })
        .await?;

        tracing::info!(
            pool = %pool,
            ip = %allocated.address,
            interface = %interface,
            owner = %owner,
            "Allocated IP"
        );
        Ok(allocated)
    }

    /// Drop the reservations whose owner still matches
    ///
    /// Addresses that are not reserved, or reserved by someone else, are
    /// skipped. Nothing is written when no reservation matches.
    pub async fn release(
        &self,
        ctx: &CallContext,
        pool: &str,
        ips: &[IpAndOwnerKey],
    ) -> Result<()> {
        let released = retry_on_conflict(&self.config.retry, ctx, pool, move |_| async move {
            let record = self.store.get(pool).await?;
            let Some((status, released)) = plan_release(&record, ips) else {
                return Ok(Attempt::Done(Vec::new()));
            };

            match self.write_status(&record, status).await? {
                CasOutcome::Swapped(_) => Ok(Attempt::Done(released)),
                CasOutcome::Conflict => Ok(Attempt::Conflict),
            }
        })
        .await?;

        if released.is_empty() {
            tracing::debug!(
                pool = %pool,
                requested = ips.len(),
                "No matching reservation to release"
            );
        } else {
            tracing::info!(pool = %pool, ips = ?released, "Released IPs");
        }
        Ok(())
    }

    /// Point existing reservations at a new owner
    ///
    /// Every address must already be reserved in the pool, otherwise
    /// [`Error::NotAllocated`] is returned and nothing is written.
    pub async fn update_allocated_ips(
        &self,
        ctx: &CallContext,
        pool: &str,
        ips: &[IpAndOwner],
    ) -> Result<()> {
        let updated = retry_on_conflict(&self.config.retry, ctx, pool, move |_| async move {
            let record = self.store.get(pool).await?;
            let Some((status, updated)) = plan_owner_update(&record, ips)? else {
                return Ok(Attempt::Done(0));
            };

            match self.write_status(&record, status).await? {
                CasOutcome::Swapped(_) => Ok(Attempt::Done(updated)),
                CasOutcome::Conflict => Ok(Attempt::Conflict),
            }
        })
        .await?;

        if updated == 0 {
            tracing::debug!(pool = %pool, "Reservation owners already up to date");
        } else {
            tracing::info!(pool = %pool, updated, "Updated reservation owners");
        }
        Ok(())
    }

    async fn write_status(&self, record: &IpPool, status: IpPoolStatus) -> Result<CasOutcome> {
        self.store
            .compare_and_swap_status(record.name(), record.resource_version(), status)
            .await
    }
}

/// Next status plus the address it hands out
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AllocationPlan {
    pub(crate) status: IpPoolStatus,
    pub(crate) allocated: AllocatedIp,
}

/// Pick the first free address of a pool and record it
pub(crate) fn plan_allocation(
    record: &IpPool,
    reserved: &[AddressRange],
    interface: &str,
    owner: &OwnerReference,
    max_allocated_ips: i64,
) -> Result<AllocationPlan> {
    let version = record.spec.version()?;
    let subnet = record.spec.address_space()?;
    if subnet.version() != version {
        return Err(Error::WrongInput(format!(
            "pool {} declares {} but its subnet {} is {}",
            record.name(),
            version,
            subnet.base(),
            subnet.version()
        )));
    }

    let reserved = AddressSet::from_ranges(
        version,
        reserved.iter().copied().filter(|r| r.version() == version),
    )?;
    let used = AddressSet::from_addrs(version, reserved_addresses(record, version))?;
    let available = subnet.address_set().difference(&reserved.union(&used)?)?;

    let address = available.first().ok_or_else(|| Error::IpUsedOut {
        pool: record.name().to_string(),
        reason: format!("all {} addresses are in use", subnet.total_ip()),
    })?;

    let count = record.status.allocated_ip_count.unwrap_or(0).saturating_add(1);
    if count > max_allocated_ips {
        return Err(Error::IpUsedOut {
            pool: record.name().to_string(),
            reason: format!("reservation count would exceed {}", max_allocated_ips),
        });
    }

    let mut status = record.status.clone();
    status.allocated_ips.insert(
        address.to_string(),
        PoolIpAllocation {
            interface: interface.to_string(),
            owner: owner.clone(),
        },
    );
    status.allocated_ip_count = Some(count);
    status.total_ip_count = Some(subnet.total_ip_int());

    let gateway = record
        .spec
        .gateway
        .as_deref()
        .map(|gw| version.parse_addr(gw))
        .transpose()?;

    Ok(AllocationPlan {
        status,
        allocated: AllocatedIp {
            pool: record.name().to_string(),
            address,
            prefix_len: subnet.prefix_len(),
            version,
            gateway,
            routes: record.spec.routes.clone(),
            interface: interface.to_string(),
        },
    })
}

/// Status without the matching reservations, or `None` if nothing matched
pub(crate) fn plan_release(
    record: &IpPool,
    ips: &[IpAndOwnerKey],
) -> Option<(IpPoolStatus, Vec<IpAddr>)> {
    let mut status = record.status.clone();
    let mut released = Vec::new();

    for request in ips {
        let Some(key) = find_reservation(&status, &request.ip) else {
            continue;
        };
        let owned = status
            .allocated_ips
            .get(&key)
            .is_some_and(|entry| entry.owner.key() == request.owner);
        if owned {
            status.allocated_ips.remove(&key);
            released.push(request.ip);
        }
    }

    if released.is_empty() {
        return None;
    }

    let count = status.allocated_ip_count.unwrap_or(0) - released.len() as i64;
    status.allocated_ip_count = Some(count.max(0));
    Some((status, released))
}

/// Status with re-keyed owners, or `None` if every owner already matches
pub(crate) fn plan_owner_update(
    record: &IpPool,
    ips: &[IpAndOwner],
) -> Result<Option<(IpPoolStatus, usize)>> {
    let mut status = record.status.clone();
    let mut updated = 0;

    for request in ips {
        let key = find_reservation(&status, &request.ip).ok_or_else(|| Error::NotAllocated {
            pool: record.name().to_string(),
            ip: request.ip.to_string(),
        })?;
        if let Some(entry) = status.allocated_ips.get_mut(&key) {
            if entry.owner != request.owner {
                entry.owner = request.owner.clone();
                updated += 1;
            }
        }
    }

    Ok((updated > 0).then_some((status, updated)))
}

/// Key of the reservation for `ip`, tolerating non-canonical address text
fn find_reservation(status: &IpPoolStatus, ip: &IpAddr) -> Option<String> {
    let text = ip.to_string();
    if status.allocated_ips.contains_key(&text) {
        return Some(text);
    }
    status
        .allocated_ips
        .keys()
        .find(|key| {
            key.parse::<IpAddr>().ok().map(|a| a.to_canonical()) == Some(ip.to_canonical())
        })
        .cloned()
}

/// Addresses of the pool's family that currently hold a reservation
fn reserved_addresses(record: &IpPool, version: IpVersion) -> Vec<IpAddr> {
    record
        .status
        .allocated_ips
        .keys()
        .filter_map(|key| match key.parse::<IpAddr>() {
            Ok(addr) => Some(addr.to_canonical()),
            Err(_) => {
                tracing::warn!(
                    pool = %record.name(),
                    key = %key,
                    "Skipping unparsable allocation key"
                );
                None
            }
        })
        .filter(|addr| IpVersion::of(addr) == version)
        .collect()
}
