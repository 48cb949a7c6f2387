//! Admission checks for pool records
//!
//! The checks guard the same invariants the allocator relies on: one family
//! per pool, every range inside a well-formed subnet, no address shared by two
//! pools, gateway and routes reachable but never allocatable, and no live
//! reservation orphaned by shrinking a pool.
//!
//! Version legality and CIDR well-formedness gate everything else; once they
//! pass, all remaining violations are collected in one [`FieldErrors`].

use super::field::{FieldError, FieldErrors};
use crate::address::{cidr, overlapping_ranges, AddressRange, AddressSet, IpVersion, Subnet};
use crate::config::IpamConfig;
use crate::models::IpPool;
use crate::store::{PoolSelector, PoolStore};
use crate::{Error, Result};
use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;

/// Well-formed header of a pool spec, produced by the gating checks
struct CheckedHeader {
    version: IpVersion,
    base: IpNet,
}

/// Validates pool records on create and update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInvariantValidator {
    enable_ipv4: bool,
    enable_ipv6: bool,
}

impl Default for PoolInvariantValidator {
    fn default() -> Self {
        Self {
            enable_ipv4: true,
            enable_ipv6: true,
        }
    }
}

impl PoolInvariantValidator {
    pub fn new(enable_ipv4: bool, enable_ipv6: bool) -> Self {
        Self {
            enable_ipv4,
            enable_ipv6,
        }
    }

    pub fn from_config(config: &IpamConfig) -> Self {
        Self::new(config.enable_ipv4, config.enable_ipv6)
    }

    /// Check a new pool against its siblings and optional parent subnet
    pub fn validate_create(
        &self,
        pool: &IpPool,
        siblings: &[IpPool],
        parent: Option<&IpPool>,
    ) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let Some(header) = self.check_header(pool, &mut errors) else {
            return errors;
        };
        self.check_body(pool, &header, siblings, parent, &mut errors);
        errors
    }

    /// Check a changed pool; `old` is the record currently stored
    ///
    /// On top of the create checks, `spec.ipVersion` and `spec.subnet` may not
    /// change and every address reserved in `old` must stay allocatable.
    pub fn validate_update(
        &self,
        old: &IpPool,
        new: &IpPool,
        siblings: &[IpPool],
        parent: Option<&IpPool>,
    ) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if old.spec.ip_version.is_some() && old.spec.ip_version != new.spec.ip_version {
            errors.push(FieldError::forbidden("spec.ipVersion", "field is immutable"));
        }
        if old.spec.subnet.trim() != new.spec.subnet.trim() {
            errors.push(FieldError::forbidden("spec.subnet", "field is immutable"));
        }
        if !errors.is_empty() {
            return errors;
        }

        let Some(header) = self.check_header(new, &mut errors) else {
            return errors;
        };
        if let Some(subnet) = self.check_body(new, &header, siblings, parent, &mut errors) {
            check_shrink(old, &subnet, &mut errors);
        }
        errors
    }

    /// [`Self::validate_create`] with siblings and parent loaded from `store`
    pub async fn admit_create(&self, store: &dyn PoolStore, pool: &IpPool) -> Result<()> {
        let mut errors = FieldErrors::new();
        let (siblings, parent) = load_context(store, pool, &mut errors).await?;
        errors.extend(self.validate_create(pool, &siblings, parent.as_ref()));
        log_outcome(pool, &errors);
        errors.into_result()
    }

    /// [`Self::validate_update`] with siblings and parent loaded from `store`
    pub async fn admit_update(
        &self,
        store: &dyn PoolStore,
        old: &IpPool,
        new: &IpPool,
    ) -> Result<()> {
        let mut errors = FieldErrors::new();
        let (siblings, parent) = load_context(store, new, &mut errors).await?;
        errors.extend(self.validate_update(old, new, &siblings, parent.as_ref()));
        log_outcome(new, &errors);
        errors.into_result()
    }

    /// Version legality and CIDR well-formedness
    fn check_header(&self, pool: &IpPool, errors: &mut FieldErrors) -> Option<CheckedHeader> {
        let Some(raw) = pool.spec.ip_version else {
            errors.push(FieldError::required("spec.ipVersion", "must be 4 or 6"));
            return None;
        };
        let Some(version) = IpVersion::from_number(raw) else {
            errors.push(FieldError::not_supported("spec.ipVersion", raw, "must be 4 or 6"));
            return None;
        };

        let enabled = match version {
            IpVersion::V4 => self.enable_ipv4,
            IpVersion::V6 => self.enable_ipv6,
        };
        if !enabled {
            errors.push(FieldError::forbidden(
                "spec.ipVersion",
                format!("{} is disabled in this cluster", version),
            ));
            return None;
        }

        match cidr::parse_canonical_cidr(&pool.spec.subnet, version) {
            Ok(base) => Some(CheckedHeader { version, base }),
            Err(e) => {
                errors.push(FieldError::invalid("spec.subnet", &pool.spec.subnet, e.to_string()));
                None
            }
        }
    }

    /// Everything after the gate; returns the address space when it can be built
    fn check_body(
        &self,
        pool: &IpPool,
        header: &CheckedHeader,
        siblings: &[IpPool],
        parent: Option<&IpPool>,
        errors: &mut FieldErrors,
    ) -> Option<Subnet> {
        let before = errors.len();
        let ips = parse_entries("spec.ips", &pool.spec.ips, header, errors);
        parse_entries("spec.excludeIPs", &pool.spec.exclude_ips, header, errors);

        for (i, a) in ips.iter().enumerate() {
            for b in &ips[i + 1..] {
                if a.overlaps(b) {
                    errors.push(FieldError::invalid(
                        "spec.ips",
                        b,
                        format!("overlaps with {}", a),
                    ));
                }
            }
        }

        if errors.len() > before {
            check_gateway(pool, header, None, errors);
            check_routes(pool, header, errors);
            return None;
        }

        let subnet = match pool.spec.address_space() {
            Ok(subnet) => subnet,
            Err(e) => {
                errors.push(FieldError::invalid(
                    "spec.ips",
                    pool.spec.ips.join(","),
                    e.to_string(),
                ));
                return None;
            }
        };

        check_siblings(pool, header, &ips, siblings, errors);
        check_gateway(pool, header, Some(&subnet), errors);
        check_routes(pool, header, errors);
        if let Some(parent) = parent {
            check_parent(pool, header, &subnet, parent, errors);
        }

        Some(subnet)
    }
}

/// Parse `ips` or `excludeIPs` entries, recording each bad one
fn parse_entries(
    field: &str,
    entries: &[String],
    header: &CheckedHeader,
    errors: &mut FieldErrors,
) -> Vec<AddressRange> {
    let base = AddressRange::from_net(&header.base);
    let mut ranges = Vec::with_capacity(entries.len());

    for (i, text) in entries.iter().enumerate() {
        let path = format!("{}[{}]", field, i);
        match AddressRange::parse(text, header.version) {
            Ok(range) if base.covers(&range) => ranges.push(range),
            Ok(range) => errors.push(FieldError::invalid(
                path,
                range,
                format!("not within subnet {}", header.base),
            )),
            Err(e) => errors.push(FieldError::invalid(path, text, e.to_string())),
        }
    }
    ranges
}

/// Same subnet: `ips` must not intersect; overlapping subnets: forbidden
fn check_siblings(
    pool: &IpPool,
    header: &CheckedHeader,
    ips: &[AddressRange],
    siblings: &[IpPool],
    errors: &mut FieldErrors,
) {
    for sibling in siblings {
        if sibling.name() == pool.name() {
            continue;
        }
        if sibling.spec.version().ok() != Some(header.version) {
            continue;
        }

        let sibling_base = match cidr::parse_cidr(&sibling.spec.subnet, header.version) {
            Ok(net) => net.trunc(),
            Err(e) => {
                tracing::warn!(
                    pool = %sibling.name(),
                    error = %e,
                    "Skipping sibling pool with unparsable subnet"
                );
                continue;
            }
        };

        if sibling_base == header.base {
            let sibling_ips = match AddressSet::parse(header.version, &sibling.spec.ips) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(
                        pool = %sibling.name(),
                        error = %e,
                        "Skipping sibling pool with unparsable ips"
                    );
                    continue;
                }
            };
            for (ours, theirs) in overlapping_ranges(ips, sibling_ips.ranges()) {
                errors.push(FieldError::forbidden(
                    "spec.ips",
                    format!("{} overlaps with {} of IPPool {}", ours, theirs, sibling.name()),
                ));
            }
        } else if cidr::cidrs_overlap(&sibling_base, &header.base) {
            errors.push(FieldError::forbidden(
                "spec.subnet",
                format!(
                    "{} overlaps with subnet {} of IPPool {}",
                    header.base,
                    sibling_base,
                    sibling.name()
                ),
            ));
        }
    }
}

/// Gateway inside the subnet but outside the allocatable space
fn check_gateway(
    pool: &IpPool,
    header: &CheckedHeader,
    subnet: Option<&Subnet>,
    errors: &mut FieldErrors,
) {
    let Some(text) = pool.spec.gateway.as_deref() else {
        return;
    };
    let gateway = match header.version.parse_addr(text) {
        Ok(addr) => addr,
        Err(e) => {
            errors.push(FieldError::invalid("spec.gateway", text, e.to_string()));
            return;
        }
    };

    if !header.base.contains(&gateway) {
        errors.push(FieldError::invalid(
            "spec.gateway",
            text,
            format!("not within subnet {}", header.base),
        ));
    } else if subnet.is_some_and(|s| s.contains(&gateway)) {
        errors.push(FieldError::invalid(
            "spec.gateway",
            text,
            "conflicts with spec.ips, add it to spec.excludeIPs",
        ));
    }
}

/// Valid, unique, non-default destinations with next hops inside the subnet
fn check_routes(pool: &IpPool, header: &CheckedHeader, errors: &mut FieldErrors) {
    let mut seen: HashSet<IpNet> = HashSet::new();

    for (i, route) in pool.spec.routes.iter().enumerate() {
        let dst_path = format!("spec.routes[{}].dst", i);
        match route.destination(header.version) {
            Ok(dst) if cidr::is_default_route(&dst) => {
                errors.push(FieldError::invalid(
                    dst_path,
                    &route.dst,
                    "default route is set through spec.gateway",
                ));
            }
            Ok(dst) => {
                if !seen.insert(dst.trunc()) {
                    errors.push(FieldError::duplicate(dst_path, &route.dst));
                }
            }
            Err(e) => errors.push(FieldError::invalid(dst_path, &route.dst, e.to_string())),
        }

        let gw_path = format!("spec.routes[{}].gw", i);
        match route.next_hop(header.version) {
            Ok(gw) if header.base.contains(&gw) => {}
            Ok(_) => errors.push(FieldError::invalid(
                gw_path,
                &route.gw,
                format!("not within subnet {}", header.base),
            )),
            Err(e) => errors.push(FieldError::invalid(gw_path, &route.gw, e.to_string())),
        }
    }
}

/// Every address reserved in the stored record must remain allocatable
fn check_shrink(old: &IpPool, subnet: &Subnet, errors: &mut FieldErrors) {
    for key in old.status.allocated_ips.keys() {
        let still_valid = key
            .parse::<IpAddr>()
            .map(|addr| subnet.contains(&addr.to_canonical()))
            .unwrap_or(false);
        if !still_valid {
            errors.push(FieldError::forbidden(
                "spec.ips",
                format!("removes IP {} which is still allocated", key),
            ));
        }
    }
}

/// Pool must live in the parent's subnet and inside its address space
fn check_parent(
    pool: &IpPool,
    header: &CheckedHeader,
    subnet: &Subnet,
    parent: &IpPool,
    errors: &mut FieldErrors,
) {
    let parent_space = match parent.spec.address_space() {
        Ok(space) => space,
        Err(e) => {
            errors.push(FieldError::invalid(
                "spec.controllerSubnet",
                parent.name(),
                format!("parent subnet is not usable: {}", e),
            ));
            return;
        }
    };

    if *parent_space.base() != header.base {
        errors.push(FieldError::invalid(
            "spec.subnet",
            &pool.spec.subnet,
            format!("must equal subnet {} of {}", parent_space.base(), parent.name()),
        ));
        return;
    }

    match subnet.address_set().difference(parent_space.address_set()) {
        Ok(outside) if outside.is_empty() => {}
        Ok(outside) => errors.push(FieldError::forbidden(
            "spec.ips",
            format!("{} not within subnet {}", outside, parent.name()),
        )),
        Err(e) => errors.push(FieldError::invalid(
            "spec.controllerSubnet",
            parent.name(),
            e.to_string(),
        )),
    }
}

/// Same-family pools other than `pool`, its parent and its children; plus the parent
async fn load_context(
    store: &dyn PoolStore,
    pool: &IpPool,
    errors: &mut FieldErrors,
) -> Result<(Vec<IpPool>, Option<IpPool>)> {
    let Ok(version) = pool.spec.version() else {
        return Ok((Vec::new(), None));
    };

    let parent_name = pool.spec.controller_subnet.as_deref();
    let parent = match parent_name {
        Some(name) => match store.get(name).await {
            Ok(parent) => Some(parent),
            Err(Error::PoolNotFound(_)) => {
                errors.push(FieldError::invalid(
                    "spec.controllerSubnet",
                    name,
                    "subnet does not exist",
                ));
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let siblings = store
        .list(&PoolSelector::ip_version(version))
        .await?
        .into_iter()
        .filter(|other| other.name() != pool.name())
        .filter(|other| Some(other.name()) != parent_name)
        .filter(|other| other.spec.controller_subnet.as_deref() != Some(pool.name()))
        .collect();

    Ok((siblings, parent))
}

fn log_outcome(pool: &IpPool, errors: &FieldErrors) {
    if errors.is_empty() {
        tracing::debug!(pool = %pool.name(), "Admission checks passed");
    } else {
        tracing::info!(pool = %pool.name(), violations = errors.len(), "Admission denied");
    }
}
