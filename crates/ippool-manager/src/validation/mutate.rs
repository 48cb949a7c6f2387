//! Normalisation applied to pool records before they are validated
//!
//! Users may omit `ipVersion` and write overlapping or unsorted range lists.
//! The mutator fills in the family, merges the lists into canonical range
//! text and refreshes `status.totalIPCount`. Entries that do not parse are
//! left untouched so the validator can report them against their index.

use crate::address::{cidr, merge_ranges, IpVersion};
use crate::models::IpPool;
use ipnet::IpNet;
use std::str::FromStr;

/// Normalise `pool` in place
pub fn mutate_pool(pool: &mut IpPool) {
    if pool.spec.ip_version.is_none() {
        if let Ok(net) = IpNet::from_str(pool.spec.subnet.trim()) {
            let version = cidr::version_of(&net);
            tracing::debug!(pool = %pool.name(), %version, "Inferred ipVersion from subnet");
            pool.spec.ip_version = Some(version.number());
        }
    }

    let Some(version) = pool.spec.ip_version.and_then(IpVersion::from_number) else {
        return;
    };

    if let Some(merged) = merge_entries(version, &pool.spec.ips) {
        pool.spec.ips = merged;
    }
    if let Some(merged) = merge_entries(version, &pool.spec.exclude_ips) {
        pool.spec.exclude_ips = merged;
    }

    if let Ok(space) = pool.spec.address_space() {
        pool.status.total_ip_count = Some(space.total_ip_int());
    }
}

fn merge_entries(version: IpVersion, entries: &[String]) -> Option<Vec<String>> {
    if entries.is_empty() {
        return None;
    }
    merge_ranges(version, entries).ok()
}
