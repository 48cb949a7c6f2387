//! Allocatable address space of one pool
//!
//! A [`Subnet`] is a base network, the `ips` ranges requested inside it, and
//! the `excludeIPs` ranges carved back out. It is rebuilt from a pool's spec
//! on every validation and allocation call; only the textual spec is ever
//! persisted.

use super::cidr::version_of;
use super::range::{AddressRange, IpVersion};
use super::set::AddressSet;
use crate::{Error, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;

/// Base network plus included ranges minus excluded ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    base: IpNet,
    ranges: AddressSet,
}

impl Subnet {
    /// Build the address space of a pool
    ///
    /// Include ranges must be pairwise disjoint: an identical or partially
    /// overlapping range fails with [`Error::Overlap`], a containing or
    /// contained one with [`Error::Covers`]. Include ranges are expected to be
    /// normalised (merged) before they get here. Exclude ranges are
    /// subtracted, splitting include ranges where needed.
    pub fn new<I, E>(base_cidr: &str, include: &[I], exclude: &[E]) -> Result<Self>
    where
        I: AsRef<str>,
        E: AsRef<str>,
    {
        let base = IpNet::from_str(base_cidr.trim())
            .map_err(|_| Error::invalid_format(base_cidr, "not a valid CIDR"))?
            .trunc();
        let version = version_of(&base);
        let base_range = AddressRange::from_net(&base);

        let mut included: Vec<AddressRange> = Vec::with_capacity(include.len());
        for text in include {
            let range = parse_in_base(text.as_ref(), version, &base, &base_range)?;
            for existing in &included {
                check_include_conflict(existing, &range)?;
            }
            included.push(range);
        }

        let excluded = exclude
            .iter()
            .map(|text| parse_in_base(text.as_ref(), version, &base, &base_range))
            .collect::<Result<Vec<_>>>()?;

        let ranges = AddressSet::from_ranges(version, included)?
            .difference(&AddressSet::from_ranges(version, excluded)?)?;

        Ok(Self { base, ranges })
    }

    pub fn base(&self) -> &IpNet {
        &self.base
    }

    pub fn version(&self) -> IpVersion {
        self.ranges.version()
    }

    pub fn prefix_len(&self) -> u8 {
        self.base.prefix_len()
    }

    /// Final allocatable address set
    pub fn address_set(&self) -> &AddressSet {
        &self.ranges
    }

    pub fn ranges(&self) -> &[AddressRange] {
        self.ranges.ranges()
    }

    /// Number of addresses, saturating at `u128::MAX`
    pub fn total_ip(&self) -> u128 {
        self.ranges.len()
    }

    /// Number of addresses as a record count, saturating at `i64::MAX`
    pub fn total_ip_int(&self) -> i64 {
        i64::try_from(self.total_ip()).unwrap_or(i64::MAX)
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.ranges.contains(addr)
    }

    /// Candidate ranges that share an address with this subnet
    ///
    /// Meant for comparing two different pools; ranges of another IP family
    /// never overlap.
    pub fn overlapping(&self, candidates: &[AddressRange]) -> Vec<String> {
        candidates
            .iter()
            .filter(|candidate| self.ranges().iter().any(|r| r.overlaps(candidate)))
            .map(|candidate| candidate.to_string())
            .collect()
    }
}

fn parse_in_base(
    text: &str,
    version: IpVersion,
    base: &IpNet,
    base_range: &AddressRange,
) -> Result<AddressRange> {
    let range = AddressRange::parse(text, version)?;
    if !base_range.covers(&range) {
        return Err(Error::OutOfBase {
            range: range.to_string(),
            base: base.to_string(),
        });
    }
    Ok(range)
}

fn check_include_conflict(existing: &AddressRange, candidate: &AddressRange) -> Result<()> {
    if existing == candidate {
        return Err(Error::Overlap {
            first: existing.to_string(),
            second: candidate.to_string(),
        });
    }
    if candidate.covers(existing) {
        return Err(Error::Covers {
            outer: candidate.to_string(),
            inner: existing.to_string(),
        });
    }
    if existing.covers(candidate) {
        return Err(Error::Covers {
            outer: existing.to_string(),
            inner: candidate.to_string(),
        });
    }
    if existing.overlaps(candidate) {
        return Err(Error::Overlap {
            first: existing.to_string(),
            second: candidate.to_string(),
        });
    }
    Ok(())
}
