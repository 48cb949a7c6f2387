//! Sets of addresses kept as sorted, merged ranges
//!
//! Every operation runs over ranges, never over individual addresses, so an
//! IPv6 /64 costs the same as a single host.

use super::range::{AddressRange, IpVersion};
use crate::{Error, Result};
use std::fmt;
use std::net::IpAddr;

/// Canonical set of addresses of one IP family
///
/// Ranges are sorted ascending and no two of them overlap or touch. Every
/// constructor merges its input, so a value of this type is always canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressSet {
    version: IpVersion,
    ranges: Vec<AddressRange>,
}

impl AddressSet {
    /// Set with no addresses
    pub fn empty(version: IpVersion) -> Self {
        Self {
            version,
            ranges: Vec::new(),
        }
    }

    /// Build from ranges in any order, merging overlaps and neighbours
    pub fn from_ranges(
        version: IpVersion,
        ranges: impl IntoIterator<Item = AddressRange>,
    ) -> Result<Self> {
        let mut collected = Vec::new();
        for range in ranges {
            if range.version() != version {
                return Err(Error::invalid_format(
                    range.to_string(),
                    format!("expected an {} range", version),
                ));
            }
            collected.push(range);
        }
        Ok(Self {
            version,
            ranges: canonicalize(collected),
        })
    }

    /// Build from individual addresses
    pub fn from_addrs(version: IpVersion, addrs: impl IntoIterator<Item = IpAddr>) -> Result<Self> {
        let ranges = addrs.into_iter().map(|addr| {
            if IpVersion::of(&addr) != version {
                return Err(Error::invalid_format(
                    addr.to_string(),
                    format!("expected an {} address", version),
                ));
            }
            Ok(AddressRange::single(addr))
        });
        Self::from_ranges(version, ranges.collect::<Result<Vec<_>>>()?)
    }

    /// Parse `"ip"` / `"ip1-ip2"` texts
    pub fn parse<S: AsRef<str>>(version: IpVersion, texts: &[S]) -> Result<Self> {
        let ranges = texts
            .iter()
            .map(|text| AddressRange::parse(text.as_ref(), version))
            .collect::<Result<Vec<_>>>()?;
        Self::from_ranges(version, ranges)
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of addresses, saturating at `u128::MAX`
    pub fn len(&self) -> u128 {
        self.ranges
            .iter()
            .fold(0u128, |total, range| total.saturating_add(range.len()))
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        if IpVersion::of(addr) != self.version {
            return false;
        }
        let probe = AddressRange::single(*addr);
        // First range whose end is not below the address
        let idx = self
            .ranges
            .partition_point(|r| r.end_bits() < probe.start_bits());
        self.ranges.get(idx).is_some_and(|r| r.contains(addr))
    }

    /// Numerically smallest address in the set
    pub fn first(&self) -> Option<IpAddr> {
        self.ranges.first().map(|r| r.start())
    }

    /// Ascending, lazy walk over every address
    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.ranges.iter().flat_map(|r| r.iter())
    }

    /// Canonical textual range list, e.g. `["10.0.0.1-10.0.0.9", "10.0.0.20"]`
    pub fn to_strings(&self) -> Vec<String> {
        self.ranges.iter().map(|r| r.to_string()).collect()
    }

    pub fn union(&self, other: &AddressSet) -> Result<AddressSet> {
        self.ensure_same_version(other)?;
        let merged = self
            .ranges
            .iter()
            .chain(other.ranges.iter())
            .copied()
            .collect();
        Ok(Self {
            version: self.version,
            ranges: canonicalize(merged),
        })
    }

    /// Addresses in `self` but not in `other`
    pub fn difference(&self, other: &AddressSet) -> Result<AddressSet> {
        self.ensure_same_version(other)?;
        let cuts = &other.ranges;
        let mut out = Vec::with_capacity(self.ranges.len());
        let mut first_cut = 0;

        for range in &self.ranges {
            let end = range.end_bits();
            let mut cursor = range.start_bits();
            let mut consumed = false;

            while first_cut < cuts.len() && cuts[first_cut].end_bits() < cursor {
                first_cut += 1;
            }

            for cut in cuts[first_cut..].iter().take_while(|c| c.start_bits() <= end) {
                if cut.start_bits() > cursor {
                    out.push(AddressRange::from_bits(
                        cursor,
                        cut.start_bits() - 1,
                        self.version,
                    ));
                }
                if cut.end_bits() >= end {
                    consumed = true;
                    break;
                }
                cursor = cursor.max(cut.end_bits() + 1);
            }

            if !consumed {
                out.push(AddressRange::from_bits(cursor, end, self.version));
            }
        }

        Ok(Self {
            version: self.version,
            ranges: out,
        })
    }

    pub fn intersection(&self, other: &AddressSet) -> Result<AddressSet> {
        self.ensure_same_version(other)?;
        let (a, b) = (&self.ranges, &other.ranges);
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            let lo = a[i].start_bits().max(b[j].start_bits());
            let hi = a[i].end_bits().min(b[j].end_bits());
            if lo <= hi {
                out.push(AddressRange::from_bits(lo, hi, self.version));
            }
            if a[i].end_bits() < b[j].end_bits() {
                i += 1;
            } else {
                j += 1;
            }
        }

        Ok(Self {
            version: self.version,
            ranges: out,
        })
    }

    /// Whether every address of `self` is also in `other`
    pub fn is_subset(&self, other: &AddressSet) -> Result<bool> {
        Ok(self.difference(other)?.is_empty())
    }

    fn ensure_same_version(&self, other: &AddressSet) -> Result<()> {
        if self.version != other.version {
            return Err(Error::WrongInput(format!(
                "cannot combine an {} address set with an {} address set",
                self.version, other.version
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_strings().join(", "))
    }
}

/// Sort and coalesce overlapping or adjacent ranges
fn canonicalize(mut ranges: Vec<AddressRange>) -> Vec<AddressRange> {
    ranges.sort();
    let mut out: Vec<AddressRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match out.last_mut() {
            Some(last)
                if last
                    .end_bits()
                    .checked_add(1)
                    .map_or(true, |next| range.start_bits() <= next) =>
            {
                if range.end_bits() > last.end_bits() {
                    *last = AddressRange::from_bits(
                        last.start_bits(),
                        range.end_bits(),
                        range.version(),
                    );
                }
            }
            _ => out.push(range),
        }
    }
    out
}

/// Coalesce individual addresses into canonical range text
pub fn merge_to_ranges(version: IpVersion, addrs: &[IpAddr]) -> Result<Vec<String>> {
    Ok(AddressSet::from_addrs(version, addrs.iter().copied())?.to_strings())
}

/// Coalesce range texts into canonical range text
pub fn merge_ranges<S: AsRef<str>>(version: IpVersion, texts: &[S]) -> Result<Vec<String>> {
    Ok(AddressSet::parse(version, texts)?.to_strings())
}

/// Every pair `(a, b)` drawn from the two lists that shares an address
pub fn overlapping_ranges(
    first: &[AddressRange],
    second: &[AddressRange],
) -> Vec<(AddressRange, AddressRange)> {
    first
        .iter()
        .flat_map(|a| {
            second
                .iter()
                .filter(move |b| a.overlaps(b))
                .map(move |b| (*a, *b))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn set(texts: &[&str]) -> AddressSet {
        AddressSet::parse(IpVersion::V4, texts).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        IpAddr::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_merges_overlaps_and_neighbours() {
        let s = set(&["10.0.0.5-10.0.0.9", "10.0.0.1-10.0.0.4", "10.0.0.8-10.0.0.12", "10.0.0.20"]);
        assert_eq!(s.to_strings(), vec!["10.0.0.1-10.0.0.12", "10.0.0.20"]);
        assert_eq!(s.len(), 13);
    }

    #[test]
    fn test_difference_splits_ranges() {
        let total = set(&["10.0.0.1-10.0.0.10"]);
        let cut = set(&["10.0.0.3", "10.0.0.6-10.0.0.7", "10.0.0.10-10.0.0.20"]);
        let diff = total.difference(&cut).unwrap();
        assert_eq!(
            diff.to_strings(),
            vec!["10.0.0.1-10.0.0.2", "10.0.0.4-10.0.0.5", "10.0.0.8-10.0.0.9"]
        );
    }

    #[test]
    fn test_difference_cut_spanning_several_ranges() {
        let total = set(&["10.0.0.1-10.0.0.3", "10.0.0.5-10.0.0.7", "10.0.0.9-10.0.0.11"]);
        let cut = set(&["10.0.0.2-10.0.0.10"]);
        let diff = total.difference(&cut).unwrap();
        assert_eq!(diff.to_strings(), vec!["10.0.0.1", "10.0.0.11"]);
    }

    #[test]
    fn test_difference_with_self_is_empty() {
        let s = set(&["10.0.0.1-10.0.0.3", "10.0.0.9"]);
        assert!(s.difference(&s).unwrap().is_empty());
    }

    #[test]
    fn test_intersection() {
        let a = set(&["10.0.0.1-10.0.0.10", "10.0.0.20-10.0.0.30"]);
        let b = set(&["10.0.0.5-10.0.0.25"]);
        assert_eq!(
            a.intersection(&b).unwrap().to_strings(),
            vec!["10.0.0.5-10.0.0.10", "10.0.0.20-10.0.0.25"]
        );
    }

    #[test]
    fn test_union_of_versions_is_rejected() {
        let a = set(&["10.0.0.1"]);
        let b = AddressSet::parse(IpVersion::V6, &["fd00::1"]).unwrap();
        assert!(matches!(a.union(&b), Err(Error::WrongInput(_))));
    }

    #[test]
    fn test_contains_and_first() {
        let s = set(&["10.0.0.20-10.0.0.30", "10.0.0.5"]);
        assert_eq!(s.first(), Some(ip("10.0.0.5")));
        assert!(s.contains(&ip("10.0.0.25")));
        assert!(!s.contains(&ip("10.0.0.6")));
        assert!(!s.contains(&ip("fd00::5")));
    }

    #[test]
    fn test_merge_to_ranges() {
        let addrs = [ip("10.0.0.3"), ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.7")];
        assert_eq!(
            merge_to_ranges(IpVersion::V4, &addrs).unwrap(),
            vec!["10.0.0.1-10.0.0.3", "10.0.0.7"]
        );
        assert!(merge_to_ranges(IpVersion::V6, &addrs).is_err());
    }

    #[test]
    fn test_merge_ranges_ipv6() {
        let merged =
            merge_ranges(IpVersion::V6, &["fd00::10-fd00::1f", "fd00::1-fd00::f"]).unwrap();
        assert_eq!(merged, vec!["fd00::1-fd00::1f"]);
    }

    #[test]
    fn test_overlapping_ranges() {
        let a = set(&["10.0.0.1-10.0.0.10"]);
        let b = set(&["10.0.0.10-10.0.0.20", "10.0.0.30"]);
        let conflicts = overlapping_ranges(a.ranges(), b.ranges());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].1.to_string(), "10.0.0.10-10.0.0.20");

        let c = set(&["10.0.0.11"]);
        assert!(overlapping_ranges(a.ranges(), c.ranges()).is_empty());
    }

    #[test]
    fn test_whole_ipv6_space_does_not_overflow() {
        let all = AddressSet::parse(IpVersion::V6, &["::-ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"])
            .unwrap();
        assert_eq!(all.len(), u128::MAX);
        let merged = all
            .union(&AddressSet::parse(IpVersion::V6, &["fd00::1"]).unwrap())
            .unwrap();
        assert_eq!(merged.ranges().len(), 1);
    }
}
