//! Single contiguous IP intervals
//!
//! Addresses are widened to `u128` before any arithmetic so IPv4 and IPv6
//! share one implementation. IPv4-mapped IPv6 addresses are canonicalised to
//! plain IPv4 first, otherwise `::ffff:10.0.0.1` and `10.0.0.1` would compare
//! as different values. Mapped text is therefore never an IPv6 address: it is
//! rejected wherever IPv6 is required.

use crate::{Error, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IP address family of a pool, range or address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Map the numeric `ipVersion` record field (4 or 6)
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            4 => Some(IpVersion::V4),
            6 => Some(IpVersion::V6),
            _ => None,
        }
    }

    /// The numeric form stored in pool records
    pub fn number(self) -> i64 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Family of an address, after canonicalising IPv4-mapped IPv6
    pub fn of(addr: &IpAddr) -> Self {
        match addr.to_canonical() {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    /// Address width in bits
    pub fn bits(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Largest address value of this family
    pub(crate) fn max_value(self) -> u128 {
        match self {
            IpVersion::V4 => u32::MAX as u128,
            IpVersion::V6 => u128::MAX,
        }
    }

    /// Parse a bare address, requiring it to belong to this family
    pub fn parse_addr(self, text: &str) -> Result<IpAddr> {
        let text = text.trim();
        match self {
            IpVersion::V4 => text
                .parse::<Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|_| Error::invalid_format(text, "not a valid IPv4 address")),
            IpVersion::V6 => {
                let addr = text
                    .parse::<Ipv6Addr>()
                    .map_err(|_| Error::invalid_format(text, "not a valid IPv6 address"))?;
                if addr.to_ipv4_mapped().is_some() {
                    return Err(Error::invalid_format(
                        text,
                        "IPv4-mapped address is not an IPv6 address",
                    ));
                }
                Ok(IpAddr::V6(addr))
            }
        }
    }

    pub(crate) fn to_addr(self, value: u128) -> IpAddr {
        match self {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::from(value as u32)),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::from(value)),
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Integer value of an address
pub fn to_bits(addr: IpAddr) -> u128 {
    match addr.to_canonical() {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// The next address of the same family, `None` past the last address
pub fn successor(addr: IpAddr) -> Option<IpAddr> {
    let version = IpVersion::of(&addr);
    let value = to_bits(addr);
    if value == version.max_value() {
        return None;
    }
    Some(version.to_addr(value + 1))
}

/// The previous address of the same family, `None` before the first address
pub fn predecessor(addr: IpAddr) -> Option<IpAddr> {
    let version = IpVersion::of(&addr);
    let value = to_bits(addr).checked_sub(1)?;
    Some(version.to_addr(value))
}

/// Numeric order of two addresses. IPv4 sorts before IPv6.
pub fn compare(a: &IpAddr, b: &IpAddr) -> Ordering {
    IpVersion::of(a)
        .cmp(&IpVersion::of(b))
        .then_with(|| to_bits(*a).cmp(&to_bits(*b)))
}

/// Inclusive interval of addresses of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: u128,
    end: u128,
    version: IpVersion,
}

impl AddressRange {
    /// Create a range from two addresses of the same family with `start <= end`
    pub fn new(start: IpAddr, end: IpAddr) -> Result<Self> {
        let version = IpVersion::of(&start);
        if IpVersion::of(&end) != version {
            return Err(Error::invalid_format(
                format!("{}-{}", start, end),
                "range endpoints belong to different IP families",
            ));
        }
        let (lo, hi) = (to_bits(start), to_bits(end));
        if lo > hi {
            return Err(Error::invalid_format(
                format!("{}-{}", start, end),
                "range start is greater than range end",
            ));
        }
        Ok(Self::from_bits(lo, hi, version))
    }

    /// Range holding exactly one address
    pub fn single(addr: IpAddr) -> Self {
        let value = to_bits(addr);
        Self::from_bits(value, value, IpVersion::of(&addr))
    }

    pub(crate) fn from_bits(start: u128, end: u128, version: IpVersion) -> Self {
        debug_assert!(start <= end);
        debug_assert!(end <= version.max_value());
        Self {
            start,
            end,
            version,
        }
    }

    /// Parse `"ip"` or `"ip1-ip2"` text of the given family
    pub fn parse(text: &str, version: IpVersion) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_format(text, "empty IP range"));
        }

        let (lo, hi) = match trimmed.split_once('-') {
            Some((lo, hi)) => (version.parse_addr(lo)?, version.parse_addr(hi)?),
            None => {
                let addr = version.parse_addr(trimmed)?;
                (addr, addr)
            }
        };

        let (lo, hi) = (to_bits(lo), to_bits(hi));
        if lo > hi {
            return Err(Error::invalid_format(
                trimmed,
                "range start is greater than range end",
            ));
        }
        Ok(Self::from_bits(lo, hi, version))
    }

    /// Every address of a network, network and broadcast included
    ///
    /// Bits are taken as written, so an IPv6 network keeps its full 128-bit
    /// value even when it lies in the IPv4-mapped block.
    pub fn from_net(net: &IpNet) -> Self {
        match net.trunc() {
            IpNet::V4(n) => Self::from_bits(
                u32::from(n.network()) as u128,
                u32::from(n.broadcast()) as u128,
                IpVersion::V4,
            ),
            IpNet::V6(n) => Self::from_bits(
                u128::from(n.network()),
                u128::from(n.broadcast()),
                IpVersion::V6,
            ),
        }
    }

    pub fn start(&self) -> IpAddr {
        self.version.to_addr(self.start)
    }

    pub fn end(&self) -> IpAddr {
        self.version.to_addr(self.end)
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub(crate) fn start_bits(&self) -> u128 {
        self.start
    }

    pub(crate) fn end_bits(&self) -> u128 {
        self.end
    }

    /// Number of addresses, saturating at `u128::MAX` for the whole IPv6 space
    pub fn len(&self) -> u128 {
        (self.end - self.start).saturating_add(1)
    }

    /// A range always holds at least one address
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        IpVersion::of(addr) == self.version && {
            let value = to_bits(*addr);
            self.start <= value && value <= self.end
        }
    }

    /// Whether `other` lies entirely inside this range
    pub fn covers(&self, other: &AddressRange) -> bool {
        self.version == other.version && self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.version == other.version && self.start <= other.end && other.start <= self.end
    }

    /// Whether the two ranges touch without sharing an address
    pub fn is_adjacent(&self, other: &AddressRange) -> bool {
        self.version == other.version
            && (self.end.checked_add(1) == Some(other.start)
                || other.end.checked_add(1) == Some(self.start))
    }

    /// Lazily walk the addresses in ascending order
    pub fn iter(&self) -> RangeIter {
        RangeIter {
            next: Some(self.start),
            end: self.end,
            version: self.version,
        }
    }
}

impl PartialOrd for AddressRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddressRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start())
        } else {
            write!(f, "{}-{}", self.start(), self.end())
        }
    }
}

/// Ascending iterator over the addresses of one range
#[derive(Debug, Clone)]
pub struct RangeIter {
    next: Option<u128>,
    end: u128,
    version: IpVersion,
}

impl Iterator for RangeIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        let current = self.next?;
        self.next = if current < self.end {
            Some(current + 1)
        } else {
            None
        };
        Some(self.version.to_addr(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            Some(current) => {
                let remaining = usize::try_from(self.end - current)
                    .ok()
                    .and_then(|n| n.checked_add(1));
                (remaining.unwrap_or(usize::MAX), remaining)
            }
            None => (0, Some(0)),
        }
    }
}
