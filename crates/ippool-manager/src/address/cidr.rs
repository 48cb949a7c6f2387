//! CIDR parsing helpers shared by the Subnet model and the validators

use super::range::IpVersion;
use crate::{Error, Result};
use ipnet::IpNet;
use std::str::FromStr;

/// Parse CIDR text of the given family without requiring canonical form
pub fn parse_cidr(text: &str, version: IpVersion) -> Result<IpNet> {
    let trimmed = text.trim();
    let net = IpNet::from_str(trimmed)
        .map_err(|_| Error::invalid_format(trimmed, "not a valid CIDR"))?;
    if version_of(&net) != version {
        return Err(Error::invalid_format(
            trimmed,
            format!("expected an {} CIDR", version),
        ));
    }
    if let IpNet::V6(v6) = net {
        if v6.network().to_ipv4_mapped().is_some() {
            return Err(Error::invalid_format(
                trimmed,
                "IPv4-mapped network is not an IPv6 CIDR",
            ));
        }
    }
    Ok(net)
}

/// Parse CIDR text and require the host bits to be zero
///
/// `172.18.40.1/24` is rejected; `172.18.40.0/24` is accepted.
pub fn parse_canonical_cidr(text: &str, version: IpVersion) -> Result<IpNet> {
    let net = parse_cidr(text, version)?;
    if net.addr() != net.network() {
        return Err(Error::invalid_format(
            text.trim(),
            format!("host bits are set, the network is {}", net.trunc()),
        ));
    }
    Ok(net)
}

pub fn version_of(net: &IpNet) -> IpVersion {
    match net {
        IpNet::V4(_) => IpVersion::V4,
        IpNet::V6(_) => IpVersion::V6,
    }
}

/// Whether two networks share any address
pub fn cidrs_overlap(a: &IpNet, b: &IpNet) -> bool {
    version_of(a) == version_of(b) && (a.contains(&b.network()) || b.contains(&a.network()))
}

/// `0.0.0.0/0` and `::/0`
pub fn is_default_route(net: &IpNet) -> bool {
    net.prefix_len() == 0
}
