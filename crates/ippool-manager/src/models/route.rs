//! Static routes handed out with a pool's addresses

use crate::address::{cidr, IpVersion};
use crate::Result;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Route installed on an interface that takes an address from the pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Destination CIDR (e.g., "10.96.0.0/12")
    pub dst: String,
    /// Next hop, must lie inside the pool subnet
    pub gw: String,
}

impl Route {
    pub fn new(dst: impl Into<String>, gw: impl Into<String>) -> Self {
        Self {
            dst: dst.into(),
            gw: gw.into(),
        }
    }

    /// Parsed destination of the given family
    pub fn destination(&self, version: IpVersion) -> Result<IpNet> {
        cidr::parse_cidr(&self.dst, version)
    }

    /// Parsed next hop of the given family
    pub fn next_hop(&self, version: IpVersion) -> Result<IpAddr> {
        version.parse_addr(&self.gw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_parts() {
        let route = Route::new("10.96.0.0/12", "172.18.40.1");
        assert_eq!(route.destination(IpVersion::V4).unwrap().prefix_len(), 12);
        assert_eq!(
            route.next_hop(IpVersion::V4).unwrap(),
            "172.18.40.1".parse::<IpAddr>().unwrap()
        );
        assert!(route.next_hop(IpVersion::V6).is_err());
    }

    #[test]
    fn test_route_serde_field_names() {
        let json = serde_json::to_value(Route::new("fd00:1::/64", "fd00::1")).unwrap();
        assert_eq!(json["dst"], "fd00:1::/64");
        assert_eq!(json["gw"], "fd00::1");
    }
}
