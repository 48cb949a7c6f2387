//! IP pool record and related models
//!
//! The record is owned by the control plane. Field names on the wire follow
//! the pool schema (`spec.excludeIPs`, `status.allocatedIPCount`, ...).

use super::owner::OwnerReference;
use super::route::Route;
use crate::address::{IpVersion, Subnet};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque version token used for compare-and-swap writes
///
/// Only a store creates new tokens; everyone else passes them back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Token for the write following this one
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub resource_version: ResourceVersion,
}

/// Desired address space of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPoolSpec {
    /// 4 or 6; inferred from `subnet` when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_version: Option<i64>,
    /// Base network (e.g., "172.18.40.0/24")
    pub subnet: String,
    /// Allocatable ranges, `"ip"` or `"ip1-ip2"`
    #[serde(default)]
    pub ips: Vec<String>,
    /// Ranges never handed out by this pool
    #[serde(default, rename = "excludeIPs")]
    pub exclude_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Parent subnet record when the pool was carved from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_subnet: Option<String>,
}

impl IpPoolSpec {
    pub fn new(version: IpVersion, subnet: impl Into<String>, ips: &[&str]) -> Self {
        Self {
            ip_version: Some(version.number()),
            subnet: subnet.into(),
            ips: ips.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Declared family, rejecting anything but 4 and 6
    pub fn version(&self) -> Result<IpVersion> {
        let raw = self
            .ip_version
            .ok_or_else(|| Error::WrongInput("spec.ipVersion is not set".to_string()))?;
        IpVersion::from_number(raw)
            .ok_or_else(|| Error::WrongInput(format!("invalid spec.ipVersion {}", raw)))
    }

    /// Allocatable address space described by this spec
    pub fn address_space(&self) -> Result<Subnet> {
        Subnet::new(&self.subnet, &self.ips, &self.exclude_ips)
    }
}

/// A single reservation in `status.allocatedIPs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolIpAllocation {
    /// Interface name inside the workload (e.g., "eth0")
    pub interface: String,
    pub owner: OwnerReference,
}

/// Observed allocations of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPoolStatus {
    /// Address text -> reservation
    #[serde(default, rename = "allocatedIPs")]
    pub allocated_ips: BTreeMap<String, PoolIpAllocation>,
    #[serde(default, rename = "allocatedIPCount", skip_serializing_if = "Option::is_none")]
    pub allocated_ip_count: Option<i64>,
    #[serde(default, rename = "totalIPCount", skip_serializing_if = "Option::is_none")]
    pub total_ip_count: Option<i64>,
}

/// An IP pool record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPool {
    pub metadata: ObjectMeta,
    pub spec: IpPoolSpec,
    #[serde(default)]
    pub status: IpPoolStatus,
}

impl IpPool {
    /// Create a record with an empty status
    pub fn new(name: impl Into<String>, spec: IpPoolSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                resource_version: ResourceVersion::default(),
            },
            spec,
            status: IpPoolStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn resource_version(&self) -> ResourceVersion {
        self.metadata.resource_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_pool_creation() {
        let pool = IpPool::new(
            "default-v4",
            IpPoolSpec::new(IpVersion::V4, "172.18.40.0/24", &["172.18.40.2-172.18.40.10"]),
        );

        assert_eq!(pool.name(), "default-v4");
        assert_eq!(pool.resource_version(), ResourceVersion::default());
        assert_eq!(pool.spec.version().unwrap(), IpVersion::V4);
        assert_eq!(pool.spec.address_space().unwrap().total_ip_int(), 9);
    }

    #[test]
    fn test_invalid_version() {
        let mut spec = IpPoolSpec::new(IpVersion::V4, "172.18.40.0/24", &[]);
        spec.ip_version = Some(5);
        assert!(matches!(spec.version(), Err(Error::WrongInput(_))));

        spec.ip_version = None;
        assert!(spec.version().is_err());
    }

    #[test]
    fn test_schema_field_names() {
        let mut pool = IpPool::new(
            "pool-a",
            IpPoolSpec::new(IpVersion::V4, "10.0.0.0/24", &["10.0.0.1-10.0.0.9"]),
        );
        pool.spec.exclude_ips = vec!["10.0.0.5".to_string()];
        pool.status.allocated_ips.insert(
            "10.0.0.1".to_string(),
            PoolIpAllocation {
                interface: "eth0".to_string(),
                owner: OwnerReference::pod("default", "web-0", Uuid::nil()),
            },
        );
        pool.status.allocated_ip_count = Some(1);

        let value = serde_json::to_value(&pool).unwrap();
        assert_eq!(value["spec"]["ipVersion"], json!(4));
        assert_eq!(value["spec"]["excludeIPs"], json!(["10.0.0.5"]));
        assert_eq!(value["status"]["allocatedIPCount"], json!(1));
        assert_eq!(value["status"]["allocatedIPs"]["10.0.0.1"]["interface"], json!("eth0"));
        assert_eq!(
            value["status"]["allocatedIPs"]["10.0.0.1"]["owner"]["kind"],
            json!("Pod")
        );

        let back: IpPool = serde_json::from_value(value).unwrap();
        assert_eq!(back, pool);
    }

    #[test]
    fn test_version_token_advances() {
        let v = ResourceVersion::new(41);
        assert_eq!(v.next(), ResourceVersion::new(42));
        assert!(v < v.next());
    }
}
