//! Data models for IP pools

mod owner;
mod pool;
mod route;

pub use owner::{OwnerKey, OwnerKind, OwnerReference};
pub use pool::{IpPool, IpPoolSpec, IpPoolStatus, ObjectMeta, PoolIpAllocation, ResourceVersion};
pub use route::Route;
