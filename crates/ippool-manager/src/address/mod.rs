//! IP address arithmetic
//!
//! Provides:
//! - Single ranges with successor/predecessor and numeric ordering
//! - Canonical range sets with union/difference/intersection
//! - CIDR parsing and overlap helpers
//! - The per-pool [`Subnet`] address space

pub mod cidr;
mod range;
mod set;
mod subnet;

pub use range::{compare, predecessor, successor, to_bits, AddressRange, IpVersion, RangeIter};
pub use set::{merge_ranges, merge_to_ranges, overlapping_ranges, AddressSet};
pub use subnet::Subnet;
