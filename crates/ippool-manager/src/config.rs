//! IPAM configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration.

use crate::allocator::{
    AllocatorConfig, RetryPolicy, DEFAULT_MAX_ALLOCATED_IPS, DEFAULT_MAX_RETRY_DELAY,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backoff applied when a pool write loses a version race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, the first one included
    pub max_conflict_retries: i64,
    /// Delay before the first retry, in milliseconds
    pub conflict_retry_unit_time_ms: u64,
    pub backoff_factor: f64,
    /// Extra random delay as a fraction of the base delay
    pub jitter: f64,
    /// Cap on the base delay of one retry, in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            conflict_retry_unit_time_ms: 10,
            backoff_factor: 1.5,
            jitter: 0.1,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY.as_millis() as u64,
        }
    }
}

/// Top-level IPAM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpamConfig {
    pub retry: RetryConfig,
    /// Soft ceiling on reservations per pool
    pub max_allocated_ips: i64,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
    /// Spare addresses added to the replica count of an auto-created pool
    pub default_flexible_ip_number: i64,
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_allocated_ips: DEFAULT_MAX_ALLOCATED_IPS,
            enable_ipv4: true,
            enable_ipv6: true,
            default_flexible_ip_number: 1,
        }
    }
}

impl IpamConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded IPAM configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_conflict_retries <= 0 {
            return Err(Error::Config(
                "retry.max_conflict_retries must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_conflict_retries > i64::from(u32::MAX) {
            return Err(Error::Config(
                "retry.max_conflict_retries is too large".to_string(),
            ));
        }
        if !(self.retry.backoff_factor >= 1.0 && self.retry.backoff_factor.is_finite()) {
            return Err(Error::Config(format!(
                "retry.backoff_factor must be a finite number of at least 1.0, got {}",
                self.retry.backoff_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(Error::Config(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.retry.jitter
            )));
        }
        if self.max_allocated_ips <= 0 {
            return Err(Error::Config(
                "max_allocated_ips must be greater than 0".to_string(),
            ));
        }
        if !self.enable_ipv4 && !self.enable_ipv6 {
            return Err(Error::Config(
                "at least one of enable_ipv4 and enable_ipv6 must be set".to_string(),
            ));
        }
        if self.default_flexible_ip_number < 0 {
            return Err(Error::Config(
                "default_flexible_ip_number must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Conflict backoff as used by the allocation engine
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: u32::try_from(self.retry.max_conflict_retries.max(1))
                .unwrap_or(u32::MAX),
            initial_delay: Duration::from_millis(self.retry.conflict_retry_unit_time_ms),
            factor: self.retry.backoff_factor,
            jitter: self.retry.jitter,
            max_delay: Duration::from_millis(self.retry.max_retry_delay_ms),
        }
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            retry: self.retry_policy(),
            max_allocated_ips: self.max_allocated_ips,
        }
    }
}
