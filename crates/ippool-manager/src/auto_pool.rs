//! Sizing of pools created automatically for a workload

use crate::config::IpamConfig;
use crate::{Error, Result};

/// Computes how many addresses an auto-created pool should hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoPoolSizing {
    default_flexible_ip_number: i64,
}

impl AutoPoolSizing {
    pub fn new(default_flexible_ip_number: i64) -> Self {
        Self {
            default_flexible_ip_number,
        }
    }

    pub fn from_config(config: &IpamConfig) -> Self {
        Self::new(config.default_flexible_ip_number)
    }

    /// Desired address count for a workload with `replicas` replicas
    ///
    /// `annotation` is `"+N"` for N spare addresses on top of the replicas,
    /// or `"N"` for a fixed count. Without one, the configured number of
    /// spare addresses is used.
    pub fn desired_ip_number(&self, annotation: Option<&str>, replicas: i64) -> Result<i64> {
        if replicas < 0 {
            return Err(Error::WrongInput(format!(
                "replicas must not be negative, got {}",
                replicas
            )));
        }

        let Some(raw) = annotation.map(str::trim) else {
            return Ok(replicas.saturating_add(self.default_flexible_ip_number));
        };

        if let Some(flexible) = raw.strip_prefix('+') {
            let flexible = parse_count(raw, flexible)?;
            return Ok(replicas.saturating_add(flexible));
        }
        parse_count(raw, raw)
    }
}

impl Default for AutoPoolSizing {
    fn default() -> Self {
        Self::from_config(&IpamConfig::default())
    }
}

fn parse_count(raw: &str, digits: &str) -> Result<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::WrongInput(format!(
            "invalid IP number '{}', expected \"N\" or \"+N\"",
            raw
        )));
    }
    digits
        .parse::<i64>()
        .map_err(|e| Error::WrongInput(format!("invalid IP number '{}': {}", raw, e)))
}
