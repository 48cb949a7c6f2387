use ippool_manager::{
    AllocationEngine, AutoPoolSizing, Error, InMemoryPoolStore, IpamConfig, PoolInvariantValidator,
    StaticReservedAddresses,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_from_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("ipam.yaml");

    let yaml_content = r#"
retry:
  max_conflict_retries: 8
  conflict_retry_unit_time_ms: 20
  backoff_factor: 2.0
  jitter: 0.0
max_allocated_ips: 1024
enable_ipv4: true
enable_ipv6: false
default_flexible_ip_number: 3
"#;
    fs::write(&config_path, yaml_content).unwrap();

    let config = IpamConfig::from_file(&config_path).unwrap();
    assert_eq!(config.retry.max_conflict_retries, 8);
    assert_eq!(config.max_allocated_ips, 1024);
    assert!(!config.enable_ipv6);

    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, 8);
    assert_eq!(policy.delay(1), Duration::from_millis(20));
    assert_eq!(policy.delay(3), Duration::from_millis(80));

    assert_eq!(
        AutoPoolSizing::from_config(&config)
            .desired_ip_number(None, 2)
            .unwrap(),
        5
    );
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = IpamConfig::from_file(temp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("absent.yaml")));
}

#[test]
fn test_invalid_file_contents() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("ipam.yaml");
    fs::write(&config_path, "retry:\n  backoff_factor: 0.2\n").unwrap();

    assert!(matches!(
        IpamConfig::from_file(&config_path),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_config_drives_components() {
    let config = IpamConfig::from_yaml_str("enable_ipv4: false\nmax_allocated_ips: 10\n").unwrap();

    let engine = AllocationEngine::with_config(
        Arc::new(InMemoryPoolStore::new()),
        Arc::new(StaticReservedAddresses::new()),
        config.allocator_config(),
    );
    assert_eq!(engine.config().max_allocated_ips, 10);
    assert_eq!(
        PoolInvariantValidator::from_config(&config),
        PoolInvariantValidator::new(false, true)
    );
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_roundtrip_yaml(
            retries in 1i64..100,
            unit_ms in 0u64..10_000,
            factor in 1.0f64..4.0,
            jitter in 0.0f64..=1.0,
            max_allocated in 1i64..100_000,
            enable_ipv6: bool,
            flexible in 0i64..64,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let config_path = temp_dir.path().join("prop-test.yaml");

            let mut original = IpamConfig::default();
            original.retry.max_conflict_retries = retries;
            original.retry.conflict_retry_unit_time_ms = unit_ms;
            original.retry.backoff_factor = factor;
            original.retry.jitter = jitter;
            original.max_allocated_ips = max_allocated;
            original.enable_ipv6 = enable_ipv6;
            original.default_flexible_ip_number = flexible;

            let yaml = serde_yaml::to_string(&original).unwrap();
            fs::write(&config_path, yaml).unwrap();

            let loaded = IpamConfig::from_file(&config_path).unwrap();
            prop_assert_eq!(loaded, original);
        }
    }
}
