use super::*;
use serial_test::serial;
use std::env;
use std::net::IpAddr;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_nooble_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        env::remove_var("NOOBLE_SERVICE_NAME");
        env::remove_var("NOOBLE_BIND_ADDR");
        env::remove_var("NOOBLE_PORT");
        env::remove_var("NOOBLE_REDIS_URL");
        env::remove_var("NOOBLE_RELATIONAL_URL");
        env::remove_var("NOOBLE_RELATIONAL_ANON_KEY");
        env::remove_var("NOOBLE_QDRANT_URL");
        env::remove_var("NOOBLE_WORKER_COUNT");
        env::remove_var("NOOBLE_CONFIG_CACHE_TTL");
    }
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();

    assert_eq!(settings.port, 8000);
    assert_eq!(
        settings.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );
    assert_eq!(settings.redis_url, DEFAULT_REDIS_URL);
    assert_eq!(settings.qdrant_url, DEFAULT_QDRANT_URL);
    assert_eq!(settings.worker_count, 2);
    assert_eq!(settings.config_cache_ttl_secs, 600);
    assert_eq!(settings.task_mirror_ttl_secs, 3600);
}

#[test]
fn test_socket_addr() {
    let settings = Settings::default();
    assert_eq!(settings.socket_addr(), "127.0.0.1:8000");

    let settings = Settings {
        port: 3000,
        bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        ..Default::default()
    };
    assert_eq!(settings.socket_addr(), "0.0.0.0:3000");
}

#[test]
fn test_max_document_bytes_by_type() {
    let settings = Settings::default();

    assert_eq!(settings.max_document_bytes("pdf"), 50 * 1024 * 1024);
    assert_eq!(settings.max_document_bytes("docx"), 20 * 1024 * 1024);
    assert_eq!(settings.max_document_bytes("txt"), 10 * 1024 * 1024);
    assert_eq!(settings.max_document_bytes("md"), 10 * 1024 * 1024);
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_nooble_env();

    let settings = Settings::from_env().expect("should parse with defaults");

    assert_eq!(settings.port, 8000);
    assert_eq!(settings.service_name, "nooble");
    assert_eq!(settings.worker_count, 2);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_nooble_env();

    let settings = with_env_vars(
        &[
            ("NOOBLE_SERVICE_NAME", "ingestion-service"),
            ("NOOBLE_PORT", "8002"),
            ("NOOBLE_WORKER_COUNT", "4"),
            ("NOOBLE_CONFIG_CACHE_TTL", "120"),
        ],
        || Settings::from_env().expect("should parse overrides"),
    );

    assert_eq!(settings.service_name, "ingestion-service");
    assert_eq!(settings.port, 8002);
    assert_eq!(settings.worker_count, 4);
    assert_eq!(settings.config_cache_ttl_secs, 120);
}

#[test]
#[serial]
fn test_from_env_invalid_port() {
    clear_nooble_env();

    let result = with_env_vars(&[("NOOBLE_PORT", "0")], Settings::from_env);
    assert!(matches!(result, Err(SettingsError::InvalidPort { .. })));

    let result = with_env_vars(&[("NOOBLE_PORT", "not-a-port")], Settings::from_env);
    assert!(matches!(
        result,
        Err(SettingsError::PortParseError { .. })
    ));
}

#[test]
fn test_validate_requires_relational_coordinates() {
    let settings = Settings::default();
    assert!(matches!(
        settings.validate(),
        Err(SettingsError::MissingVar {
            name: "NOOBLE_RELATIONAL_URL"
        })
    ));

    let settings = Settings {
        relational_url: "https://db.example.com".to_string(),
        relational_anon_key: "anon".to_string(),
        ..Default::default()
    };
    assert!(settings.validate().is_ok());
}
