use axum_unit_of_work::UnitOfWork;
use axum_unit_of_work::config::{AppConfig, HostList};
use serial_test::serial;
use std::env;
use std::io::Write;

const BIN: &str = "axum-unit-of-work";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "UOW_SERVER__PORT",
            "UOW_STORAGE__PROVIDER",
            "UOW_STORAGE__STORAGE_HOSTS",
            "UOW_STORAGE__STORAGE_PORT",
            "UOW_STORAGE__DEFAULT_KEYSPACE",
            "UOW_STORAGE__LAZY_CONNECT",
            "UOW_STORAGE__RETRY_CONNECT",
            "CONFIG_FILE",
            "PORT",
            "STORAGE_PROVIDER",
            "STORAGE_HOSTS",
            "DEFAULT_KEYSPACE",
            "LAZY_CONNECT",
            "RETRY_CONNECT",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_cli_scenario() {
    clear_env_vars();

    let config = AppConfig::load_from_args([
        BIN,
        "--storage-hosts",
        "10.0.0.1,10.0.0.2",
        "--default-keyspace",
        "ks1",
    ])
    .expect("Failed to load config");

    assert_eq!(config.server.port, 3000); // Default
    assert_eq!(config.storage.storage_port, 9042); // Default
    assert!(!config.storage.lazy_connect);
    assert!(!config.storage.retry_connect);

    let setup = config.storage.setup().unwrap();
    assert_eq!(setup.hosts, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(setup.keyspace, "ks1");
}

#[test]
#[serial]
fn test_missing_keyspace_fails_at_load() {
    clear_env_vars();

    let result = AppConfig::load_from_args([BIN, "--storage-hosts", "10.0.0.1"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_missing_hosts_fails_at_load() {
    clear_env_vars();

    let result = AppConfig::load_from_args([BIN, "--default-keyspace", "ks1"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("UOW_SERVER__PORT", "9090");
        env::set_var("UOW_STORAGE__STORAGE_HOSTS", "cass-a,cass-b");
        env::set_var("UOW_STORAGE__DEFAULT_KEYSPACE", "from_env");
        env::set_var("UOW_STORAGE__LAZY_CONNECT", "true");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.storage.keyspace().unwrap(), "from_env");
    assert_eq!(config.storage.hosts().unwrap(), vec!["cass-a", "cass-b"]);
    assert!(config.storage.lazy_connect);
    assert_eq!(config.storage.setup().unwrap().hosts, vec!["cass-a", "cass-b"]);

    // CLI beats environment.
    let config = AppConfig::load_from_args([BIN, "--default-keyspace", "from_cli"])
        .expect("Failed to load config");
    assert_eq!(config.storage.keyspace().unwrap(), "from_cli");

    clear_env_vars();
}

#[test]
#[serial]
fn test_env_alone_satisfies_required_storage() {
    clear_env_vars();
    unsafe {
        env::set_var("UOW_STORAGE__PROVIDER", "memory");
        env::set_var("UOW_STORAGE__STORAGE_HOSTS", "10.0.0.1,10.0.0.2");
        env::set_var("UOW_STORAGE__STORAGE_PORT", "9142");
        env::set_var("UOW_STORAGE__DEFAULT_KEYSPACE", "ks1");
        env::set_var("UOW_STORAGE__RETRY_CONNECT", "true");
    }

    let result = AppConfig::load_from_args([BIN]);
    clear_env_vars();

    let config = result.expect("Failed to load config from environment");
    let setup = config.storage.setup().unwrap();
    assert_eq!(setup.hosts, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(setup.port, 9142);
    assert_eq!(setup.keyspace, "ks1");
    assert!(setup.retry_connect);
}

#[test]
#[serial]
fn test_retry_connect_flag() {
    clear_env_vars();

    let config = AppConfig::load_from_args([
        BIN,
        "--storage-hosts",
        "10.0.0.1",
        "--default-keyspace",
        "ks1",
        "--lazy-connect",
        "true",
        "--retry-connect",
        "true",
    ])
    .expect("Failed to load config");

    let setup = config.storage.setup().unwrap();
    assert!(setup.lazy_connect);
    assert!(setup.retry_connect);
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let config_content = r#"
server:
  port: 7070
storage:
  storage_hosts:
    - 10.0.0.5
    - 10.0.0.6
  storage_port: 9142
  default_keyspace: file_ks
  retry_connect: true
  extra_setup_options:
    max_connections: 12
    application_name: unit-of-work
    "#;

    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write temp config");
    let path = file.path().to_str().unwrap().to_string();

    let config =
        AppConfig::load_from_args([BIN, "--config", path.as_str()]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(
        config.storage.storage_hosts,
        Some(HostList::List(vec![
            "10.0.0.5".to_string(),
            "10.0.0.6".to_string()
        ]))
    );

    let setup = config.storage.setup().unwrap();
    assert_eq!(setup.port, 9142);
    assert_eq!(setup.keyspace, "file_ks");
    assert!(setup.retry_connect);
    assert_eq!(setup.options["max_connections"], 12);
    assert_eq!(setup.options["application_name"], "unit-of-work");
}

#[test]
#[serial]
fn test_unknown_provider_fails_at_load() {
    clear_env_vars();

    let result = AppConfig::load_from_args([
        BIN,
        "--storage-provider",
        "cassandra",
        "--storage-hosts",
        "h",
        "--default-keyspace",
        "ks",
    ]);
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn test_unit_of_work_from_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([
        BIN,
        "--storage-hosts",
        "localhost",
        "--default-keyspace",
        "ks1",
    ])
    .expect("Failed to load config");

    let uow = UnitOfWork::from_config(&config.storage).await;
    assert!(uow.is_ok());
}
