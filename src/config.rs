use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::storage::{Provider, StorageSetup};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Storage provider (memory, postgres, surrealdb)
    #[arg(long, env = "STORAGE_PROVIDER")]
    pub storage_provider: Option<String>,

    /// Comma-separated storage hosts
    #[arg(long, env = "STORAGE_HOSTS")]
    pub storage_hosts: Option<String>,

    /// Keyspace used when none is given explicitly
    #[arg(long, env = "DEFAULT_KEYSPACE")]
    pub default_keyspace: Option<String>,

    /// Defer the first storage connection until the first write
    #[arg(long, env = "LAZY_CONNECT")]
    pub lazy_connect: Option<bool>,

    /// Fall back to a lazy connection when no host answers at startup
    #[arg(long, env = "RETRY_CONNECT")]
    pub retry_connect: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Requests still running after this long are cancelled.
    pub request_timeout_secs: u64,
}

/// Storage hosts as written in configuration: one comma-separated string or
/// a list.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum HostList {
    Joined(String),
    List(Vec<String>),
}

impl HostList {
    /// Trimmed, non-empty addresses in configured order.
    pub fn addresses(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::Joined(s) => s.split(',').collect(),
            Self::List(list) => list.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub provider: String,
    pub storage_hosts: Option<HostList>,
    pub storage_port: u16,
    pub default_keyspace: Option<String>,
    pub lazy_connect: bool,
    pub retry_connect: bool,
    #[serde(default)]
    pub extra_setup_options: Map<String, Value>,
}

impl StorageConfig {
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        Provider::parse(&self.provider).ok_or_else(|| {
            ConfigError::Message(format!("unknown storage provider: {}", self.provider))
        })
    }

    pub fn hosts(&self) -> Result<Vec<String>, ConfigError> {
        let hosts = self
            .storage_hosts
            .as_ref()
            .map(HostList::addresses)
            .unwrap_or_default();
        if hosts.is_empty() {
            return Err(ConfigError::NotFound("storage.storage_hosts".to_string()));
        }
        Ok(hosts)
    }

    pub fn keyspace(&self) -> Result<&str, ConfigError> {
        match self.default_keyspace.as_deref().map(str::trim) {
            Some(ks) if !ks.is_empty() => Ok(ks),
            _ => Err(ConfigError::NotFound("storage.default_keyspace".to_string())),
        }
    }

    /// Normalized arguments for the storage client's configure call.
    pub fn setup(&self) -> Result<StorageSetup, ConfigError> {
        let mut setup = StorageSetup::new(self.hosts()?, self.keyspace()?, self.storage_port);
        setup.lazy_connect = self.lazy_connect;
        setup.retry_connect = self.retry_connect;
        setup.options = self.extra_setup_options.clone();
        Ok(setup)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("storage.provider", "memory")?
            .set_default("storage.storage_port", 9042)?
            .set_default("storage.lazy_connect", false)?
            .set_default("storage.retry_connect", false)?;

        // Explicit file must exist; ./config.{yaml,toml,json} is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. UOW_STORAGE__DEFAULT_KEYSPACE=ks1
        builder = builder.add_source(
            Environment::with_prefix("UOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their env fallbacks) win over everything else.
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(provider) = cli.storage_provider {
            builder = builder.set_override("storage.provider", provider)?;
        }
        if let Some(hosts) = cli.storage_hosts {
            builder = builder.set_override("storage.storage_hosts", hosts)?;
        }
        if let Some(keyspace) = cli.default_keyspace {
            builder = builder.set_override("storage.default_keyspace", keyspace)?;
        }
        if let Some(lazy) = cli.lazy_connect {
            builder = builder.set_override("storage.lazy_connect", lazy)?;
        }
        if let Some(retry) = cli.retry_connect {
            builder = builder.set_override("storage.retry_connect", retry)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could not serve a single request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.provider()?;
        self.storage.hosts()?;
        self.storage.keyspace()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(hosts: Option<HostList>, keyspace: Option<&str>) -> StorageConfig {
        StorageConfig {
            provider: "memory".to_string(),
            storage_hosts: hosts,
            storage_port: 9042,
            default_keyspace: keyspace.map(ToString::to_string),
            lazy_connect: false,
            retry_connect: false,
            extra_setup_options: Map::new(),
        }
    }

    #[test]
    fn test_joined_hosts_are_split() {
        let cfg = storage(
            Some(HostList::Joined("10.0.0.1, 10.0.0.2,".to_string())),
            Some("ks1"),
        );
        let setup = cfg.setup().unwrap();
        assert_eq!(setup.hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(setup.keyspace, "ks1");
        assert_eq!(setup.port, 9042);
    }

    #[test]
    fn test_list_hosts_are_kept_in_order() {
        let cfg = storage(
            Some(HostList::List(vec!["b".to_string(), "a".to_string()])),
            Some("ks"),
        );
        assert_eq!(cfg.hosts().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_missing_values_are_rejected() {
        assert!(storage(None, Some("ks")).setup().is_err());
        assert!(storage(Some(HostList::Joined(" ".to_string())), Some("ks")).setup().is_err());
        assert!(storage(Some(HostList::Joined("h".to_string())), None).setup().is_err());
        assert!(storage(Some(HostList::Joined("h".to_string())), Some("  ")).setup().is_err());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut cfg = storage(Some(HostList::Joined("h".to_string())), Some("ks"));
        cfg.provider = "cassandra".to_string();
        assert!(cfg.provider().is_err());
    }
}
