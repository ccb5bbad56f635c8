//! Daemon configuration: optional gpuburst.toml plus required environment.
//!
//! The TOML file carries tunables and may be omitted entirely. The pool
//! identity (subscription, resource group, cluster, pool) and the access
//! token always come from the environment.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use gpuburst_lifecycle::LifecycleSettings;

/// Pool name used when `GPU_NODEPOOL_NAME` is unset.
pub const DEFAULT_POOL_NAME: &str = "gpupool";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub lifecycle: LifecycleConfig,
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleConfig {
    pub poll_interval_secs: u64,
    pub ready_timeout_secs: u64,
    pub workload_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            ready_timeout_secs: 600,
            workload_grace_secs: 30,
        }
    }
}

impl LifecycleConfig {
    pub fn settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            workload_grace: Duration::from_secs(self.workload_grace_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AzureConfig {
    pub api_version: String,
    pub management_endpoint: String,
    pub operation_poll_secs: u64,
    pub operation_timeout_secs: u64,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            api_version: "2024-05-01".to_string(),
            management_endpoint: "https://management.azure.com".to_string(),
            operation_poll_secs: 10,
            operation_timeout_secs: 1800,
        }
    }
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject intervals and timeouts of zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (key, value) in [
            ("lifecycle.poll_interval_secs", self.lifecycle.poll_interval_secs),
            ("lifecycle.ready_timeout_secs", self.lifecycle.ready_timeout_secs),
            ("azure.operation_poll_secs", self.azure.operation_poll_secs),
            ("azure.operation_timeout_secs", self.azure.operation_timeout_secs),
        ] {
            anyhow::ensure!(value > 0, "{key} must be greater than zero");
        }
        Ok(())
    }
}

/// Required environment variables that were absent or empty.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing required environment variables: {}", .0.join(", "))]
pub struct MissingEnv(pub Vec<&'static str>);

/// Pool identity and credentials from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEnv {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub pool_name: String,
    pub access_token: Option<String>,
}

impl PoolEnv {
    pub fn from_env(require_token: bool) -> Result<Self, MissingEnv> {
        Self::from_lookup(|key| std::env::var(key).ok(), require_token)
    }

    /// Resolve from an arbitrary variable source. Empty values count as
    /// missing. Every missing variable is reported, not just the first.
    pub fn from_lookup<F>(lookup: F, require_token: bool) -> Result<Self, MissingEnv>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            get(key).unwrap_or_else(|| {
                missing.push(key);
                String::new()
            })
        };

        let subscription_id = required("AZURE_SUBSCRIPTION_ID");
        let resource_group = required("AZURE_RESOURCE_GROUP");
        let cluster_name = required("AKS_CLUSTER_NAME");
        let access_token = if require_token {
            Some(required("AZURE_ACCESS_TOKEN"))
        } else {
            get("AZURE_ACCESS_TOKEN")
        };

        if !missing.is_empty() {
            return Err(MissingEnv(missing));
        }
        Ok(Self {
            subscription_id,
            resource_group,
            cluster_name,
            pool_name: get("GPU_NODEPOOL_NAME").unwrap_or_else(|| DEFAULT_POOL_NAME.to_string()),
            access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("AZURE_SUBSCRIPTION_ID", "sub-1"),
        ("AZURE_RESOURCE_GROUP", "rg-gpu"),
        ("AKS_CLUSTER_NAME", "aks-main"),
        ("AZURE_ACCESS_TOKEN", "token"),
    ];

    #[test]
    fn complete_env_resolves_with_default_pool() {
        let env = PoolEnv::from_lookup(lookup(FULL), true).unwrap();
        assert_eq!(env.subscription_id, "sub-1");
        assert_eq!(env.pool_name, DEFAULT_POOL_NAME);
        assert_eq!(env.access_token.as_deref(), Some("token"));
    }

    #[test]
    fn every_missing_variable_is_reported() {
        let err = PoolEnv::from_lookup(lookup(&[("AKS_CLUSTER_NAME", "aks")]), true).unwrap_err();
        assert_eq!(
            err,
            MissingEnv(vec![
                "AZURE_SUBSCRIPTION_ID",
                "AZURE_RESOURCE_GROUP",
                "AZURE_ACCESS_TOKEN"
            ])
        );
        assert!(err.to_string().contains("AZURE_RESOURCE_GROUP"));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut vars = FULL.to_vec();
        vars[0] = ("AZURE_SUBSCRIPTION_ID", "  ");
        let err = PoolEnv::from_lookup(lookup(&vars), true).unwrap_err();
        assert_eq!(err, MissingEnv(vec!["AZURE_SUBSCRIPTION_ID"]));
    }

    #[test]
    fn token_optional_when_not_required() {
        let env = PoolEnv::from_lookup(lookup(&FULL[..3]), false).unwrap();
        assert_eq!(env.access_token, None);
    }

    #[test]
    fn pool_name_override() {
        let mut vars = FULL.to_vec();
        vars.push(("GPU_NODEPOOL_NAME", "a100pool"));
        let env = PoolEnv::from_lookup(lookup(&vars), true).unwrap();
        assert_eq!(env.pool_name, "a100pool");
    }

    #[test]
    fn file_config_defaults_when_empty() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5000);
        let settings = config.lifecycle.settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.ready_timeout, Duration::from_secs(600));
        assert_eq!(config.azure.api_version, "2024-05-01");
    }

    #[test]
    fn file_config_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "127.0.0.1"
port = 8080

[lifecycle]
poll_interval_secs = 5
ready_timeout_secs = 120
"#
        )
        .unwrap();

        let config = FileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.lifecycle.poll_interval_secs, 5);
        assert_eq!(config.lifecycle.workload_grace_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[server]\nprot = 1\n").is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for (section, key) in [
            ("lifecycle", "poll_interval_secs"),
            ("lifecycle", "ready_timeout_secs"),
            ("azure", "operation_poll_secs"),
            ("azure", "operation_timeout_secs"),
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[{section}]\n{key} = 0").unwrap();

            let err = FileConfig::from_file(file.path()).unwrap_err();
            assert!(format!("{err:#}").contains(key), "{section}.{key}: {err:#}");
        }
    }

    #[test]
    fn zero_workload_grace_is_allowed() {
        let config: FileConfig = toml::from_str("[lifecycle]\nworkload_grace_secs = 0\n").unwrap();
        assert!(config.validate().is_ok());
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileConfig::from_file(Path::new("/nonexistent/gpuburst.toml")).is_err());
    }
}
