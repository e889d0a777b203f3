//! Runtime configuration of the `scriptflow-dash` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scriptflow_dashboard::StoreLimits;

pub const RUNS_PER_PAGE_ENV: &str = "SCRIPTFLOW_RUNS_PER_PAGE";
pub const BUS_CAPACITY_ENV: &str = "SCRIPTFLOW_BUS_CAPACITY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    /// Run page size, also the cap on push-driven growth of a run list.
    pub runs_per_page: usize,
    pub task_list_limit: u32,
    pub node_list_limit: u32,
    pub alert_subscription_limit: u32,
    /// Buffered realtime events per subscriber of the in-memory store.
    pub bus_capacity: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        let limits = StoreLimits::default();
        Self {
            runs_per_page: limits.runs_per_page,
            task_list_limit: limits.task_list_limit,
            node_list_limit: limits.node_list_limit,
            alert_subscription_limit: limits.alert_subscription_limit,
            bus_capacity: 256,
        }
    }
}

impl DashConfig {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            runs_per_page: self.runs_per_page.max(1),
            task_list_limit: self.task_list_limit.max(1),
            node_list_limit: self.node_list_limit.max(1),
            alert_subscription_limit: self.alert_subscription_limit.max(1),
        }
    }

    /// Environment values win over the file. Unparsable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, RUNS_PER_PAGE_ENV) {
            self.runs_per_page = value;
        }
        if let Some(value) = parse_override(&lookup, BUS_CAPACITY_ENV) {
            self.bus_capacity = value;
        }
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => {
            info!("{key}={value} overrides configuration");
            Some(value)
        }
        _ => {
            warn!("ignoring {key}={raw:?}: expected a positive integer");
            None
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("scriptflow-dash");
    path.push("config.yaml");
    Some(path)
}

/// Read the YAML file at `path`, or the default location, falling back to
/// defaults when it does not exist. Environment overrides are applied last.
pub async fn load_config(path: Option<&Path>) -> Result<DashConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match path {
        Some(path) if path.exists() => {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: DashConfig = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("Loaded configuration from: {}", path.display());
            config
        }
        Some(path) => {
            warn!("Config file not found, using defaults: {}", path.display());
            DashConfig::default()
        }
        None => DashConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}
