//! Configuration types for the reconciler
//!
//! This module defines all configuration structures used throughout the crate.
//! Durations are in milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Creator tag stamped on every controller object this system owns
pub const DEFAULT_CREATOR_TAG: &str = "vcenter-plugin";

/// Default location of the host → agent mapping file
pub const DEFAULT_AGENT_MAP_PATH: &str = "/etc/contrail/ESXiToVRouterIp.map";

/// Main reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Management-plane client configuration
    pub management: ManagementConfig,

    /// SDN controller client configuration
    pub controller: ControllerConfig,

    /// Dataplane agent settings
    #[serde(default)]
    pub dataplane: DataplaneConfig,

    /// Leader election backend
    #[serde(default)]
    pub leader: LeaderConfig,

    /// Whether deletions propagate to the controller
    #[serde(default)]
    pub mode: OperatingMode,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with default dataplane, leader, mode and engine settings
    pub fn new(management: ManagementConfig, controller: ControllerConfig) -> Self {
        Self {
            management,
            controller,
            dataplane: DataplaneConfig::default(),
            leader: LeaderConfig::default(),
            mode: OperatingMode::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.management.validate()?;
        self.controller.validate()?;
        self.dataplane.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Management-plane client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagementConfig {
    /// vCenter SDK endpoint
    Vcenter {
        /// SDK URL, e.g. `https://vcenter.lab/sdk`
        url: String,
        username: String,
        password: String,
        datacenter: String,
        /// Distributed switch whose port groups are managed
        dvswitch: String,
    },

    /// Custom management-plane client
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ManagementConfig {
    /// Validate the management-plane configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ManagementConfig::Vcenter {
                url,
                username,
                datacenter,
                dvswitch,
                ..
            } => {
                if url.is_empty() {
                    return Err(crate::Error::config("vCenter URL cannot be empty"));
                }
                if username.is_empty() {
                    return Err(crate::Error::config("vCenter username cannot be empty"));
                }
                if datacenter.is_empty() || dvswitch.is_empty() {
                    return Err(crate::Error::config(
                        "vCenter datacenter and dvswitch are required",
                    ));
                }
                Ok(())
            }
            ManagementConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom management plane factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the factory name
    pub fn type_name(&self) -> &str {
        match self {
            ManagementConfig::Vcenter { .. } => "vcenter",
            ManagementConfig::Custom { factory, .. } => factory,
        }
    }
}

// Custom Debug implementation that hides the password
impl fmt::Debug for ManagementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementConfig::Vcenter {
                url,
                username,
                datacenter,
                dvswitch,
                ..
            } => f
                .debug_struct("Vcenter")
                .field("url", url)
                .field("username", username)
                .field("password", &"<REDACTED>")
                .field("datacenter", datacenter)
                .field("dvswitch", dvswitch)
                .finish(),
            ManagementConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// SDN controller client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerConfig {
    /// VNC-style REST API server
    Vnc {
        /// API server base URL, e.g. `http://controller:8082`
        api_url: String,
        /// Bearer token, if the API server requires one
        token: Option<String>,
        /// Project owning created objects
        #[serde(default = "default_project")]
        project: String,
    },

    /// Custom controller client
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ControllerConfig {
    /// Validate the controller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ControllerConfig::Vnc { api_url, project, .. } => {
                if api_url.is_empty() {
                    return Err(crate::Error::config("Controller API URL cannot be empty"));
                }
                if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Controller API URL must use http or https: {api_url}"
                    )));
                }
                if project.is_empty() {
                    return Err(crate::Error::config("Controller project cannot be empty"));
                }
                Ok(())
            }
            ControllerConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom controller factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the factory name
    pub fn type_name(&self) -> &str {
        match self {
            ControllerConfig::Vnc { .. } => "vnc",
            ControllerConfig::Custom { factory, .. } => factory,
        }
    }
}

// Custom Debug implementation that hides the token
impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerConfig::Vnc { api_url, token, project } => f
                .debug_struct("Vnc")
                .field("api_url", api_url)
                .field("token", &token.as_ref().map(|_| "<REDACTED>"))
                .field("project", project)
                .finish(),
            ControllerConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

fn default_project() -> String {
    "vCenter".to_string()
}

/// Dataplane agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataplaneConfig {
    /// Agent connector factory name
    #[serde(default = "default_connector")]
    pub connector: String,

    /// Agent RPC port
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// Host → agent mapping file
    #[serde(default = "default_agent_map_path")]
    pub agent_map_path: PathBuf,
}

impl DataplaneConfig {
    /// Validate the dataplane configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.connector.is_empty() {
            return Err(crate::Error::config("Agent connector cannot be empty"));
        }
        if self.agent_port == 0 {
            return Err(crate::Error::config("Agent port must be > 0"));
        }
        Ok(())
    }
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            connector: default_connector(),
            agent_port: default_agent_port(),
            agent_map_path: default_agent_map_path(),
        }
    }
}

fn default_connector() -> String {
    "thrift".to_string()
}

fn default_agent_port() -> u16 {
    9090
}

fn default_agent_map_path() -> PathBuf {
    PathBuf::from(DEFAULT_AGENT_MAP_PATH)
}

/// Leader election configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaderConfig {
    /// Single instance, always the leader
    #[default]
    Standalone,

    /// Custom elector
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl LeaderConfig {
    /// Get the factory name
    pub fn type_name(&self) -> &str {
        match self {
            LeaderConfig::Standalone => "standalone",
            LeaderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// The management plane owns the objects: deletions propagate
    #[default]
    ManagementOnly,
    /// The management plane is one compute source among others: objects
    /// missing from its snapshot are left on the controller
    ManagementAsCompute,
}

impl OperatingMode {
    pub fn propagates_deletes(&self) -> bool {
        matches!(self, OperatingMode::ManagementOnly)
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "management-only" | "vcenter-only" => Ok(OperatingMode::ManagementOnly),
            "management-as-compute" | "vcenter-as-compute" => Ok(OperatingMode::ManagementAsCompute),
            other => Err(crate::Error::config(format!("Unknown operating mode: {other}"))),
        }
    }
}

/// How the scheduling loop is driven
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Apply change events as they arrive; full passes only when needed
    #[default]
    EventDriven,
    /// Full reconciliation on a fixed interval, no event subscription
    Periodic {
        /// Interval between passes
        interval_ms: u64,
    },
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub strategy: SyncStrategy,

    /// Watchdog bound for connecting to an external system
    #[serde(default = "default_connect_bound_ms")]
    pub connect_bound_ms: u64,

    /// Watchdog bound for a full reconciliation
    #[serde(default = "default_reconcile_bound_ms")]
    pub reconcile_bound_ms: u64,

    /// Management-plane read timeout while a full reconciliation runs
    #[serde(default = "default_reconcile_read_timeout_ms")]
    pub reconcile_read_timeout_ms: u64,

    /// Longest wait for the next event batch
    #[serde(default = "default_event_wait_ms")]
    pub event_wait_ms: u64,

    /// Pause before retrying while an external system is unreachable
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Interval between dataplane keepalive passes
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Watchdog bound for one keepalive pass
    #[serde(default = "default_keepalive_bound_ms")]
    pub keepalive_bound_ms: u64,

    /// Creator tag scoping controller listings
    #[serde(default = "default_creator_tag")]
    pub creator_tag: String,

    /// Machines whose name contains this (case-insensitive) are the agents'
    /// own VMs and never managed
    #[serde(default = "default_agent_vm_marker")]
    pub agent_vm_marker: String,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let intervals = [
            ("connect_bound_ms", self.connect_bound_ms),
            ("reconcile_bound_ms", self.reconcile_bound_ms),
            ("event_wait_ms", self.event_wait_ms),
            ("retry_interval_ms", self.retry_interval_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("keepalive_bound_ms", self.keepalive_bound_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(crate::Error::config(format!("{name} must be > 0")));
            }
        }
        if let SyncStrategy::Periodic { interval_ms: 0 } = self.strategy {
            return Err(crate::Error::config("Periodic sync interval must be > 0"));
        }
        if self.creator_tag.is_empty() {
            return Err(crate::Error::config("Creator tag cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn connect_bound(&self) -> Duration {
        Duration::from_millis(self.connect_bound_ms)
    }

    pub fn reconcile_bound(&self) -> Duration {
        Duration::from_millis(self.reconcile_bound_ms)
    }

    /// `None` when 0: keep the transport default during reconciliation
    pub fn reconcile_read_timeout(&self) -> Option<Duration> {
        (self.reconcile_read_timeout_ms > 0).then(|| Duration::from_millis(self.reconcile_read_timeout_ms))
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_millis(self.event_wait_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn keepalive_bound(&self) -> Duration {
        Duration::from_millis(self.keepalive_bound_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            connect_bound_ms: default_connect_bound_ms(),
            reconcile_bound_ms: default_reconcile_bound_ms(),
            reconcile_read_timeout_ms: default_reconcile_read_timeout_ms(),
            event_wait_ms: default_event_wait_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_bound_ms: default_keepalive_bound_ms(),
            creator_tag: default_creator_tag(),
            agent_vm_marker: default_agent_vm_marker(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_connect_bound_ms() -> u64 {
    300_000
}

fn default_reconcile_bound_ms() -> u64 {
    300_000
}

fn default_reconcile_read_timeout_ms() -> u64 {
    60_000
}

fn default_event_wait_ms() -> u64 {
    30_000
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_keepalive_interval_ms() -> u64 {
    30_000
}

fn default_keepalive_bound_ms() -> u64 {
    60_000
}

fn default_creator_tag() -> String {
    DEFAULT_CREATOR_TAG.to_string()
}

fn default_agent_vm_marker() -> String {
    "contrailVM".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
