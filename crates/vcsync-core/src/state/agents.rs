// # Agent Registry
//
// Maps hypervisor hosts to the dataplane agent serving them, with an active
// flag that maintenance-mode transitions toggle.
//
// ## Mapping File
//
// One `host:address` pair per line; blank lines and `#` comments are skipped.
// The address may be IPv4 or IPv6 (only the first colon separates the host).
//
// ```text
// # esxi host        agent
// esxi-01.lab:10.84.12.21
// esxi-02.lab:10.84.12.22
// ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Agent serving one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentEntry {
    pub agent: IpAddr,
    /// False while the host is in maintenance or disconnected
    pub active: bool,
}

/// Concurrency-safe host → agent map
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    hosts: Arc<RwLock<HashMap<String, AgentEntry>>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the mapping file; every agent starts active
    pub async fn from_map_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_entries(parse_map(&contents)?);
        info!(
            "Loaded {} host-to-agent mapping(s) from {}",
            registry.hosts.read().await.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Build from `(host, agent)` pairs; every agent starts active
    pub fn from_entries(entries: impl IntoIterator<Item = (String, IpAddr)>) -> Self {
        let hosts = entries
            .into_iter()
            .map(|(host, agent)| (host, AgentEntry { agent, active: true }))
            .collect();
        Self {
            hosts: Arc::new(RwLock::new(hosts)),
        }
    }

    pub async fn insert(&self, host: impl Into<String>, agent: IpAddr) {
        self.hosts
            .write()
            .await
            .insert(host.into(), AgentEntry { agent, active: true });
    }

    /// Agent serving `host`, regardless of its active flag
    pub async fn agent_for_host(&self, host: &str) -> Option<IpAddr> {
        self.hosts.read().await.get(host).map(|e| e.agent)
    }

    pub async fn entry(&self, host: &str) -> Option<AgentEntry> {
        self.hosts.read().await.get(host).copied()
    }

    /// Flip the active flag of `host`; returns its agent if the host is known
    pub async fn set_host_active(&self, host: &str, active: bool) -> Option<IpAddr> {
        let mut hosts = self.hosts.write().await;
        let entry = hosts.get_mut(host)?;
        if entry.active != active {
            debug!(host, agent = %entry.agent, active, "Agent active flag changed");
        }
        entry.active = active;
        Some(entry.agent)
    }

    /// Distinct agents of hosts not in maintenance, sorted
    pub async fn active_agents(&self) -> Vec<IpAddr> {
        let mut agents: Vec<IpAddr> = self
            .hosts
            .read()
            .await
            .values()
            .filter(|e| e.active)
            .map(|e| e.agent)
            .collect();
        agents.sort();
        agents.dedup();
        agents
    }
}

/// Parse mapping file contents into `(host, agent)` pairs
pub fn parse_map(contents: &str) -> Result<Vec<(String, IpAddr)>> {
    let mut entries = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (host, addr) = line.split_once(':').ok_or_else(|| {
            Error::config(format!("agent map line {}: expected host:address, got {:?}", lineno + 1, line))
        })?;
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::config(format!("agent map line {}: empty host", lineno + 1)));
        }
        let agent: IpAddr = addr.trim().parse().map_err(|e| {
            Error::config(format!("agent map line {}: invalid address {:?}: {}", lineno + 1, addr.trim(), e))
        })?;

        entries.push((host.to_string(), agent));
    }
    Ok(entries)
}
