// # vcsyncd - reconciliation daemon
//
// Thin integration layer: all reconciliation logic lives in vcsync-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering client implementations
// 4. Loading the host → agent mapping and starting the engine
//
// ## Configuration
//
// ### Management plane
// - `VCSYNC_MANAGEMENT_TYPE`: Client type (default: vcenter)
// - `VCSYNC_VCENTER_URL`: SDK URL, e.g. https://vcenter.lab/sdk
// - `VCSYNC_VCENTER_USERNAME` / `VCSYNC_VCENTER_PASSWORD`
// - `VCSYNC_VCENTER_DATACENTER`: Datacenter name
// - `VCSYNC_VCENTER_DVSWITCH`: Distributed switch whose port groups are managed
//
// ### Controller
// - `VCSYNC_CONTROLLER_TYPE`: Client type (default: vnc)
// - `VCSYNC_CONTROLLER_URL`: API server URL, e.g. http://controller:8082
// - `VCSYNC_CONTROLLER_TOKEN`: Bearer token (optional)
// - `VCSYNC_CONTROLLER_PROJECT`: Owning project (default: vCenter)
//
// ### Dataplane
// - `VCSYNC_AGENT_CONNECTOR`: Agent connector type (default: thrift)
// - `VCSYNC_AGENT_PORT`: Agent RPC port (default: 9090)
// - `VCSYNC_AGENT_MAP`: Host → agent mapping file
//   (default: /etc/contrail/ESXiToVRouterIp.map)
//
// ### Engine
// - `VCSYNC_MODE`: management-only | management-as-compute
// - `VCSYNC_SYNC_STRATEGY`: event-driven | periodic
// - `VCSYNC_SYNC_INTERVAL_SECS`: Interval for the periodic strategy (default: 60)
// - `VCSYNC_LOG_LEVEL`: trace | debug | info | warn | error
//
// ## Exit codes
//
// 0 clean shutdown, 1 configuration or startup error, 2 runtime error,
// 3 leadership lost (the supervisor restarts the process).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use vcsync_core::config::{DataplaneConfig, EngineConfig, LeaderConfig, DEFAULT_AGENT_MAP_PATH};
use vcsync_core::{
    AgentRegistry, ClientRegistry, ControllerConfig, ManagementConfig, OperatingMode, SyncComponents,
    SyncConfig, SyncEngine, SyncStrategy,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VcsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// Another instance holds leadership
    LeadershipLost = 3,
}

impl From<VcsyncExitCode> for ExitCode {
    fn from(code: VcsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration, as read from the environment
struct Config {
    management_type: String,
    vcenter_url: String,
    vcenter_username: String,
    vcenter_password: String,
    vcenter_datacenter: String,
    vcenter_dvswitch: String,
    controller_type: String,
    controller_url: String,
    controller_token: Option<String>,
    controller_project: String,
    mode: String,
    agent_connector: String,
    agent_port: String,
    agent_map: PathBuf,
    sync_strategy: String,
    sync_interval_secs: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            management_type: var("VCSYNC_MANAGEMENT_TYPE", "vcenter"),
            vcenter_url: var("VCSYNC_VCENTER_URL", ""),
            vcenter_username: var("VCSYNC_VCENTER_USERNAME", ""),
            vcenter_password: var("VCSYNC_VCENTER_PASSWORD", ""),
            vcenter_datacenter: var("VCSYNC_VCENTER_DATACENTER", ""),
            vcenter_dvswitch: var("VCSYNC_VCENTER_DVSWITCH", ""),
            controller_type: var("VCSYNC_CONTROLLER_TYPE", "vnc"),
            controller_url: var("VCSYNC_CONTROLLER_URL", ""),
            controller_token: lookup("VCSYNC_CONTROLLER_TOKEN").filter(|t| !t.is_empty()),
            controller_project: var("VCSYNC_CONTROLLER_PROJECT", "vCenter"),
            mode: var("VCSYNC_MODE", "management-only"),
            agent_connector: var("VCSYNC_AGENT_CONNECTOR", "thrift"),
            agent_port: var("VCSYNC_AGENT_PORT", "9090"),
            agent_map: PathBuf::from(var("VCSYNC_AGENT_MAP", DEFAULT_AGENT_MAP_PATH)),
            sync_strategy: var("VCSYNC_SYNC_STRATEGY", "event-driven"),
            sync_interval_secs: var("VCSYNC_SYNC_INTERVAL_SECS", "60"),
            log_level: var("VCSYNC_LOG_LEVEL", "info"),
        }
    }

    /// Validate the environment and build the engine configuration
    fn into_sync_config(self) -> Result<SyncConfig> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "VCSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        let management = match self.management_type.as_str() {
            "vcenter" => {
                if self.vcenter_url.is_empty() {
                    anyhow::bail!(
                        "VCSYNC_VCENTER_URL is required. \
                        Set it via: export VCSYNC_VCENTER_URL=https://vcenter/sdk"
                    );
                }
                ManagementConfig::Vcenter {
                    url: self.vcenter_url,
                    username: self.vcenter_username,
                    password: self.vcenter_password,
                    datacenter: self.vcenter_datacenter,
                    dvswitch: self.vcenter_dvswitch,
                }
            }
            other => ManagementConfig::Custom {
                factory: other.to_string(),
                config: serde_json::Value::Null,
            },
        };

        let controller = match self.controller_type.as_str() {
            "vnc" => {
                if self.controller_url.is_empty() {
                    anyhow::bail!(
                        "VCSYNC_CONTROLLER_URL is required. \
                        Set it via: export VCSYNC_CONTROLLER_URL=http://controller:8082"
                    );
                }
                ControllerConfig::Vnc {
                    api_url: self.controller_url,
                    token: self.controller_token,
                    project: self.controller_project,
                }
            }
            other => ControllerConfig::Custom {
                factory: other.to_string(),
                config: serde_json::Value::Null,
            },
        };

        let mode: OperatingMode = self.mode.parse()?;

        let agent_port: u16 = self
            .agent_port
            .parse()
            .with_context(|| format!("VCSYNC_AGENT_PORT must be a port number. Got: {}", self.agent_port))?;

        let strategy = match self.sync_strategy.as_str() {
            "event-driven" => SyncStrategy::EventDriven,
            "periodic" => {
                let secs: u64 = self.sync_interval_secs.parse().with_context(|| {
                    format!(
                        "VCSYNC_SYNC_INTERVAL_SECS must be a number of seconds. Got: {}",
                        self.sync_interval_secs
                    )
                })?;
                if !(10..=86_400).contains(&secs) {
                    anyhow::bail!(
                        "VCSYNC_SYNC_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                        secs
                    );
                }
                SyncStrategy::Periodic {
                    interval_ms: secs * 1000,
                }
            }
            other => anyhow::bail!(
                "VCSYNC_SYNC_STRATEGY '{}' is not supported. \
                Supported strategies: event-driven, periodic",
                other
            ),
        };

        let config = SyncConfig {
            management,
            controller,
            dataplane: DataplaneConfig {
                connector: self.agent_connector,
                agent_port,
                agent_map_path: self.agent_map,
            },
            leader: LeaderConfig::Standalone,
            mode,
            engine: EngineConfig {
                strategy,
                ..EngineConfig::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let config = Config::from_env();
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let sync_config = match config.into_sync_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return VcsyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return VcsyncExitCode::ConfigError.into();
    }

    info!("Starting vcsyncd");
    info!(
        management = sync_config.management.type_name(),
        controller = sync_config.controller.type_name(),
        mode = ?sync_config.mode,
        "Configuration loaded"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return VcsyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let engine = match build_engine(sync_config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return VcsyncExitCode::ConfigError;
            }
        };
        run_daemon(engine).await
    });

    code.into()
}

/// Register clients, load the agent map and create the engine
async fn build_engine(config: SyncConfig) -> Result<SyncEngine> {
    let registry = ClientRegistry::new();

    #[cfg(feature = "vnc")]
    {
        info!("Registering VNC controller client");
        vcsync_controller_vnc::register(&registry);
    }

    let management = registry.create_management(&config.management).with_context(|| {
        format!(
            "registered management planes: {:?}",
            registry.list_management()
        )
    })?;
    let controller = registry.create_controller(&config.controller).with_context(|| {
        format!("registered controllers: {:?}", registry.list_controllers())
    })?;
    let connector = registry.create_connector(&config.dataplane).with_context(|| {
        format!("registered agent connectors: {:?}", registry.list_connectors())
    })?;
    let leader = registry.create_leader(&config.leader)?;

    let agents = AgentRegistry::from_map_file(&config.dataplane.agent_map_path)
        .await
        .with_context(|| {
            format!(
                "failed to load agent map {}",
                config.dataplane.agent_map_path.display()
            )
        })?;
    info!(hosts = agents.active_agents().await.len(), "Agent map loaded");

    let components = SyncComponents {
        management: Arc::from(management),
        controller: Arc::from(controller),
        connector: Arc::from(connector),
        leader: Arc::from(leader),
        agents,
    };

    let (engine, mut events) = SyncEngine::new(components, config)?;

    // Monitoring events are only logged here
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(?event, "Engine event");
        }
    });

    Ok(engine)
}

/// Run the engine until a signal or loss of leadership
async fn run_daemon(engine: SyncEngine) -> VcsyncExitCode {
    let result = tokio::select! {
        result = engine.run() => result,
        signal = wait_for_terminate() => {
            match signal {
                Ok(name) => info!("Received shutdown signal: {}", name),
                Err(e) => warn!("Signal handling failed: {}", e),
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => {
            info!("Shutting down daemon");
            VcsyncExitCode::CleanShutdown
        }
        Err(vcsync_core::Error::LeadershipLost) => {
            warn!("Leadership lost, exiting for restart");
            VcsyncExitCode::LeadershipLost
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            VcsyncExitCode::RuntimeError
        }
    }
}

/// Wait for SIGTERM; SIGINT is handled by the engine itself
#[cfg(unix)]
async fn wait_for_terminate() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    sigterm.recv().await;
    Ok("SIGTERM")
}

/// Non-Unix platforms only have Ctrl-C, which the engine handles
#[cfg(not(unix))]
async fn wait_for_terminate() -> Result<&'static str> {
    std::future::pending::<()>().await;
    Ok("none")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("VCSYNC_VCENTER_URL", "https://vc.lab/sdk"),
        ("VCSYNC_VCENTER_USERNAME", "administrator"),
        ("VCSYNC_VCENTER_PASSWORD", "pw"),
        ("VCSYNC_VCENTER_DATACENTER", "dc1"),
        ("VCSYNC_VCENTER_DVSWITCH", "dvs1"),
        ("VCSYNC_CONTROLLER_URL", "http://ctl:8082"),
    ];

    #[test]
    fn defaults_from_minimal_environment() {
        let sync = config(BASE).into_sync_config().unwrap();
        assert_eq!(sync.mode, OperatingMode::ManagementOnly);
        assert_eq!(sync.engine.strategy, SyncStrategy::EventDriven);
        assert_eq!(sync.dataplane.agent_port, 9090);
        assert_eq!(sync.dataplane.agent_map_path, PathBuf::from(DEFAULT_AGENT_MAP_PATH));
        assert_eq!(sync.controller.type_name(), "vnc");
    }

    #[test]
    fn periodic_strategy_and_mode() {
        let mut vars = BASE.to_vec();
        vars.push(("VCSYNC_SYNC_STRATEGY", "periodic"));
        vars.push(("VCSYNC_SYNC_INTERVAL_SECS", "120"));
        vars.push(("VCSYNC_MODE", "management-as-compute"));

        let sync = config(&vars).into_sync_config().unwrap();
        assert_eq!(sync.engine.strategy, SyncStrategy::Periodic { interval_ms: 120_000 });
        assert_eq!(sync.mode, OperatingMode::ManagementAsCompute);
    }

    #[test]
    fn rejects_invalid_environment() {
        assert!(config(&BASE[..5]).into_sync_config().is_err());

        let mut vars = BASE.to_vec();
        vars.push(("VCSYNC_LOG_LEVEL", "verbose"));
        assert!(config(&vars).into_sync_config().is_err());

        let mut vars = BASE.to_vec();
        vars.push(("VCSYNC_AGENT_PORT", "not-a-port"));
        assert!(config(&vars).into_sync_config().is_err());

        let mut vars = BASE.to_vec();
        vars.push(("VCSYNC_SYNC_STRATEGY", "periodic"));
        vars.push(("VCSYNC_SYNC_INTERVAL_SECS", "1"));
        assert!(config(&vars).into_sync_config().is_err());
    }
}
