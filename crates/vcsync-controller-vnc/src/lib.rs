// # VNC controller client
//
// REST/JSON implementation of the controller seam for a VNC-style API server.
//
// - One HTTP round trip per operation (listings fetch one collection each)
// - HTTP timeout configured (30 seconds)
// - Status-specific errors (401/403, 404, 409, 429, 5xx); transport
//   failures surface as connectivity errors so the engine reconnects
// - Bearer token never appears in logs or Debug output
// - No retry, caching or background tasks: the engine owns all of that
//
// ## API Reference
//
// - Create:  POST   `/<type>s`
// - Update:  PUT    `/<type>/<uuid>`
// - Delete:  DELETE `/<type>/<uuid>`
// - Read:    GET    `/<type>/<uuid>`
// - List:    GET    `/<type>s?detail=True`
// - Lookup:  POST   `/fqname-to-id`

pub mod json;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use uuid::Uuid;
use vcsync_core::config::{ControllerConfig, DEFAULT_CREATOR_TAG};
use vcsync_core::model::{Interface, Machine, Network};
use vcsync_core::traits::{ControllerClient, ControllerFactory, ControllerObject, ObjectKind, ObjectRef};
use vcsync_core::{Error, Result};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const CONTROLLER: &str = "vnc";

/// VNC API server client
///
/// # Security
///
/// The Debug implementation does NOT expose the bearer token.
pub struct VncController {
    base_url: String,
    /// ⚠️ NEVER log this value
    token: Option<String>,
    project: String,
    creator: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for VncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VncController")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("project", &self.project)
            .field("creator", &self.creator)
            .finish()
    }
}

impl VncController {
    /// Create a client for the API server at `base_url`
    ///
    /// # Errors
    ///
    /// A config error if the URL is empty or the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        project: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("VNC API URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.is_empty()),
            project: project.into(),
            creator: DEFAULT_CREATOR_TAG.to_string(),
            client,
        })
    }

    /// Tag written into `id_perms.creator` of every object
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("Content-Type", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| Error::connectivity(CONTROLLER, format!("HTTP request failed: {}", e)))
    }

    async fn read_json(&self, response: Response, context: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &body, context));
        }
        response
            .json()
            .await
            .map_err(|e| Error::controller(CONTROLLER, format!("Failed to parse response: {}", e)))
    }

    /// Detailed listing of one resource type, filtered to our creator tag
    async fn list(&self, kind: ObjectKind, creator: &str) -> Result<Vec<Value>> {
        let resource = json::resource(kind);
        let response = self
            .send(self.request(Method::GET, &format!("{resource}s?detail=True")))
            .await?;
        let listing = self.read_json(response, &format!("list {resource}s")).await?;

        Ok(json::list_items(&listing, resource)
            .into_iter()
            .filter(|object| json::created_by(object, creator))
            .cloned()
            .collect())
    }

    /// Create the owning project if it does not exist yet
    async fn ensure_project(&self) -> Result<()> {
        let fq_name = json!([json::ROOT_DOMAIN, self.project]);
        let lookup = self
            .request(Method::POST, "fqname-to-id")
            .json(&json!({ "type": "project", "fq_name": fq_name }));
        let response = self.send(lookup).await?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!(project = %self.project, "Controller project present");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                tracing::info!(project = %self.project, "Controller project not present, creating");
                let body = json!({
                    "project": {
                        "name": self.project,
                        "fq_name": fq_name,
                        "parent_type": "domain",
                        "id_perms": { "creator": self.creator, "enable": true },
                    }
                });
                let response = self.send(self.request(Method::POST, "projects").json(&body)).await?;
                self.read_json(response, "create project").await.map(|_| ())
            }
            _ => self.read_json(response, "project lookup").await.map(|_| ()),
        }
    }
}

/// Map an unsuccessful HTTP status to an error
pub fn status_error(status: StatusCode, body: &str, context: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "{context}: authentication failed: invalid token or insufficient permissions. Status: {status}"
        ),
        404 => format!("{context}: not found"),
        409 => format!("{context}: conflict: {body}"),
        429 => format!("{context}: rate limit exceeded. Status: {status}"),
        500..=599 => format!("{context}: API server error (transient): {status} - {body}"),
        _ => format!("{context}: {status} - {body}"),
    };
    Error::controller(CONTROLLER, message)
}

#[async_trait]
impl ControllerClient for VncController {
    async fn connect(&self) -> Result<()> {
        let response = self.send(self.request(Method::GET, "projects")).await?;
        self.read_json(response, "api-server life check").await?;
        self.ensure_project().await?;
        tracing::info!(url = %self.base_url, project = %self.project, "VNC API server alive");
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        match self.send(self.request(Method::GET, "projects")).await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("VNC life check failed: {}", e);
                false
            }
        }
    }

    async fn upsert(&self, object: ControllerObject<'_>) -> Result<()> {
        let target = object.object_ref();
        let resource = json::resource(target.kind);
        let body = json::build_body(&object, &self.project, &self.creator);

        let response = self
            .send(self.request(Method::PUT, &format!("{resource}/{}", target.id)).json(&body))
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            self.read_json(response, &format!("update {target}")).await?;
            tracing::debug!(object = %target, "Updated controller object");
            return Ok(());
        }

        let response = self
            .send(self.request(Method::POST, &format!("{resource}s")).json(&body))
            .await?;
        self.read_json(response, &format!("create {target}")).await?;
        tracing::debug!(object = %target, "Created controller object");
        Ok(())
    }

    async fn upsert_instance_ip(&self, iface: &Interface) -> Result<Option<IpAddr>> {
        let object = ControllerObject::InstanceIp(iface);
        self.upsert(object).await?;

        // The server fills in `instance_ip_address` when the request had none
        let target = object.object_ref();
        let response = self
            .send(self.request(Method::GET, &format!("{}/{}", json::resource(target.kind), target.id)))
            .await?;
        let read = self.read_json(response, &format!("read {target}")).await?;
        let address = json::parse_instance_ip_address(&read);
        if address.is_none() {
            tracing::warn!(object = %target, "Instance ip has no address yet");
        }
        Ok(address)
    }

    async fn delete(&self, object: ObjectRef) -> Result<()> {
        let resource = json::resource(object.kind);
        let response = self
            .send(self.request(Method::DELETE, &format!("{resource}/{}", object.id)))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(object = %object, "Controller object already gone");
                Ok(())
            }
            status if status.is_success() => {
                tracing::debug!(object = %object, "Deleted controller object");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body, &format!("delete {object}")))
            }
        }
    }

    async fn list_networks(&self, creator: &str) -> Result<Vec<Network>> {
        let objects = self.list(ObjectKind::Network, creator).await?;
        Ok(objects
            .iter()
            .filter_map(|object| {
                let network = json::parse_network(object);
                if network.is_none() {
                    tracing::warn!(uuid = %object["uuid"], "Skipping unparseable virtual-network");
                }
                network
            })
            .collect())
    }

    async fn list_machines(&self, creator: &str) -> Result<Vec<Machine>> {
        let mut machines: BTreeMap<Uuid, Machine> = self
            .list(ObjectKind::Machine, creator)
            .await?
            .iter()
            .filter_map(json::parse_machine)
            .map(|m| (m.id, m))
            .collect();

        for object in self.list(ObjectKind::Interface, creator).await? {
            let Some(iface) = json::parse_interface(&object) else {
                tracing::warn!(uuid = %object["uuid"], "Skipping unparseable virtual-machine-interface");
                continue;
            };
            match machines.get_mut(&iface.machine_id) {
                Some(machine) => {
                    machine.interfaces.insert(iface.id, iface);
                }
                None => tracing::debug!(interface = %iface.id, "Interface without a listed machine"),
            }
        }

        Ok(machines.into_values().collect())
    }

    fn name(&self) -> &'static str {
        CONTROLLER
    }
}

/// Factory for creating VNC controller clients
pub struct VncFactory;

impl ControllerFactory for VncFactory {
    fn create(&self, config: &ControllerConfig) -> Result<Box<dyn ControllerClient>> {
        match config {
            ControllerConfig::Vnc {
                api_url,
                token,
                project,
            } => Ok(Box::new(VncController::new(
                api_url.clone(),
                token.clone(),
                project.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for VNC controller")),
        }
    }
}

/// Register the VNC controller with a registry
///
/// # Example
///
/// ```rust
/// use vcsync_core::ClientRegistry;
///
/// let registry = ClientRegistry::new();
/// vcsync_controller_vnc::register(&registry);
/// assert!(registry.list_controllers().contains(&"vnc".to_string()));
/// ```
pub fn register(registry: &vcsync_core::ClientRegistry) {
    registry.register_controller(CONTROLLER, Box::new(VncFactory));
}
