// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum DeploymentKind {
    Docker,
    Kubernetes,
}

impl std::fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentKind::Docker => write!(f, "docker"),
            DeploymentKind::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PortConfig {
    pub name: String,
    /// Port published by the workload.
    pub port: u16,
    /// Port the container listens on.
    pub target_port: u16,
}

/// Desired state of a workload, built fresh for every deployment action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSpec {
    pub name: String,
    pub image: String,
    pub port_configs: Vec<PortConfig>,
    pub env: HashMap<String, String>,
    pub replicas: u32,
}

/// Workload status strings reported by the backends.
pub mod workload_status {
    pub const RUNNING: &str = "running";
    pub const PENDING: &str = "pending";
    pub const FAILED: &str = "failed";
    pub const STOPPED: &str = "stopped";
}

/// Observed state of a workload, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct WorkloadDetails {
    pub host: String,
    pub port_configs: Vec<PortConfig>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub details: bool,
    pub follow: bool,
    pub show_stderr: bool,
    pub show_stdout: bool,
    pub since: Option<String>,
    pub until: Option<String>,
    pub tail: Option<String>,
    pub timestamps: bool,
}

/// Stream of log lines produced by a workload.
pub type LogStream = futures::channel::mpsc::UnboundedReceiver<String>;

#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("deployment backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("deployment rejected: {0}")]
    Rejected(String),
    #[error("workload not found: {0}")]
    NotFound(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Container backend where functions and manager components run.
///
/// Every call but `init()` fails with `BackendUnavailable` until `init()`
/// has succeeded once.
#[async_trait::async_trait]
pub trait Deployment: DeploymentClone + Sync + Send {
    async fn init(&mut self) -> Result<(), DeploymentError>;
    /// Create the workload or update it in place, returning its placement id.
    async fn create_or_update(&mut self, spec: DeploymentSpec) -> Result<String, DeploymentError>;
    async fn delete(&mut self, name: &str) -> Result<(), DeploymentError>;
    async fn list_by_name(&mut self, name: &str) -> Result<WorkloadDetails, DeploymentError>;
    async fn logs_by_name(&mut self, name: &str, options: LogOptions) -> Result<LogStream, DeploymentError>;
    fn deployment_type(&self) -> DeploymentKind;
}

// https://stackoverflow.com/a/30353928
pub trait DeploymentClone {
    fn clone_box(&self) -> Box<dyn Deployment>;
}
impl<T> DeploymentClone for T
where
    T: 'static + Deployment + Clone,
{
    fn clone_box(&self) -> Box<dyn Deployment> {
        Box::new(self.clone())
    }
}
impl Clone for Box<dyn Deployment> {
    fn clone(&self) -> Box<dyn Deployment> {
        self.clone_box()
    }
}
