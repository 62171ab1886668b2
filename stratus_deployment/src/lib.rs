// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

pub mod docker_swarm;
pub mod kubernetes;

use stratus_api::deployment::{Deployment, DeploymentKind};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DockerSettings {
    /// Path of the Docker Engine API socket.
    pub socket_path: String,
    /// Attachable overlay network where all the workloads are attached.
    pub network: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            socket_path: "/var/run/docker.sock".to_string(),
            network: "stratus-net".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct KubernetesSettings {
    /// Path of the kubeconfig file, if empty the client configuration is
    /// inferred from the environment.
    pub config_path: String,
    pub namespace: String,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            config_path: String::new(),
            namespace: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RegistrySettings {
    pub server: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DeploymentSettings {
    #[serde(rename = "type")]
    pub deployment_type: DeploymentKind,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            deployment_type: DeploymentKind::Docker,
            docker: DockerSettings::default(),
            kubernetes: KubernetesSettings::default(),
        }
    }
}

/// Create the deployment backend selected in the settings.
///
/// The backend must be initialized with `init()` before use.
pub fn new_deployment(settings: &DeploymentSettings) -> Box<dyn Deployment> {
    log::info!("using {} deployment backend", settings.deployment_type);
    match settings.deployment_type {
        DeploymentKind::Docker => Box::new(docker_swarm::DockerDeployment::new(settings.docker.clone())),
        DeploymentKind::Kubernetes => Box::new(kubernetes::KubernetesDeployment::new(settings.kubernetes.clone())),
    }
}
