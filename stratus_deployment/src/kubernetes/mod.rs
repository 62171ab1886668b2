// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use stratus_api::deployment::{workload_status, Deployment, DeploymentError, DeploymentKind, DeploymentSpec, LogOptions, LogStream, PortConfig, WorkloadDetails};

/// Field manager used for server-side apply.
pub const FIELD_MANAGER: &str = "stratus-mgr";

const APP_LABEL: &str = "app";

/// Deployment on Kubernetes: every workload is a `Deployment` exposed by
/// a `Service` with the same name.
#[derive(Clone)]
pub struct KubernetesDeployment {
    settings: crate::KubernetesSettings,
    client: std::sync::Arc<tokio::sync::Mutex<Option<kube::Client>>>,
}

impl KubernetesDeployment {
    pub fn new(settings: crate::KubernetesSettings) -> Self {
        Self {
            settings,
            client: std::sync::Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    async fn client(&self) -> Result<kube::Client, DeploymentError> {
        match self.client.lock().await.as_ref() {
            Some(client) => Ok(client.clone()),
            None => Err(DeploymentError::BackendUnavailable("Kubernetes deployment not initialized".to_string())),
        }
    }

    async fn connect(&self) -> anyhow::Result<kube::Client> {
        if self.settings.config_path.is_empty() {
            return Ok(kube::Client::try_default().await?);
        }
        let kubeconfig = kube::config::Kubeconfig::read_from(&self.settings.config_path)?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default()).await?;
        Ok(kube::Client::try_from(config)?)
    }
}

fn labels(name: &str) -> std::collections::BTreeMap<String, String> {
    std::collections::BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

pub fn map_kube_error(name: &str, err: kube::Error) -> DeploymentError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => DeploymentError::NotFound(name.to_string()),
        kube::Error::Api(ae) => DeploymentError::Rejected(format!("{} ({})", ae.message, ae.code)),
        err => DeploymentError::BackendUnavailable(err.to_string()),
    }
}

/// `Deployment` manifest of a workload.
pub fn deployment_manifest(spec: &DeploymentSpec, namespace: &str) -> apps::Deployment {
    let mut env = spec
        .env
        .iter()
        .map(|(k, v)| core::EnvVar {
            name: k.clone(),
            value: Some(v.clone()),
            ..Default::default()
        })
        .collect::<Vec<core::EnvVar>>();
    env.sort_by(|a, b| a.name.cmp(&b.name));
    let ports = spec
        .port_configs
        .iter()
        .map(|p| core::ContainerPort {
            name: if p.name.is_empty() { None } else { Some(p.name.clone()) },
            container_port: p.target_port as i32,
            ..Default::default()
        })
        .collect::<Vec<core::ContainerPort>>();

    apps::Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&spec.name)),
            ..Default::default()
        },
        spec: Some(apps::DeploymentSpec {
            replicas: Some(spec.replicas as i32),
            selector: LabelSelector {
                match_labels: Some(labels(&spec.name)),
                ..Default::default()
            },
            template: core::PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&spec.name)),
                    ..Default::default()
                }),
                spec: Some(core::PodSpec {
                    containers: vec![core::Container {
                        name: spec.name.clone(),
                        image: Some(spec.image.clone()),
                        env: Some(env),
                        ports: Some(ports),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `Service` manifest of a workload, if it publishes any port.
pub fn service_manifest(spec: &DeploymentSpec, namespace: &str) -> Option<core::Service> {
    if spec.port_configs.is_empty() {
        return None;
    }
    let ports = spec
        .port_configs
        .iter()
        .map(|p| core::ServicePort {
            name: Some(p.name.clone()),
            port: p.port as i32,
            target_port: Some(IntOrString::Int(p.target_port as i32)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect::<Vec<core::ServicePort>>();
    Some(core::Service {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&spec.name)),
            ..Default::default()
        },
        spec: Some(core::ServiceSpec {
            selector: Some(labels(&spec.name)),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Summarize the status of a `Deployment`.
pub fn deployment_status(deployment: &apps::Deployment) -> String {
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    if desired == 0 {
        return workload_status::STOPPED.to_string();
    }
    let status = match &deployment.status {
        Some(status) => status,
        None => return workload_status::PENDING.to_string(),
    };
    if status.available_replicas.unwrap_or_default() >= desired {
        return workload_status::RUNNING.to_string();
    }
    let failed = status
        .conditions
        .as_ref()
        .map(|conditions| conditions.iter().any(|c| c.type_ == "ReplicaFailure" && c.status == "True"))
        .unwrap_or(false);
    match failed {
        true => workload_status::FAILED.to_string(),
        false => workload_status::PENDING.to_string(),
    }
}

pub fn service_ports(service: &core::Service) -> Vec<PortConfig> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| PortConfig {
                    name: p.name.clone().unwrap_or_default(),
                    port: p.port as u16,
                    target_port: match &p.target_port {
                        Some(IntOrString::Int(port)) => *port as u16,
                        _ => p.port as u16,
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Deployment for KubernetesDeployment {
    async fn init(&mut self) -> Result<(), DeploymentError> {
        let mut client = self.client.lock().await;
        if client.is_some() {
            return Ok(());
        }
        let new_client = self
            .connect()
            .await
            .map_err(|err| DeploymentError::BackendUnavailable(format!("could not create the Kubernetes client: {}", err)))?;
        *client = Some(new_client);
        log::info!("Kubernetes deployment initialized, namespace {}", self.settings.namespace);
        Ok(())
    }

    async fn create_or_update(&mut self, spec: DeploymentSpec) -> Result<String, DeploymentError> {
        let client = self.client().await?;
        let namespace = &self.settings.namespace;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let deployments: Api<apps::Deployment> = Api::namespaced(client.clone(), namespace);
        let applied = deployments
            .patch(&spec.name, &params, &Patch::Apply(&deployment_manifest(&spec, namespace)))
            .await
            .map_err(|err| match map_kube_error(&spec.name, err) {
                DeploymentError::NotFound(name) => DeploymentError::Rejected(format!("could not apply deployment {}", name)),
                err => err,
            })?;

        if let Some(service) = service_manifest(&spec, namespace) {
            let services: Api<core::Service> = Api::namespaced(client, namespace);
            services
                .patch(&spec.name, &params, &Patch::Apply(&service))
                .await
                .map_err(|err| map_kube_error(&spec.name, err))?;
        }

        log::info!("applied deployment {} in namespace {}", spec.name, namespace);
        Ok(applied.metadata.uid.unwrap_or(spec.name))
    }

    async fn delete(&mut self, name: &str) -> Result<(), DeploymentError> {
        let client = self.client().await?;
        let deployments: Api<apps::Deployment> = Api::namespaced(client.clone(), &self.settings.namespace);
        deployments
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|err| map_kube_error(name, err))?;

        let services: Api<core::Service> = Api::namespaced(client, &self.settings.namespace);
        match services.delete(name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(err) => log::warn!("could not delete service {}: {}", name, err),
        }
        log::info!("deleted deployment {}", name);
        Ok(())
    }

    async fn list_by_name(&mut self, name: &str) -> Result<WorkloadDetails, DeploymentError> {
        let client = self.client().await?;
        let deployments: Api<apps::Deployment> = Api::namespaced(client.clone(), &self.settings.namespace);
        let deployment = deployments.get(name).await.map_err(|err| map_kube_error(name, err))?;

        let services: Api<core::Service> = Api::namespaced(client, &self.settings.namespace);
        let port_configs = match services.get_opt(name).await.map_err(|err| map_kube_error(name, err))? {
            Some(service) => service_ports(&service),
            None => vec![],
        };

        Ok(WorkloadDetails {
            host: name.to_string(),
            port_configs,
            status: deployment_status(&deployment),
        })
    }

    async fn logs_by_name(&mut self, name: &str, _options: LogOptions) -> Result<LogStream, DeploymentError> {
        Err(DeploymentError::Unsupported(format!("logs of {} are not available on Kubernetes", name)))
    }

    fn deployment_type(&self) -> DeploymentKind {
        DeploymentKind::Kubernetes
    }
}

#[cfg(test)]
mod test;
