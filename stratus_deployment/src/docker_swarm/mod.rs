// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

pub mod client;
pub mod image_builder;
pub mod logs;

use client::{with_query, EngineClient, EngineResponse};
use http_body_util::BodyExt;
use stratus_api::deployment::{workload_status, Deployment, DeploymentError, DeploymentKind, DeploymentSpec, LogOptions, LogStream, PortConfig, WorkloadDetails};

/// Deployment on a Docker swarm: every workload is a replicated service
/// attached to the same overlay network, reachable by its service name.
#[derive(Clone)]
pub struct DockerDeployment {
    settings: crate::DockerSettings,
    client: EngineClient,
    initialized: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl DockerDeployment {
    pub fn new(settings: crate::DockerSettings) -> Self {
        let client = EngineClient::new(&settings.socket_path);
        Self {
            settings,
            client,
            initialized: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    fn ensure_initialized(&self) -> Result<(), DeploymentError> {
        match self.initialized.load(std::sync::atomic::Ordering::SeqCst) {
            true => Ok(()),
            false => Err(DeploymentError::BackendUnavailable("Docker deployment not initialized".to_string())),
        }
    }

    async fn inspect_service(&self, name: &str) -> Result<serde_json::Value, DeploymentError> {
        let response = self.client.request(hyper::Method::GET, &format!("/services/{}", name), None).await?;
        if !response.is_success() {
            return Err(response.into_error(name));
        }
        response.json().map_err(|err| DeploymentError::BackendUnavailable(err.to_string()))
    }

    async fn service_tasks(&self, name: &str) -> Result<Vec<serde_json::Value>, DeploymentError> {
        let filters = serde_json::json!({ "service": [name] }).to_string();
        let response = self
            .client
            .request(hyper::Method::GET, &with_query("/tasks", &[("filters", filters)]), None)
            .await?;
        if !response.is_success() {
            return Err(response.into_error(name));
        }
        match response.json() {
            Ok(serde_json::Value::Array(tasks)) => Ok(tasks),
            Ok(_) => Ok(vec![]),
            Err(err) => Err(DeploymentError::BackendUnavailable(err.to_string())),
        }
    }
}

/// Swarm service specification of a workload.
pub fn service_spec(spec: &DeploymentSpec, network: &str) -> serde_json::Value {
    let mut env = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<String>>();
    env.sort();
    let ports = spec
        .port_configs
        .iter()
        .map(|p| {
            serde_json::json!({
                "Name": p.name,
                "Protocol": "tcp",
                "PublishedPort": p.port,
                "TargetPort": p.target_port,
            })
        })
        .collect::<Vec<serde_json::Value>>();
    serde_json::json!({
        "Name": spec.name,
        "Labels": { "stratus.workload": spec.name },
        "TaskTemplate": {
            "ContainerSpec": {
                "Image": spec.image,
                "Env": env,
            },
            "Networks": [ { "Target": network } ],
        },
        "Mode": { "Replicated": { "Replicas": spec.replicas } },
        "EndpointSpec": { "Ports": ports },
    })
}

/// Published ports of an inspected service.
pub fn parse_port_configs(service: &serde_json::Value) -> Vec<PortConfig> {
    let ports = match service["Endpoint"]["Ports"].as_array() {
        Some(ports) => ports,
        None => match service["Spec"]["EndpointSpec"]["Ports"].as_array() {
            Some(ports) => ports,
            None => return vec![],
        },
    };
    ports
        .iter()
        .map(|p| PortConfig {
            name: p["Name"].as_str().unwrap_or_default().to_string(),
            port: p["PublishedPort"].as_u64().unwrap_or_default() as u16,
            target_port: p["TargetPort"].as_u64().unwrap_or_default() as u16,
        })
        .collect()
}

/// Summarize the state of the tasks of a service with `desired` replicas.
pub fn tasks_status(tasks: &[serde_json::Value], desired: u64) -> String {
    if desired == 0 {
        return workload_status::STOPPED.to_string();
    }
    let state = |task: &serde_json::Value| task["Status"]["State"].as_str().unwrap_or_default().to_string();
    let running = tasks.iter().filter(|t| state(t) == "running").count() as u64;
    let failed = tasks.iter().any(|t| matches!(state(t).as_str(), "failed" | "rejected"));
    if running >= desired {
        workload_status::RUNNING.to_string()
    } else if running == 0 && failed {
        workload_status::FAILED.to_string()
    } else {
        workload_status::PENDING.to_string()
    }
}

/// Query string of a service logs request.
/// Outcome of the creation of the overlay network: true if created, false
/// if a concurrent initialization created it first.
pub fn network_created(network: &str, response: &EngineResponse) -> Result<bool, DeploymentError> {
    match response.status {
        409 => Ok(false),
        _ if response.is_success() => Ok(true),
        _ => Err(DeploymentError::BackendUnavailable(format!(
            "could not create network {}: {}",
            network,
            response.message()
        ))),
    }
}

pub fn logs_query(options: &LogOptions) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("details", options.details.to_string()),
        ("follow", options.follow.to_string()),
        ("stdout", options.show_stdout.to_string()),
        ("stderr", options.show_stderr.to_string()),
        ("timestamps", options.timestamps.to_string()),
    ];
    if let Some(since) = &options.since {
        params.push(("since", since.clone()));
    }
    if let Some(until) = &options.until {
        params.push(("until", until.clone()));
    }
    if let Some(tail) = &options.tail {
        params.push(("tail", tail.clone()));
    }
    params
}

#[async_trait::async_trait]
impl Deployment for DockerDeployment {
    async fn init(&mut self) -> Result<(), DeploymentError> {
        if self.initialized.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        if !self.client.socket_exists() {
            return Err(DeploymentError::BackendUnavailable(format!(
                "the path to Docker ({}) does not exist, this likely means that Docker is not installed",
                self.settings.socket_path
            )));
        }
        let ping = self.client.request(hyper::Method::GET, "/_ping", None).await?;
        if !ping.is_success() {
            return Err(DeploymentError::BackendUnavailable(ping.message()));
        }

        let network = self
            .client
            .request(hyper::Method::GET, &format!("/networks/{}", self.settings.network), None)
            .await?;
        match network.status {
            200 => log::debug!("network {} already exists", self.settings.network),
            404 => {
                let created = self
                    .client
                    .request(
                        hyper::Method::POST,
                        "/networks/create",
                        Some(&serde_json::json!({
                            "Name": self.settings.network,
                            "Driver": "overlay",
                            "Attachable": true,
                            "CheckDuplicate": true,
                        })),
                    )
                    .await?;
                match network_created(&self.settings.network, &created)? {
                    true => log::info!("created overlay network {}", self.settings.network),
                    false => log::debug!("network {} created concurrently", self.settings.network),
                }
            }
            _ => return Err(DeploymentError::BackendUnavailable(network.message())),
        }

        self.initialized.store(true, std::sync::atomic::Ordering::SeqCst);
        log::info!("Docker deployment initialized at {}", self.settings.socket_path);
        Ok(())
    }

    async fn create_or_update(&mut self, spec: DeploymentSpec) -> Result<String, DeploymentError> {
        self.ensure_initialized()?;
        let body = service_spec(&spec, &self.settings.network);

        match self.inspect_service(&spec.name).await {
            Ok(existing) => {
                let id = existing["ID"].as_str().unwrap_or(&spec.name).to_string();
                let version = existing["Version"]["Index"].as_u64().unwrap_or_default();
                let path = with_query(&format!("/services/{}/update", id), &[("version", version.to_string())]);
                let response = self.client.request(hyper::Method::POST, &path, Some(&body)).await?;
                if !response.is_success() {
                    return Err(response.into_error(&spec.name));
                }
                log::info!("updated service {} (version {})", spec.name, version);
                Ok(id)
            }
            Err(DeploymentError::NotFound(_)) => {
                let response = self.client.request(hyper::Method::POST, "/services/create", Some(&body)).await?;
                if !response.is_success() {
                    return Err(match response.into_error(&spec.name) {
                        // a 404 on create means the image or network is missing
                        DeploymentError::NotFound(name) => DeploymentError::Rejected(format!("could not create service {}", name)),
                        err => err,
                    });
                }
                let id = response
                    .json()
                    .ok()
                    .and_then(|val| val["ID"].as_str().map(|s| s.to_string()))
                    .unwrap_or_else(|| spec.name.clone());
                log::info!("created service {} with ID {}", spec.name, id);
                Ok(id)
            }
            Err(err) => Err(err),
        }
    }

    async fn delete(&mut self, name: &str) -> Result<(), DeploymentError> {
        self.ensure_initialized()?;
        let response = self.client.request(hyper::Method::DELETE, &format!("/services/{}", name), None).await?;
        if !response.is_success() {
            return Err(response.into_error(name));
        }
        log::info!("removed service {}", name);
        Ok(())
    }

    async fn list_by_name(&mut self, name: &str) -> Result<WorkloadDetails, DeploymentError> {
        self.ensure_initialized()?;
        let service = self.inspect_service(name).await?;
        let desired = service["Spec"]["Mode"]["Replicated"]["Replicas"].as_u64().unwrap_or(1);
        let tasks = self.service_tasks(name).await?;
        Ok(WorkloadDetails {
            host: name.to_string(),
            port_configs: parse_port_configs(&service),
            status: tasks_status(&tasks, desired),
        })
    }

    async fn logs_by_name(&mut self, name: &str, options: LogOptions) -> Result<LogStream, DeploymentError> {
        self.ensure_initialized()?;
        let path = with_query(&format!("/services/{}/logs", name), &logs_query(&options));
        let response = self.client.send(hyper::Method::GET, &path, vec![], &[]).await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|err| DeploymentError::BackendUnavailable(err.to_string()))?
                .to_bytes();
            return Err(EngineResponse { status, body }.into_error(name));
        }

        let (sender, receiver) = futures::channel::mpsc::unbounded();
        let name = name.to_string();
        tokio::spawn(async move {
            let mut body = response.into_body();
            let mut decoder = logs::LogFrameDecoder::new();
            while let Some(frame) = body.frame().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("error while reading the logs of {}: {}", name, err);
                        break;
                    }
                };
                if let Ok(data) = frame.into_data() {
                    for line in decoder.push(&data) {
                        if sender.unbounded_send(line.line).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(receiver)
    }

    fn deployment_type(&self) -> DeploymentKind {
        DeploymentKind::Docker
    }
}
