// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-FileCopyrightText: © 2023 Siemens AG
// SPDX-License-Identifier: MIT

pub mod components;
pub mod env;
pub mod error;
pub mod event_catalog;
pub mod function_create;
pub mod function_manager;
pub mod gateway_data;
pub mod request_tracker;
pub mod store;
pub mod validation;

use stratus_messenger::Transport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum TransportType {
    /// In-process bus, only for single-process setups and tests.
    #[default]
    Local,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct EventBusSettings {
    pub transport: TransportType,
    /// URL of the Redis server, if the transport is Redis.
    pub redis_url: String,
    /// Coordinates of the event bus handed to the functions.
    pub host: String,
    pub port: u16,
    pub exchange: String,
    pub management_username: String,
    pub management_password: String,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            transport: TransportType::Local,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            exchange: "stratus".to_string(),
            management_username: String::new(),
            management_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StratusMgrSettings {
    /// Identifier of the manager on the event bus.
    pub app_id: String,
    /// Directory where the build contexts of the images are staged.
    pub build_dir: String,
    pub deployment: stratus_deployment::DeploymentSettings,
    pub event_bus: EventBusSettings,
    pub persistence: store::PersistenceSettings,
    #[serde(default)]
    pub components: components::ComponentsSettings,
    /// Registry where the function images are published, if any.
    pub docker_registry: Option<stratus_deployment::RegistrySettings>,
}

async fn new_transport(settings: &EventBusSettings) -> anyhow::Result<std::sync::Arc<dyn Transport>> {
    Ok(match settings.transport {
        TransportType::Local => std::sync::Arc::new(stratus_messenger::local_bus::LocalBus::new()),
        TransportType::Redis => std::sync::Arc::new(stratus_messenger::redis_bus::RedisBus::new(&settings.redis_url).await?),
    })
}

/// Bring up the manager: deployment backend, bus, persistence, manager
/// components and listeners. Returns the function manager.
pub async fn stratus_mgr_start(settings: StratusMgrSettings) -> anyhow::Result<function_manager::FunctionManager> {
    let mut deployment = stratus_deployment::new_deployment(&settings.deployment);
    deployment.init().await?;

    let transport = new_transport(&settings.event_bus).await?;
    let store = store::Store::new(store::new_persistence(&settings.persistence).await?);
    let image_builder = std::sync::Arc::new(stratus_deployment::docker_swarm::image_builder::DockerImageBuilder::new(
        &settings.deployment.docker.socket_path,
        settings.docker_registry.clone(),
    ));
    let messenger = stratus_messenger::Messenger::new(&settings.app_id, transport).await?;

    let components = components::setup_components(&settings.components, deployment.as_mut(), &store).await?;
    log::info!("{} manager components registered", components.len());

    gateway_data::listen(&messenger, store.clone()).await?;
    request_tracker::RequestTrackerListener::new(store.clone()).listen(&messenger).await?;

    let manager_settings = function_manager::FunctionManagerSettings {
        build_dir: settings.build_dir.clone(),
        registry_server: settings.docker_registry.as_ref().map(|registry| registry.server.clone()),
        event_bus: settings.event_bus.clone(),
    };
    Ok(function_manager::FunctionManager::new(
        manager_settings,
        deployment,
        store,
        image_builder,
        Some(messenger),
    ))
}

pub async fn stratus_mgr_main(settings: StratusMgrSettings) {
    log::info!("Starting STRATUS function manager");
    log::debug!("Settings: {:?}", settings);

    let mut manager = match stratus_mgr_start(settings).await {
        Ok(manager) => manager,
        Err(err) => {
            log::error!("could not start the function manager: {}", err);
            return;
        }
    };

    match manager.list_functions().await {
        Ok(functions) => {
            log::info!("{} functions registered", functions.len());
            for function in functions {
                log::info!("function {} version {}: {}", function.name, function.version, function.status);
            }
        }
        Err(err) => log::warn!("could not list the functions: {}", err),
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("could not wait for the shutdown signal: {}", err);
    }
    log::info!("Stopping STRATUS function manager");
}

pub fn stratus_mgr_default_conf() -> String {
    String::from(
        r##"app_id = "stratus-mgr"
build_dir = "/tmp/stratus"

[deployment]
type = "Docker"

[deployment.docker]
socket_path = "/var/run/docker.sock"
network = "stratus-net"

[deployment.kubernetes]
config_path = ""
namespace = "default"

[event_bus]
transport = "Redis"
redis_url = "redis://127.0.0.1:6379"
host = "127.0.0.1"
port = 6379
exchange = "stratus"
management_username = ""
management_password = ""

[persistence]
type = "Redis"
redis_url = "redis://127.0.0.1:6379"

[components]
deploy = true

[components.event_bus]
image = "redis:7"
port = 6379
target_port = 6379

[components.api_gateway]
image = "stratus/stratus-apigateway:0.1.0"
port = 8000
target_port = 8000

[components.event_box]
image = "stratus/stratus-eventbox:0.1.0"
port = 8080
target_port = 8080
"##,
    )
}
