// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use stratus_api::common::{env_keys, COMPONENT_API_GATEWAY, COMPONENT_EVENT_BOX, COMPONENT_EVENT_BUS};
use stratus_api::component::{ComponentDeployment, ManagerComponent};
use stratus_api::deployment::{Deployment, DeploymentSpec, PortConfig};
use stratus_api::entity::log_state;

use crate::store::Store;

/// Name of the variable holding the access key of a component.
pub const ACCESS_KEY_ENV: &str = "access_key";

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ComponentSettings {
    pub image: String,
    /// Port published by the component.
    pub port: u16,
    /// Port the component listens on inside its container.
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ComponentsSettings {
    /// If false the components are assumed to be already running and
    /// are only registered at their configured coordinates.
    pub deploy: bool,
    pub event_bus: ComponentSettings,
    pub api_gateway: ComponentSettings,
    pub event_box: ComponentSettings,
}

impl Default for ComponentsSettings {
    fn default() -> Self {
        let component = |image: &str, port: u16| ComponentSettings {
            image: image.to_string(),
            port,
            target_port: port,
        };
        Self {
            deploy: false,
            event_bus: component("redis:7", 6379),
            api_gateway: component("stratus/stratus-apigateway:0.1.0", 8000),
            event_box: component("stratus/stratus-eventbox:0.1.0", 8080),
        }
    }
}

impl ComponentsSettings {
    fn all(&self) -> [(&'static str, &ComponentSettings); 3] {
        [
            (COMPONENT_EVENT_BUS, &self.event_bus),
            (COMPONENT_API_GATEWAY, &self.api_gateway),
            (COMPONENT_EVENT_BOX, &self.event_box),
        ]
    }
}

/// Deploy (if requested) and register the manager components.
///
/// The access key of a component is generated on its first registration
/// and kept afterwards.
pub async fn setup_components(settings: &ComponentsSettings, deployment: &mut dyn Deployment, store: &Store) -> anyhow::Result<Vec<ManagerComponent>> {
    let mut components = vec![];
    for (id, component_settings) in settings.all() {
        let mut component = match store.find::<ManagerComponent>(id).await? {
            Some(component) => component,
            None => ManagerComponent {
                id: id.to_string(),
                access_key: stratus_api::util::new_access_key(),
                ..Default::default()
            },
        };
        component.image = component_settings.image.clone();
        component.log.clear();

        let coordinates = match settings.deploy {
            true => match deploy_component(id, component_settings, &component.access_key, deployment).await {
                Ok(coordinates) => coordinates,
                Err(err) => {
                    if store.find::<ManagerComponent>(id).await?.is_some() {
                        store
                            .append_log_best_effort::<ManagerComponent>(id, log_state::DEPLOYMENT_FAILED, &err.to_string())
                            .await;
                    }
                    return Err(anyhow::anyhow!("could not deploy component {}: {}", id, err));
                }
            },
            false => ComponentDeployment {
                host: id.to_string(),
                port: component_settings.port,
            },
        };
        component.deployment = coordinates;

        store.save(&mut component).await?;
        let state = match settings.deploy {
            true => log_state::DEPLOYED,
            false => log_state::SAVED,
        };
        let message = format!("{}:{}", component.deployment.host, component.deployment.port);
        store.append_log_best_effort::<ManagerComponent>(id, state, &message).await;
        log::info!("component {} registered at {}", id, message);
        components.push(component);
    }
    Ok(components)
}

async fn deploy_component(
    id: &str,
    settings: &ComponentSettings,
    access_key: &str,
    deployment: &mut dyn Deployment,
) -> Result<ComponentDeployment, stratus_api::deployment::DeploymentError> {
    let spec = DeploymentSpec {
        name: id.to_string(),
        image: settings.image.clone(),
        port_configs: vec![PortConfig {
            name: "http".to_string(),
            port: settings.port,
            target_port: settings.target_port,
        }],
        env: HashMap::from([
            (ACCESS_KEY_ENV.to_string(), access_key.to_string()),
            (env_keys::APP_ID.to_string(), id.to_string()),
        ]),
        replicas: 1,
    };
    deployment.create_or_update(spec).await?;

    let details = deployment.list_by_name(id).await?;
    Ok(ComponentDeployment {
        host: details.host,
        port: details.port_configs.first().map(|p| p.port).unwrap_or(settings.port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_api::deployment::{DeploymentError, DeploymentKind, LogOptions, LogStream, WorkloadDetails};

    #[derive(Clone, Default)]
    struct RecordingDeployment {
        specs: std::sync::Arc<std::sync::Mutex<Vec<DeploymentSpec>>>,
    }

    #[async_trait::async_trait]
    impl Deployment for RecordingDeployment {
        async fn init(&mut self) -> Result<(), DeploymentError> {
            Ok(())
        }

        async fn create_or_update(&mut self, spec: DeploymentSpec) -> Result<String, DeploymentError> {
            if spec.image.is_empty() {
                return Err(DeploymentError::Rejected("empty image".to_string()));
            }
            self.specs.lock().unwrap().push(spec);
            Ok("placed".to_string())
        }

        async fn delete(&mut self, _name: &str) -> Result<(), DeploymentError> {
            Ok(())
        }

        async fn list_by_name(&mut self, name: &str) -> Result<WorkloadDetails, DeploymentError> {
            let specs = self.specs.lock().unwrap();
            match specs.iter().rev().find(|s| s.name == name) {
                Some(spec) => Ok(WorkloadDetails {
                    host: format!("{}.local", name),
                    port_configs: spec.port_configs.clone(),
                    status: "running".to_string(),
                }),
                None => Err(DeploymentError::NotFound(name.to_string())),
            }
        }

        async fn logs_by_name(&mut self, name: &str, _options: LogOptions) -> Result<LogStream, DeploymentError> {
            Err(DeploymentError::Unsupported(name.to_string()))
        }

        fn deployment_type(&self) -> DeploymentKind {
            DeploymentKind::Docker
        }
    }

    fn store() -> Store {
        Store::new(std::sync::Arc::new(crate::store::memory::MemoryPersistence::new()))
    }

    #[tokio::test]
    async fn test_setup_components_keeps_access_keys() {
        let store = store();
        let mut deployment = RecordingDeployment::default();
        let settings = ComponentsSettings {
            deploy: true,
            ..Default::default()
        };

        let first = setup_components(&settings, &mut deployment, &store).await.unwrap();
        assert_eq!(3, first.len());
        assert_eq!(3, deployment.specs.lock().unwrap().len());
        let event_bus = &first[0];
        assert_eq!(COMPONENT_EVENT_BUS, event_bus.id);
        assert_eq!("stratus-eventbus.local", event_bus.deployment.host);
        assert_eq!(6379, event_bus.deployment.port);
        assert_eq!(
            event_bus.access_key,
            deployment.specs.lock().unwrap()[0].env[ACCESS_KEY_ENV]
        );

        let second = setup_components(&settings, &mut deployment, &store).await.unwrap();
        for (before, after) in first.iter().zip(second.iter()) {
            assert_eq!(before.access_key, after.access_key);
        }
        let stored: ManagerComponent = store.get_by_id(COMPONENT_EVENT_BOX).await.unwrap();
        assert_eq!(2, stored.log.len());
    }

    #[tokio::test]
    async fn test_register_without_deploying() {
        let store = store();
        let mut deployment = RecordingDeployment::default();
        let components = setup_components(&ComponentsSettings::default(), &mut deployment, &store).await.unwrap();
        assert!(deployment.specs.lock().unwrap().is_empty());
        assert_eq!(COMPONENT_API_GATEWAY, components[1].deployment.host);
        assert_eq!(8000, components[1].deployment.port);
        assert_eq!(3, store.get_all::<ManagerComponent>().await.unwrap().len());
    }

    #[tokio::test]
    async fn test_deployment_failure() {
        let store = store();
        let mut deployment = RecordingDeployment::default();
        let mut settings = ComponentsSettings {
            deploy: true,
            ..Default::default()
        };
        settings.api_gateway.image = String::new();
        assert!(setup_components(&settings, &mut deployment, &store).await.is_err());
        assert_eq!(1, store.get_all::<ManagerComponent>().await.unwrap().len());
    }
}
