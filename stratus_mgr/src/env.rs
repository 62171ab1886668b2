// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use stratus_api::common::{env_keys, COMPONENT_EVENT_BOX, COMPONENT_EVENT_BUS, EVENT_PREFIX_USER_DEFINED, EVENT_REQUEST_TRACKER};
use stratus_api::deployment::{Deployment, DeploymentKind};
use stratus_api::function::Function;

use crate::EventBusSettings;

/// URI of the event box, empty if it cannot be located.
pub async fn event_box_uri(deployment: &mut dyn Deployment) -> String {
    match deployment.list_by_name(COMPONENT_EVENT_BOX).await {
        Ok(details) => match details.port_configs.first() {
            Some(port_config) => format!("http://{}:{}", details.host, port_config.port),
            None => {
                log::warn!("event box {} does not publish any port", COMPONENT_EVENT_BOX);
                String::new()
            }
        },
        Err(err) => {
            log::warn!("could not locate the event box: {}", err);
            String::new()
        }
    }
}

/// Environment of the workload of a function.
pub async fn prepare_env_keys(event_bus: &EventBusSettings, deployment: &mut dyn Deployment, function: &Function) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(env_keys::APP_ID.to_string(), function.name.clone());

    // in Docker the event bus is reached through its service name
    let host = match deployment.deployment_type() {
        DeploymentKind::Docker => COMPONENT_EVENT_BUS.to_string(),
        DeploymentKind::Kubernetes => event_bus.host.clone(),
    };
    env.insert(env_keys::EVENTBUS_HOST.to_string(), host);
    env.insert(env_keys::EVENTBUS_PORT.to_string(), event_bus.port.to_string());
    env.insert(env_keys::EVENTBUS_EXCHANGE.to_string(), event_bus.exchange.clone());
    env.insert(env_keys::EVENTBUS_MANAGEMENT_USERNAME.to_string(), event_bus.management_username.clone());
    env.insert(env_keys::EVENTBUS_MANAGEMENT_PASSWORD.to_string(), event_bus.management_password.clone());
    env.insert(env_keys::EVENT_PREFIX_USER_DEFINED.to_string(), EVENT_PREFIX_USER_DEFINED.to_string());
    env.insert(env_keys::EVENT_LOG_LISTENER.to_string(), EVENT_REQUEST_TRACKER.to_string());
    env.insert(env_keys::EVENTS.to_string(), function.events.join(","));
    env.insert(env_keys::ARTIFACT_LOCATION.to_string(), function.handler_file.clone());
    env.insert(env_keys::FUNCTION_PATH.to_string(), function.handler_path.clone());

    for var in &function.env {
        let name = var.name.trim();
        if !name.is_empty() && !env_keys::RESERVED.contains(&name) {
            env.insert(name.to_string(), var.value.clone());
        }
    }

    env.insert(env_keys::EVENTBOX_URI.to_string(), event_box_uri(deployment).await);
    env
}
