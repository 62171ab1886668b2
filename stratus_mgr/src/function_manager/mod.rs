// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::EVENT_APIGATEWAY_RELOAD;
use stratus_api::deployment::{Deployment, DeploymentError, DeploymentKind, DeploymentSpec, LogOptions, LogStream, PortConfig};
use stratus_api::entity::log_state;
use stratus_api::function::{Function, FunctionSubmission, FUNCTION_STATUS_NOT_FOUND};
use stratus_api::image_builder::ImageBuilder;
use stratus_api::persistence::PersistenceError;
use stratus_api::resource::Resource;

use crate::error::FunctionError;
use crate::event_catalog::{function_event, EventCatalog};
use crate::store::Store;
use crate::validation::{validate_submission, MSG_ALREADY_EXISTS, MSG_NOT_FOUND, MSG_RUNTIME_NOT_MATCH};

#[cfg(test)]
pub mod test;

/// Prefix of the workloads running functions.
pub const SERVICE_PREFIX: &str = "stratus-function-";

/// Name of the workload of a function.
pub fn service_name(function_name: &str) -> String {
    format!("{}{}", SERVICE_PREFIX, function_name)
}

#[derive(Debug, Clone, Default)]
pub struct FunctionManagerSettings {
    /// Directory under which the build contexts are staged.
    pub build_dir: String,
    /// Registry prefixed to the image references, if any.
    pub registry_server: Option<String>,
    pub event_bus: crate::EventBusSettings,
}

/// Lifecycle of the functions: validation, build, deployment and tracking.
///
/// Each call runs its state transitions sequentially, independent functions
/// can be handled concurrently on clones.
#[derive(Clone)]
pub struct FunctionManager {
    settings: FunctionManagerSettings,
    deployment: Box<dyn Deployment>,
    store: Store,
    events: EventCatalog,
    image_builder: std::sync::Arc<dyn ImageBuilder>,
    messenger: Option<stratus_messenger::Messenger>,
}

impl FunctionManager {
    pub fn new(
        settings: FunctionManagerSettings,
        deployment: Box<dyn Deployment>,
        store: Store,
        image_builder: std::sync::Arc<dyn ImageBuilder>,
        messenger: Option<stratus_messenger::Messenger>,
    ) -> Self {
        Self {
            settings,
            deployment,
            events: EventCatalog::new(store.clone()),
            store,
            image_builder,
            messenger,
        }
    }

    fn image_tag(&self, name: &str, version: &str) -> String {
        crate::function_create::image_tag(self.settings.registry_server.as_deref(), name, version)
    }

    async fn stored_function(&self, name: &str) -> Result<Function, FunctionError> {
        match self.store.get_by_id::<Function>(name.trim()).await {
            Ok(function) => Ok(function),
            Err(PersistenceError::NotFound { .. }) => Err(FunctionError::NotFound(MSG_NOT_FOUND.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    /// Create (`is_create`) or update a function: validate, persist, build
    /// its image, deploy it and bind its route.
    ///
    /// A failed deployment leaves the function saved with its image.
    pub async fn save_function(&mut self, mut submission: FunctionSubmission, is_create: bool) -> Result<Function, FunctionError> {
        let validated = validate_submission(&self.store, &mut submission, is_create).await?;

        let mut function = submission.function;
        let stored = validated.stored;
        function.secret_key = match &stored {
            Some(stored) if !stored.secret_key.is_empty() => stored.secret_key.clone(),
            _ => stratus_api::util::new_access_key(),
        };
        if function.replicas <= 0 {
            function.replicas = 1;
        }
        let own_event = function_event(&function.name);
        if !function.events.contains(&own_event) {
            function.events.push(own_event);
        }
        function.source = submission.artifact.file_name.clone();
        function.route = match (&submission.route, &stored) {
            (Some(route), _) if !route.url.is_empty() => Resource::make_id(&route.url, &route.request_method),
            (_, Some(stored)) => stored.route.clone(),
            _ => String::new(),
        };
        function.image = stored.as_ref().map(|s| s.image.clone()).unwrap_or_default();
        function.log.clear();
        function.status.clear();

        match is_create {
            true => self.store.add(&mut function).await.map_err(|err| match err {
                PersistenceError::AlreadyExists { .. } => FunctionError::AlreadyExists(MSG_ALREADY_EXISTS.to_string()),
                err => err.into(),
            })?,
            false => self.store.update(&mut function).await?,
        }
        // events are registered only once the record is stored
        for event in validated.events {
            self.events.register(event).await?;
        }
        log::info!("function {} saved, version {}", function.name, function.version);
        self.store.append_log_best_effort::<Function>(&function.name, log_state::SAVED, "").await;

        let tag = self.image_tag(&function.name, &function.version);
        let image = crate::function_create::build_function_image(
            self.image_builder.as_ref(),
            std::path::Path::new(&self.settings.build_dir),
            &function,
            &submission.artifact,
            &tag,
            submission.options.publish,
        )
        .await;
        function.image = match image {
            Ok(image) => image,
            Err(err) => {
                log::error!("image of function {} not built: {}", function.name, err);
                self.store
                    .append_log_best_effort::<Function>(&function.name, log_state::IMAGE_BUILDING_FAILED, &err.to_string())
                    .await;
                return Err(err);
            }
        };
        self.store.update(&mut function).await?;
        self.store
            .append_log_best_effort::<Function>(&function.name, log_state::IMAGE_CREATED, &function.image)
            .await;

        self.deploy_and_log(&function).await?;

        if let Some(route) = submission.route {
            if !route.url.is_empty() {
                self.save_route(route, &function.name).await?;
            }
        }

        self.stored_function(&function.name).await
    }

    async fn deploy_and_log(&mut self, function: &Function) -> Result<String, FunctionError> {
        match self.function_deploy(function).await {
            Ok(service) => {
                self.store
                    .append_log_best_effort::<Function>(&function.name, log_state::DEPLOYED, &function.version)
                    .await;
                Ok(service)
            }
            Err(err) => {
                log::error!("function {} not deployed: {}", function.name, err);
                self.store
                    .append_log_best_effort::<Function>(&function.name, log_state::DEPLOYMENT_FAILED, &err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    /// Create or update the workload of a function, returning its name.
    pub async fn function_deploy(&mut self, function: &Function) -> Result<String, FunctionError> {
        if function.runtime().is_none() {
            return Err(FunctionError::InvalidInput(vec![MSG_RUNTIME_NOT_MATCH.to_string()]));
        }

        let port_configs = match self.deployment.deployment_type() {
            DeploymentKind::Kubernetes => vec![PortConfig {
                name: "http".to_string(),
                port: 80,
                target_port: 80,
            }],
            DeploymentKind::Docker => vec![],
        };
        let spec = DeploymentSpec {
            name: service_name(&function.name),
            image: function.image.clone(),
            port_configs,
            env: crate::env::prepare_env_keys(&self.settings.event_bus, self.deployment.as_mut(), function).await,
            replicas: function.replicas.max(0) as u32,
        };
        let service = spec.name.clone();

        let placement = self.deployment.create_or_update(spec).await?;
        log::info!("{} deployed ({})", service, placement);
        Ok(service)
    }

    /// Deploy a version of a function found in its history.
    pub async fn deploy_version(&mut self, name: &str, version: &str) -> Result<Function, FunctionError> {
        let mut function = self.stored_function(name).await?;
        if !function.has_version(version) {
            return Err(FunctionError::VersionNotAcceptable(format!(
                "version {} of function {} not found, available: {}",
                version,
                function.name,
                function.versions.join(", ")
            )));
        }
        function.version = version.to_string();
        function.image = self.image_tag(&function.name, version);
        function.log.clear();
        function.status.clear();

        self.deploy_and_log(&function).await?;
        self.store.update(&mut function).await?;
        self.stored_function(name).await
    }

    /// Remove the workload of a function, keeping its record.
    pub async fn stop_function(&mut self, name: &str) -> Result<(), FunctionError> {
        let function = self.stored_function(name).await?;
        let service = service_name(&function.name);
        self.deployment.delete(&service).await?;
        log::info!("{} stopped", service);
        self.store.append_log_best_effort::<Function>(&function.name, log_state::STOPPED, "").await;
        Ok(())
    }

    /// Status of the workload of a function, `not-found` if it has none.
    pub async fn get_function_status(&mut self, name: &str) -> Result<String, FunctionError> {
        match self.deployment.list_by_name(&service_name(name.trim())).await {
            Ok(details) => Ok(details.status),
            Err(DeploymentError::NotFound(_)) => Ok(FUNCTION_STATUS_NOT_FOUND.to_string()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a function: its workload first, then its record and route.
    pub async fn delete_function(&mut self, name: &str) -> Result<(), FunctionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FunctionError::InvalidInput(vec!["function name should not be empty".to_string()]));
        }
        let function = self.stored_function(name).await?;

        match self.deployment.delete(&service_name(name)).await {
            Ok(_) | Err(DeploymentError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.store.delete::<Function>(name).await?;
        log::info!("function {} deleted", name);

        if !function.route.is_empty() {
            match self.store.delete::<Resource>(&function.route).await {
                Ok(_) => self.notify_gateway(&function.route).await,
                Err(PersistenceError::NotFound { .. }) => {}
                Err(err) => log::warn!("could not delete route {} of function {}: {}", function.route, name, err),
            }
        }
        Ok(())
    }

    pub async fn get_function(&mut self, name: &str) -> Result<Function, FunctionError> {
        let mut function = self.stored_function(name).await?;
        function.status = self.get_function_status(name).await?;
        Ok(function)
    }

    pub async fn list_functions(&mut self) -> Result<Vec<Function>, FunctionError> {
        let mut functions = self.store.get_all::<Function>().await?;
        for function in &mut functions {
            match self.get_function_status(&function.name).await {
                Ok(status) => function.status = status,
                Err(err) => log::warn!("could not retrieve the status of function {}: {}", function.name, err),
            }
        }
        Ok(functions)
    }

    pub async fn function_logs(&mut self, name: &str, options: LogOptions) -> Result<LogStream, FunctionError> {
        let function = self.stored_function(name).await?;
        Ok(self.deployment.logs_by_name(&service_name(&function.name), options).await?)
    }

    /// Bind a route to a function and tell the gateway.
    pub async fn save_route(&mut self, mut route: Resource, function_name: &str) -> Result<Resource, FunctionError> {
        route.name = function_name.to_string();
        route.event = function_event(function_name);
        route.id = Resource::make_id(&route.url, &route.request_method);
        self.store.save(&mut route).await?;
        log::info!("route {} bound to {}", route.id, route.event);
        self.notify_gateway(&route.id).await;
        Ok(route)
    }

    async fn notify_gateway(&self, route_id: &str) {
        if let Some(messenger) = &self.messenger {
            if let Err(err) = messenger.publish(EVENT_APIGATEWAY_RELOAD, serde_json::json!({ "resource": route_id })).await {
                log::warn!("could not notify the gateway: {}", err);
            }
        }
    }
}
