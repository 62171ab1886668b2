// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2023 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use futures::{SinkExt, StreamExt};
use stratus_api::common::{env_keys, COMPONENT_EVENT_BOX};
use stratus_api::deployment::WorkloadDetails;
use stratus_api::function::FunctionArtifact;
use stratus_api::image_builder::BuildError;
use stratus_api::persistence::Persistence;
use stratus_messenger::Transport;

use super::*;

enum MockDeploymentEvent {
    CreateOrUpdate(DeploymentSpec),
    Delete(String),
}

#[derive(Clone)]
struct MockDeployment {
    kind: DeploymentKind,
    sender: futures::channel::mpsc::UnboundedSender<MockDeploymentEvent>,
    workloads: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, DeploymentSpec>>>,
    reject: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait::async_trait]
impl Deployment for MockDeployment {
    async fn init(&mut self) -> Result<(), DeploymentError> {
        Ok(())
    }

    async fn create_or_update(&mut self, spec: DeploymentSpec) -> Result<String, DeploymentError> {
        if self.reject.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DeploymentError::Rejected("no such image".to_string()));
        }
        self.workloads.lock().unwrap().insert(spec.name.clone(), spec.clone());
        self.sender.send(MockDeploymentEvent::CreateOrUpdate(spec)).await.unwrap();
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn delete(&mut self, name: &str) -> Result<(), DeploymentError> {
        if self.workloads.lock().unwrap().remove(name).is_none() {
            return Err(DeploymentError::NotFound(name.to_string()));
        }
        self.sender.send(MockDeploymentEvent::Delete(name.to_string())).await.unwrap();
        Ok(())
    }

    async fn list_by_name(&mut self, name: &str) -> Result<WorkloadDetails, DeploymentError> {
        match self.workloads.lock().unwrap().get(name) {
            Some(spec) => Ok(WorkloadDetails {
                host: spec.name.clone(),
                port_configs: spec.port_configs.clone(),
                status: "running".to_string(),
            }),
            None => Err(DeploymentError::NotFound(name.to_string())),
        }
    }

    async fn logs_by_name(&mut self, name: &str, _options: LogOptions) -> Result<LogStream, DeploymentError> {
        if !self.workloads.lock().unwrap().contains_key(name) {
            return Err(DeploymentError::NotFound(name.to_string()));
        }
        let (mut sender, receiver) = futures::channel::mpsc::unbounded();
        sender.send(format!("{} started", name)).await.unwrap();
        Ok(receiver)
    }

    fn deployment_type(&self) -> DeploymentKind {
        self.kind
    }
}

struct MockImageBuilder {
    fail: bool,
}

#[async_trait::async_trait]
impl ImageBuilder for MockImageBuilder {
    async fn build(&self, context_dir: &std::path::Path, _runtime: stratus_api::function::Runtime, tag: &str) -> Result<String, BuildError> {
        assert!(context_dir.join("Dockerfile").exists());
        match self.fail {
            true => Err(BuildError::BuildFailed("missing base image".to_string())),
            false => Ok(tag.to_string()),
        }
    }

    async fn push(&self, _image: &str) -> Result<(), BuildError> {
        Ok(())
    }
}

struct Setup {
    manager: FunctionManager,
    store: Store,
    deployment: MockDeployment,
    events: futures::channel::mpsc::UnboundedReceiver<MockDeploymentEvent>,
    transport: std::sync::Arc<dyn Transport>,
}

/// Memory store where every function creation loses the race against a
/// concurrent one, after validation saw no function.
struct RacingPersistence {
    inner: crate::store::memory::MemoryPersistence,
}

#[async_trait::async_trait]
impl Persistence for RacingPersistence {
    async fn add(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        if kind == <Function as stratus_api::entity::Entity>::KIND {
            return Err(PersistenceError::already_exists(kind, id));
        }
        self.inner.add(kind, id, value).await
    }
    async fn update(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.inner.update(kind, id, value).await
    }
    async fn save(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.inner.save(kind, id, value).await
    }
    async fn delete(&self, kind: &str, id: &str) -> Result<(), PersistenceError> {
        self.inner.delete(kind, id).await
    }
    async fn get(&self, kind: &str, id: &str) -> Result<Vec<u8>, PersistenceError> {
        self.inner.get(kind, id).await
    }
    async fn get_all(&self, kind: &str) -> Result<Vec<Vec<u8>>, PersistenceError> {
        self.inner.get_all(kind).await
    }
    async fn append_log(&self, kind: &str, id: &str, log: stratus_api::entity::EntityLog) -> Result<(), PersistenceError> {
        self.inner.append_log(kind, id, log).await
    }
    async fn logs(&self, kind: &str, id: &str) -> Result<Vec<stratus_api::entity::EntityLog>, PersistenceError> {
        self.inner.logs(kind, id).await
    }
}

async fn test_setup(kind: DeploymentKind, build_fails: bool) -> Setup {
    test_setup_with_store(kind, build_fails, Store::new(std::sync::Arc::new(crate::store::memory::MemoryPersistence::new()))).await
}

async fn test_setup_with_store(kind: DeploymentKind, build_fails: bool, store: Store) -> Setup {
    let (sender, events) = futures::channel::mpsc::unbounded();
    let deployment = MockDeployment {
        kind,
        sender,
        workloads: std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        reject: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
    };
    let transport: std::sync::Arc<dyn Transport> = std::sync::Arc::new(stratus_messenger::local_bus::LocalBus::new());
    let messenger = stratus_messenger::Messenger::new("stratus-mgr-test", transport.clone()).await.unwrap();

    let settings = FunctionManagerSettings {
        build_dir: std::env::temp_dir().to_string_lossy().to_string(),
        registry_server: None,
        event_bus: crate::EventBusSettings {
            host: "10.0.0.1".to_string(),
            port: 6379,
            exchange: "stratus".to_string(),
            ..Default::default()
        },
    };
    let manager = FunctionManager::new(
        settings,
        Box::new(deployment.clone()),
        store.clone(),
        std::sync::Arc::new(MockImageBuilder { fail: build_fails }),
        Some(messenger),
    );
    Setup {
        manager,
        store,
        deployment,
        events,
        transport,
    }
}

fn hello_submission() -> FunctionSubmission {
    FunctionSubmission {
        function: Function {
            name: "hello".to_string(),
            runtime: "nodejs".to_string(),
            handler: "index.handler".to_string(),
            events: vec!["orders.created".to_string()],
            ..Default::default()
        },
        route: Some(Resource {
            url: "/hello".to_string(),
            request_method: "get".to_string(),
            ..Default::default()
        }),
        artifact: FunctionArtifact {
            file_name: "index.js".to_string(),
            content: b"exports.handler = (req, res) => res.send('hello')".to_vec(),
        },
        options: Default::default(),
    }
}

fn log_states(function: &Function) -> Vec<&str> {
    function.log.iter().map(|l| l.state.as_str()).collect()
}

fn expect_deployed(event: Option<MockDeploymentEvent>) -> DeploymentSpec {
    match event {
        Some(MockDeploymentEvent::CreateOrUpdate(spec)) => spec,
        Some(MockDeploymentEvent::Delete(name)) => panic!("unexpected delete of {}", name),
        None => panic!("no deployment event"),
    }
}

#[tokio::test]
async fn test_create_function_end_to_end() {
    let mut setup = test_setup(DeploymentKind::Docker, false).await;
    let mut reloads = setup.transport.subscribe(EVENT_APIGATEWAY_RELOAD, "").await.unwrap();

    let function = setup.manager.save_function(hello_submission(), true).await.unwrap();
    assert_eq!("0.1.0", function.version);
    assert_eq!(vec!["0.1.0".to_string()], function.versions);
    assert_eq!("hello:0.1.0", function.image);
    assert_eq!("index.js", function.handler_file);
    assert_eq!("handler", function.handler_path);
    assert_eq!(1, function.replicas);
    assert_eq!(32, function.secret_key.len());
    assert_eq!("/hello:GET", function.route);
    assert_eq!(vec!["users.orders.created".to_string(), "function.hello".to_string()], function.events);
    assert_eq!(
        vec![log_state::SAVED, log_state::IMAGE_CREATED, log_state::DEPLOYED],
        log_states(&function)
    );

    let spec = expect_deployed(setup.events.next().await);
    assert_eq!("stratus-function-hello", spec.name);
    assert_eq!("hello:0.1.0", spec.image);
    assert_eq!(1, spec.replicas);
    assert!(spec.port_configs.is_empty());
    assert_eq!("hello", spec.env[env_keys::APP_ID]);
    assert_eq!("users.orders.created,function.hello", spec.env[env_keys::EVENTS]);

    let route: Resource = setup.store.get_by_id("/hello:GET").await.unwrap();
    assert_eq!("hello", route.name);
    assert_eq!("function.hello", route.event);
    assert!(reloads.next().await.is_some());

    let events = EventCatalog::new(setup.store.clone()).list().await.unwrap();
    assert_eq!(vec!["users.orders.created".to_string()], events.iter().map(|e| e.id.clone()).collect::<Vec<String>>());

    assert_eq!("running", setup.manager.get_function_status("hello").await.unwrap());
    match setup.manager.save_function(hello_submission(), true).await {
        Err(FunctionError::AlreadyExists(msg)) => assert_eq!(MSG_ALREADY_EXISTS, msg),
        other => panic!("unexpected result: {:?}", other.map(|f| f.name)),
    }
}

#[tokio::test]
async fn test_update_keeps_secret_and_tracks_versions() {
    let mut setup = test_setup(DeploymentKind::Docker, false).await;
    let created = setup.manager.save_function(hello_submission(), true).await.unwrap();

    let mut update = hello_submission();
    update.function.version = "0.2.0".to_string();
    update.function.replicas = 3;
    update.route = None;
    let updated = setup.manager.save_function(update, false).await.unwrap();
    assert_eq!(created.secret_key, updated.secret_key);
    assert_eq!(vec!["0.1.0".to_string(), "0.2.0".to_string()], updated.versions);
    assert_eq!("hello:0.2.0", updated.image);
    assert_eq!("/hello:GET", updated.route);
    assert_eq!(1, updated.events.iter().filter(|e| *e == "function.hello").count());

    expect_deployed(setup.events.next().await);
    let spec = expect_deployed(setup.events.next().await);
    assert_eq!(3, spec.replicas);
    assert_eq!("hello:0.2.0", spec.image);

    let redeployed = setup.manager.deploy_version("hello", "0.1.0").await.unwrap();
    assert_eq!("0.1.0", redeployed.version);
    assert_eq!("hello:0.1.0", expect_deployed(setup.events.next().await).image);

    match setup.manager.deploy_version("hello", "9.9.9").await {
        Err(FunctionError::VersionNotAcceptable(_)) => {}
        other => panic!("unexpected result: {:?}", other.map(|f| f.version)),
    }

    let mut missing = hello_submission();
    missing.function.name = "missing".to_string();
    assert!(matches!(setup.manager.save_function(missing, false).await, Err(FunctionError::NotFound(_))));
}

#[tokio::test]
async fn test_update_without_version_keeps_version() {
    let mut setup = test_setup(DeploymentKind::Docker, false).await;
    setup.manager.save_function(hello_submission(), true).await.unwrap();
    expect_deployed(setup.events.next().await);

    let mut update = hello_submission();
    update.function.version = String::new();
    let updated = setup.manager.save_function(update, false).await.unwrap();
    assert_eq!("0.1.0", updated.version);
    assert_eq!(vec!["0.1.0".to_string()], updated.versions);
    assert_eq!("hello:0.1.0", expect_deployed(setup.events.next().await).image);

    let stored = setup.manager.get_function("hello").await.unwrap();
    assert_eq!("0.1.0", stored.version);
    assert_eq!(vec!["0.1.0".to_string()], stored.versions);
}

#[tokio::test]
async fn test_lost_creation_race_registers_no_event() {
    let store = Store::new(std::sync::Arc::new(RacingPersistence {
        inner: crate::store::memory::MemoryPersistence::new(),
    }));
    let mut setup = test_setup_with_store(DeploymentKind::Docker, false, store).await;

    match setup.manager.save_function(hello_submission(), true).await {
        Err(FunctionError::AlreadyExists(msg)) => assert_eq!(MSG_ALREADY_EXISTS, msg),
        other => panic!("unexpected result: {:?}", other.map(|f| f.name)),
    }
    assert!(EventCatalog::new(setup.store.clone()).list().await.unwrap().is_empty());
    assert!(setup.events.try_next().is_err());
}

#[tokio::test]
async fn test_build_failure_is_logged_and_aborts() {
    let mut setup = test_setup(DeploymentKind::Docker, true).await;
    match setup.manager.save_function(hello_submission(), true).await {
        Err(FunctionError::BuildFailed(_)) => {}
        other => panic!("unexpected result: {:?}", other.map(|f| f.name)),
    }
    let stored: Function = setup.store.get_by_id("hello").await.unwrap();
    assert_eq!(vec![log_state::SAVED, log_state::IMAGE_BUILDING_FAILED], log_states(&stored));
    assert!(stored.image.is_empty());
    assert!(setup.deployment.workloads.lock().unwrap().is_empty());
    assert!(setup.store.find::<Resource>("/hello:GET").await.unwrap().is_none());
}

#[tokio::test]
async fn test_deployment_failure_leaves_function_saved() {
    let mut setup = test_setup(DeploymentKind::Docker, false).await;
    setup.deployment.reject.store(true, std::sync::atomic::Ordering::SeqCst);
    match setup.manager.save_function(hello_submission(), true).await {
        Err(FunctionError::DeploymentRejected(msg)) => assert_eq!("no such image", msg),
        other => panic!("unexpected result: {:?}", other.map(|f| f.name)),
    }
    let stored: Function = setup.store.get_by_id("hello").await.unwrap();
    assert_eq!("hello:0.1.0", stored.image);
    assert_eq!(
        vec![log_state::SAVED, log_state::IMAGE_CREATED, log_state::DEPLOYMENT_FAILED],
        log_states(&stored)
    );
    assert_eq!(FUNCTION_STATUS_NOT_FOUND, setup.manager.get_function_status("hello").await.unwrap());
}

#[tokio::test]
async fn test_kubernetes_environment() {
    let mut setup = test_setup(DeploymentKind::Kubernetes, false).await;
    setup.deployment.workloads.lock().unwrap().insert(
        COMPONENT_EVENT_BOX.to_string(),
        DeploymentSpec {
            name: COMPONENT_EVENT_BOX.to_string(),
            port_configs: vec![PortConfig {
                name: "http".to_string(),
                port: 8080,
                target_port: 8080,
            }],
            ..Default::default()
        },
    );

    let mut submission = hello_submission();
    submission.function.env = vec![stratus_api::function::EnvironmentVariable {
        name: "GREETING".to_string(),
        value: "hi".to_string(),
    }];
    setup.manager.save_function(submission, true).await.unwrap();

    let spec = expect_deployed(setup.events.next().await);
    for key in env_keys::RESERVED {
        assert!(spec.env.contains_key(key), "missing {}", key);
    }
    assert_eq!("http://stratus-eventbox:8080", spec.env[env_keys::EVENTBOX_URI]);
    assert_eq!("10.0.0.1", spec.env[env_keys::EVENTBUS_HOST]);
    assert_eq!("6379", spec.env[env_keys::EVENTBUS_PORT]);
    assert_eq!("hi", spec.env["GREETING"]);
    assert_eq!(
        vec![PortConfig {
            name: "http".to_string(),
            port: 80,
            target_port: 80
        }],
        spec.port_configs
    );
}

#[tokio::test]
async fn test_stop_and_delete_function() {
    let mut setup = test_setup(DeploymentKind::Docker, false).await;
    setup.manager.save_function(hello_submission(), true).await.unwrap();
    expect_deployed(setup.events.next().await);

    let mut logs = setup.manager.function_logs("hello", LogOptions::default()).await.unwrap();
    assert_eq!(Some("stratus-function-hello started".to_string()), logs.next().await);

    setup.manager.stop_function("hello").await.unwrap();
    match setup.events.next().await {
        Some(MockDeploymentEvent::Delete(name)) => assert_eq!("stratus-function-hello", name),
        _ => panic!("expected a delete"),
    }
    let stopped = setup.manager.get_function("hello").await.unwrap();
    assert_eq!(FUNCTION_STATUS_NOT_FOUND, stopped.status);
    assert_eq!(Some(&log_state::STOPPED), log_states(&stopped).last());

    // stopping again surfaces the backend error
    assert!(matches!(setup.manager.stop_function("hello").await, Err(FunctionError::NotFound(_))));

    setup.manager.delete_function("hello").await.unwrap();
    assert!(setup.manager.list_functions().await.unwrap().is_empty());
    assert!(setup.store.find::<Resource>("/hello:GET").await.unwrap().is_none());
    assert!(matches!(setup.manager.get_function("hello").await, Err(FunctionError::NotFound(_))));
    assert!(matches!(setup.manager.delete_function("hello").await, Err(FunctionError::NotFound(_))));
}
