// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use super::*;

fn spec(ports: bool) -> DeploymentSpec {
    DeploymentSpec {
        name: "stratus-function-hello".to_string(),
        image: "hello:0.1.0".to_string(),
        port_configs: match ports {
            true => vec![PortConfig {
                name: "http".to_string(),
                port: 80,
                target_port: 80,
            }],
            false => vec![],
        },
        env: std::collections::HashMap::from([("app_id".to_string(), "stratus".to_string())]),
        replicas: 2,
    }
}

#[test]
fn test_deployment_manifest() {
    let manifest = deployment_manifest(&spec(true), "faas");
    assert_eq!(Some("stratus-function-hello".to_string()), manifest.metadata.name);
    assert_eq!(Some("faas".to_string()), manifest.metadata.namespace);
    let dep_spec = manifest.spec.unwrap();
    assert_eq!(Some(2), dep_spec.replicas);
    assert_eq!(
        Some(&"stratus-function-hello".to_string()),
        dep_spec.selector.match_labels.as_ref().unwrap().get("app")
    );
    let container = &dep_spec.template.spec.as_ref().unwrap().containers[0];
    assert_eq!(Some("hello:0.1.0".to_string()), container.image);
    assert_eq!("app_id", container.env.as_ref().unwrap()[0].name);
    assert_eq!(80, container.ports.as_ref().unwrap()[0].container_port);

    // server-side apply needs the type information in the body
    let json = serde_json::to_value(deployment_manifest(&spec(false), "faas")).unwrap();
    assert_eq!("apps/v1", json["apiVersion"]);
    assert_eq!("Deployment", json["kind"]);
}

#[test]
fn test_service_manifest() {
    assert!(service_manifest(&spec(false), "faas").is_none());
    let service = service_manifest(&spec(true), "faas").unwrap();
    assert_eq!(
        vec![PortConfig {
            name: "http".to_string(),
            port: 80,
            target_port: 80
        }],
        service_ports(&service)
    );
}

#[test]
fn test_deployment_status() {
    let mut deployment = deployment_manifest(&spec(false), "faas");
    assert_eq!("pending", deployment_status(&deployment));

    deployment.status = Some(apps::DeploymentStatus {
        available_replicas: Some(2),
        ..Default::default()
    });
    assert_eq!("running", deployment_status(&deployment));

    deployment.status = Some(apps::DeploymentStatus {
        available_replicas: Some(0),
        conditions: Some(vec![apps::DeploymentCondition {
            type_: "ReplicaFailure".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    assert_eq!("failed", deployment_status(&deployment));

    if let Some(s) = deployment.spec.as_mut() {
        s.replicas = Some(0);
    }
    assert_eq!("stopped", deployment_status(&deployment));
}

#[tokio::test]
async fn test_kubernetes_not_initialized() {
    let mut deployment = KubernetesDeployment::new(crate::KubernetesSettings::default());
    assert!(matches!(deployment.delete("any").await, Err(DeploymentError::BackendUnavailable(_))));
    assert!(matches!(
        deployment.logs_by_name("any", LogOptions::default()).await,
        Err(DeploymentError::Unsupported(_))
    ));
}
