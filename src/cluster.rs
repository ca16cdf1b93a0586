//! Cluster API collaborator
//!
//! Namespace management and the read-only workload inspection used by the
//! details and logs operations. The production implementation uses kube-rs;
//! namespace creation goes through server-side apply so it never fails on
//! "already exists" and doesn't race with concurrent creators.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ListParams, LogParams, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::error::Result;

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "berth";

/// Exposed port of a service fronting a deployment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDetails {
    /// Service port
    pub port: i32,
    /// Target container port, when expressed numerically
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<i32>,
    /// Node port, for NodePort services only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

/// Ports, pods and services for one deployment in a bundle's namespace
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentDetails {
    /// Deployment name
    pub name: String,
    /// Ports exposed by services selecting this deployment
    pub ports: Vec<PortDetails>,
    /// Names of the deployment's pods
    pub pods: Vec<String>,
    /// Names of the services selecting this deployment
    pub services: Vec<String>,
}

/// Abstraction over the orchestration platform's API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Ensure the namespace exists (idempotent)
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// Details for every deployment in `namespace`
    async fn deployment_details(&self, namespace: &str) -> Result<Vec<DeploymentDetails>>;

    /// Logs of one pod in `namespace`
    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String>;
}

/// Kubernetes-backed cluster API
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let api: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(self.client.clone());
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
            .await?;
        Ok(())
    }

    async fn deployment_details(&self, namespace: &str) -> Result<Vec<DeploymentDetails>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let mut details = Vec::new();
        for deployment in deployments.list(&ListParams::default()).await?.items {
            let Some(name) = deployment.metadata.name.clone() else {
                continue;
            };
            // Bundle charts label their workload resources app=<deployment>.
            let selector = ListParams::default().labels(&format!("app={name}"));

            let service_list = services.list(&selector).await?;
            let mut ports = Vec::new();
            for service in &service_list.items {
                let Some(spec) = &service.spec else { continue };
                let is_node_port = spec.type_.as_deref() == Some("NodePort");
                for port in spec.ports.iter().flatten() {
                    ports.push(PortDetails {
                        port: port.port,
                        target: match &port.target_port {
                            Some(IntOrString::Int(v)) => Some(*v),
                            _ => None,
                        },
                        node_port: if is_node_port { port.node_port } else { None },
                    });
                }
            }

            let pod_names = pods
                .list(&selector)
                .await?
                .items
                .into_iter()
                .filter_map(|p| p.metadata.name)
                .collect();
            let service_names = service_list
                .items
                .into_iter()
                .filter_map(|s| s.metadata.name)
                .collect();

            details.push(DeploymentDetails {
                name,
                ports,
                pods: pod_names,
                services: service_names,
            });
        }
        Ok(details)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.logs(pod, &LogParams::default()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_details_omits_empty_fields() {
        let port = PortDetails {
            port: 80,
            target: Some(8080),
            node_port: None,
        };
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["port"], 80);
        assert_eq!(json["target"], 8080);
        assert!(json.get("nodePort").is_none());
    }
}
