//! The slice of the Kubernetes API consumed by node selection, drains and disruption actions.
mod error;

pub use self::error::{ClusterError, Result};
use self::error::{
    DeleteNodeSnafu, DeletePodSnafu, EvictPodSnafu, GetPodSnafu, InvalidObjectSnafu,
    ListNodesSnafu, ListPodsSnafu, PatchNodeSnafu,
};
use crate::constants::{NODE_NAME_FIELD, POD_NODE_NAME_FIELD};
use crate::node::Node;
use crate::pod::Pod;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod as K8sPod};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use snafu::ResultExt;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

#[cfg(feature = "mockall")]
use mockall::mock;

/// Selects the nodes returned by [`ClusterClient::list_nodes`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeListParams {
    pub label_selector: Option<String>,
    pub node_name: Option<String>,
}

impl NodeListParams {
    /// All nodes carrying the given labels. An absent or empty selector matches every node.
    pub fn labelled(label_selector: Option<String>) -> Self {
        NodeListParams {
            label_selector: label_selector.filter(|selector| !selector.is_empty()),
            node_name: None,
        }
    }

    pub fn named<S: Into<String>>(node_name: S) -> Self {
        NodeListParams {
            label_selector: None,
            node_name: Some(node_name.into()),
        }
    }

    fn to_list_params(&self) -> ListParams {
        ListParams {
            label_selector: self.label_selector.clone(),
            field_selector: self
                .node_name
                .as_ref()
                .map(|name| format!("{}={}", NODE_NAME_FIELD, name)),
            ..Default::default()
        }
    }
}

impl fmt::Display for NodeListParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.node_name, &self.label_selector) {
            (Some(name), _) => write!(f, "{}={}", NODE_NAME_FIELD, name),
            (None, Some(selector)) => write!(f, "{}", selector),
            (None, None) => write!(f, "<all nodes>"),
        }
    }
}

/// Selects the pods returned by [`ClusterClient::list_pods`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodListParams {
    /// Restricts the listing to one namespace. All namespaces are searched when absent.
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub node_name: Option<String>,
}

impl PodListParams {
    /// Every pod scheduled on the node, across all namespaces.
    pub fn on_node<S: Into<String>>(node_name: S) -> Self {
        PodListParams {
            namespace: None,
            label_selector: None,
            node_name: Some(node_name.into()),
        }
    }

    pub fn in_namespace<S: Into<String>>(namespace: S, label_selector: Option<String>) -> Self {
        PodListParams {
            namespace: Some(namespace.into()),
            label_selector: label_selector.filter(|selector| !selector.is_empty()),
            node_name: None,
        }
    }

    fn to_list_params(&self) -> ListParams {
        ListParams {
            label_selector: self.label_selector.clone(),
            field_selector: self
                .node_name
                .as_ref()
                .map(|name| format!("{}={}", POD_NODE_NAME_FIELD, name)),
            ..Default::default()
        }
    }
}

impl fmt::Display for PodListParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut selectors = Vec::new();
        if let Some(namespace) = &self.namespace {
            selectors.push(format!("namespace={}", namespace));
        }
        if let Some(node_name) = &self.node_name {
            selectors.push(format!("{}={}", POD_NODE_NAME_FIELD, node_name));
        }
        if let Some(label_selector) = &self.label_selector {
            selectors.push(label_selector.clone());
        }
        if selectors.is_empty() {
            write!(f, "<all pods>")
        } else {
            write!(f, "{}", selectors.join(","))
        }
    }
}

#[async_trait]
/// A trait providing an interface to the cluster-management API. This is provided as a trait
/// in order to allow mocks to be used for testing purposes.
pub trait ClusterClient: Clone + Sized + Send + Sync {
    /// List the nodes matching `params`, in the order returned by the API.
    async fn list_nodes(&self, params: &NodeListParams) -> Result<Vec<Node>>;
    /// Marks a node as (un)schedulable. Setting the flag to its current value is a no-op.
    async fn set_node_schedulable(&self, node_name: &str, schedulable: bool) -> Result<()>;
    /// Apply a JSON merge patch to a node.
    async fn patch_node(&self, node_name: &str, patch: &serde_json::Value) -> Result<()>;
    async fn delete_node(&self, node_name: &str, grace_period_seconds: Option<u32>)
        -> Result<()>;
    async fn list_pods(&self, params: &PodListParams) -> Result<Vec<Pod>>;
    /// Create an eviction for a pod. Evictions respect PodDisruptionBudgets.
    async fn evict_pod(&self, pod_name: &str, namespace: &str) -> Result<()>;
    /// Fetch a pod, returning `None` if it does not exist.
    async fn get_pod(&self, pod_name: &str, namespace: &str) -> Result<Option<Pod>>;
    async fn delete_pod(&self, pod_name: &str, namespace: &str) -> Result<()>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock ClusterClient for use in tests.
    pub ClusterClient {}
    #[async_trait]
    impl ClusterClient for ClusterClient {
        async fn list_nodes(&self, params: &NodeListParams) -> Result<Vec<Node>>;
        async fn set_node_schedulable(&self, node_name: &str, schedulable: bool) -> Result<()>;
        async fn patch_node(&self, node_name: &str, patch: &serde_json::Value) -> Result<()>;
        async fn delete_node(&self, node_name: &str, grace_period_seconds: Option<u32>)
            -> Result<()>;
        async fn list_pods(&self, params: &PodListParams) -> Result<Vec<Pod>>;
        async fn evict_pod(&self, pod_name: &str, namespace: &str) -> Result<()>;
        async fn get_pod(&self, pod_name: &str, namespace: &str) -> Result<Option<Pod>>;
        async fn delete_pod(&self, pod_name: &str, namespace: &str) -> Result<()>;
    }

    impl Clone for ClusterClient {
        fn clone(&self) -> Self;
    }
}

#[async_trait]
impl<T> ClusterClient for Arc<T>
where
    T: ClusterClient,
{
    async fn list_nodes(&self, params: &NodeListParams) -> Result<Vec<Node>> {
        (**self).list_nodes(params).await
    }

    async fn set_node_schedulable(&self, node_name: &str, schedulable: bool) -> Result<()> {
        (**self).set_node_schedulable(node_name, schedulable).await
    }

    async fn patch_node(&self, node_name: &str, patch: &serde_json::Value) -> Result<()> {
        (**self).patch_node(node_name, patch).await
    }

    async fn delete_node(
        &self,
        node_name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()> {
        (**self).delete_node(node_name, grace_period_seconds).await
    }

    async fn list_pods(&self, params: &PodListParams) -> Result<Vec<Pod>> {
        (**self).list_pods(params).await
    }

    async fn evict_pod(&self, pod_name: &str, namespace: &str) -> Result<()> {
        (**self).evict_pod(pod_name, namespace).await
    }

    async fn get_pod(&self, pod_name: &str, namespace: &str) -> Result<Option<Pod>> {
        (**self).get_pod(pod_name, namespace).await
    }

    async fn delete_pod(&self, pod_name: &str, namespace: &str) -> Result<()> {
        (**self).delete_pod(pod_name, namespace).await
    }
}

#[derive(Clone)]
/// Concrete implementation of the `ClusterClient` trait backed by `kube-rs`. This implementation
/// will almost certainly be used in any case that isn't a unit test.
pub struct K8SClusterClient {
    k8s_client: kube::client::Client,
}

impl K8SClusterClient {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SClusterClient { k8s_client }
    }

    fn nodes(&self) -> Api<K8sNode> {
        Api::all(self.k8s_client.clone())
    }

    fn namespaced_pods(&self, namespace: &str) -> Api<K8sPod> {
        Api::namespaced(self.k8s_client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for K8SClusterClient {
    #[instrument(skip(self), err)]
    async fn list_nodes(&self, params: &NodeListParams) -> Result<Vec<Node>> {
        let node_list = self
            .nodes()
            .list(&params.to_list_params())
            .await
            .context(ListNodesSnafu {
                selector: params.to_string(),
            })?;

        node_list
            .items
            .iter()
            .map(|node| Node::try_from(node).context(InvalidObjectSnafu))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn set_node_schedulable(&self, node_name: &str, schedulable: bool) -> Result<()> {
        let nodes = self.nodes();
        let patched = if schedulable {
            nodes.uncordon(node_name).await
        } else {
            nodes.cordon(node_name).await
        };
        patched.context(PatchNodeSnafu { node_name })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn patch_node(&self, node_name: &str, patch: &serde_json::Value) -> Result<()> {
        self.nodes()
            .patch(node_name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .context(PatchNodeSnafu { node_name })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_node(
        &self,
        node_name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()> {
        let delete_params = DeleteParams {
            grace_period_seconds,
            ..Default::default()
        };
        self.nodes()
            .delete(node_name, &delete_params)
            .await
            .context(DeleteNodeSnafu { node_name })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_pods(&self, params: &PodListParams) -> Result<Vec<Pod>> {
        let pods: Api<K8sPod> = match params.namespace.as_ref() {
            Some(namespace) => self.namespaced_pods(namespace),
            None => Api::all(self.k8s_client.clone()),
        };

        let pod_list = pods
            .list(&params.to_list_params())
            .await
            .context(ListPodsSnafu {
                selector: params.to_string(),
            })?;

        pod_list
            .items
            .iter()
            .map(|pod| Pod::try_from(pod).context(InvalidObjectSnafu))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn evict_pod(&self, pod_name: &str, namespace: &str) -> Result<()> {
        self.namespaced_pods(namespace)
            .evict(pod_name, &EvictParams::default())
            .await
            .context(EvictPodSnafu {
                pod_name,
                namespace,
            })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_pod(&self, pod_name: &str, namespace: &str) -> Result<Option<Pod>> {
        match self.namespaced_pods(namespace).get(pod_name).await {
            Ok(pod) => Pod::try_from(&pod).context(InvalidObjectSnafu).map(Some),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e).context(GetPodSnafu {
                pod_name,
                namespace,
            }),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_pod(&self, pod_name: &str, namespace: &str) -> Result<()> {
        self.namespaced_pods(namespace)
            .delete(pod_name, &DeleteParams::default())
            .await
            .context(DeletePodSnafu {
                pod_name,
                namespace,
            })?;

        Ok(())
    }
}
