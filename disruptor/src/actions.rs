//! Node and pod disruptions other than draining.
//!
//! Every action lists its targets first and then issues one API call per target, stopping at the
//! first failure. Targets already acted upon stay that way.
use crate::drain::NodeTarget;
use crate::error::{self, Result};
use crate::selector::select_active_nodes;
use crate::targets::{select_targets, SelectionPolicy};
use models::cluster::{ClusterClient, NodeListParams, PodListParams};
use models::node::{Node, Taint, TaintIgnoreList};

use regex::Regex;
use serde_json::{json, Map, Value};
use snafu::{OptionExt, ResultExt};
use tracing::{event, instrument, Level};

/// Marks every node matching `target` as unschedulable, returning the names of those nodes.
#[instrument(skip(client), err)]
pub async fn cordon_nodes<T: ClusterClient>(
    client: &T,
    target: &NodeTarget,
) -> Result<Vec<String>> {
    set_schedulable(client, target, false).await
}

/// Marks every node matching `target` as schedulable again, returning the names of those nodes.
#[instrument(skip(client), err)]
pub async fn uncordon_nodes<T: ClusterClient>(
    client: &T,
    target: &NodeTarget,
) -> Result<Vec<String>> {
    set_schedulable(client, target, true).await
}

async fn set_schedulable<T: ClusterClient>(
    client: &T,
    target: &NodeTarget,
    schedulable: bool,
) -> Result<Vec<String>> {
    let nodes = list_nodes_or_fail(client, &target.list_params()).await?;

    for node in &nodes {
        client
            .set_node_schedulable(node.name(), schedulable)
            .await
            .context(error::PatchSnafu {
                node_name: node.name(),
            })?;
        event!(
            Level::INFO,
            node = node.name(),
            schedulable,
            "Updated node schedulability."
        );
    }

    Ok(node_names(&nodes))
}

/// Deletes the nodes picked by `policy` among those matching `label_selector`.
///
/// Nodes are not drained beforehand. Depending on the cloud provider the backing instance may
/// also need to be terminated separately.
#[instrument(skip(client), err)]
pub async fn delete_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    policy: SelectionPolicy,
    grace_period_seconds: Option<u32>,
) -> Result<Vec<String>> {
    let params = NodeListParams::labelled(label_selector.map(String::from));
    let nodes = list_nodes_or_fail(client, &params).await?;
    let targets = select_targets(nodes, policy, &params.to_string())?;

    event!(
        Level::DEBUG,
        "Picked node(s) '{}' to be deleted",
        node_names(&targets).join(", ")
    );

    for node in &targets {
        event!(Level::WARN, node = node.name(), "Deleting node.");
        client
            .delete_node(node.name(), grace_period_seconds)
            .await
            .context(error::DeleteNodeSnafu {
                node_name: node.name(),
            })?;
    }

    Ok(node_names(&targets))
}

/// Replaces the taints of every node matching `label_selector` with `taint`.
#[instrument(skip(client), err)]
pub async fn taint_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    taint: &Taint,
) -> Result<Vec<String>> {
    let patch = json!({ "spec": { "taints": [taint.to_k8s()] } });
    let nodes = list_nodes(client, label_selector).await?;
    patch_nodes(client, &nodes, &patch, "Tainting").await
}

/// Clears all taints from every node matching `label_selector`.
#[instrument(skip(client), err)]
pub async fn remove_taints<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
) -> Result<Vec<String>> {
    let patch = json!({ "spec": { "taints": [] } });
    let nodes = list_nodes(client, label_selector).await?;
    patch_nodes(client, &nodes, &patch, "Removing taints from").await
}

/// Sets the label `key=value` on every node matching `label_selector`.
#[instrument(skip(client), err)]
pub async fn add_label_to_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    key: &str,
    value: &str,
) -> Result<Vec<String>> {
    let patch = labels_patch(key, Value::String(value.to_string()));
    let nodes = list_nodes(client, label_selector).await?;
    patch_nodes(client, &nodes, &patch, "Labelling").await
}

/// Removes the label `key` from every active node matching `label_selector`. Nodes carrying a
/// taint from `ignore_list` are left untouched.
#[instrument(skip(client, ignore_list), err)]
pub async fn remove_label_from_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    key: &str,
    ignore_list: &TaintIgnoreList,
) -> Result<Vec<String>> {
    let patch = labels_patch(key, Value::Null);
    let nodes = select_active_nodes(client, label_selector, ignore_list).await?;
    patch_nodes(client, &nodes, &patch, "Removing label from").await
}

/// Sets the label `key=value` on one active node, picked at random among those matching
/// `label_selector`. Returns the name of the labelled node.
#[instrument(skip(client, ignore_list), err)]
pub async fn label_random_node<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    key: &str,
    value: &str,
    ignore_list: &TaintIgnoreList,
) -> Result<String> {
    let candidates = select_active_nodes(client, label_selector, ignore_list).await?;
    let description = NodeListParams::labelled(label_selector.map(String::from)).to_string();
    let picked = select_targets(candidates, SelectionPolicy::random_one(), &description)?;

    let patch = labels_patch(key, Value::String(value.to_string()));
    let mut labelled = patch_nodes(client, &picked, &patch, "Labelling").await?;
    labelled.pop().context(error::NoEligibleNodesSnafu {
        selector: description,
    })
}

/// Deletes the pods picked by `policy` among those in `namespace` matching `label_selector`.
///
/// When `name_pattern` is given, only pods whose name starts with a match of the pattern are
/// considered. Returns the names of the deleted pods.
#[instrument(skip(client), err)]
pub async fn terminate_pods<T: ClusterClient>(
    client: &T,
    namespace: &str,
    label_selector: Option<&str>,
    name_pattern: Option<&str>,
    policy: SelectionPolicy,
) -> Result<Vec<String>> {
    let name_filter = name_pattern
        .map(|pattern| {
            Regex::new(&format!("^(?:{})", pattern)).context(error::NamePatternSnafu { pattern })
        })
        .transpose()?;

    let params = PodListParams::in_namespace(namespace, label_selector.map(String::from));
    let pods = client.list_pods(&params).await.context(error::QuerySnafu)?;
    event!(
        Level::DEBUG,
        "Found {} pods matching '{}'",
        pods.len(),
        params
    );

    let matching: Vec<_> = pods
        .into_iter()
        .filter(|pod| {
            name_filter
                .as_ref()
                .map_or(true, |filter| filter.is_match(pod.name()))
        })
        .collect();

    let mut description = params.to_string();
    if let Some(pattern) = name_pattern {
        description = format!("{},name~{}", description, pattern);
    }
    if matching.is_empty() {
        return error::NoMatchingPodsSnafu {
            selector: description,
        }
        .fail();
    }

    let targets = select_targets(matching, policy, &description)?;
    let mut terminated = Vec::with_capacity(targets.len());
    for pod in &targets {
        event!(Level::WARN, "Killing pod '{}'", pod);
        client
            .delete_pod(pod.name(), pod.namespace())
            .await
            .context(error::DeletePodSnafu {
                pod_name: pod.name(),
                namespace: pod.namespace(),
            })?;
        terminated.push(pod.name().to_string());
    }

    Ok(terminated)
}

async fn list_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
) -> Result<Vec<Node>> {
    let params = NodeListParams::labelled(label_selector.map(String::from));
    let nodes = client.list_nodes(&params).await.context(error::QuerySnafu)?;
    event!(
        Level::DEBUG,
        "Found {} node(s) matching '{}'",
        nodes.len(),
        params
    );
    Ok(nodes)
}

async fn list_nodes_or_fail<T: ClusterClient>(
    client: &T,
    params: &NodeListParams,
) -> Result<Vec<Node>> {
    let nodes = client.list_nodes(params).await.context(error::QuerySnafu)?;
    event!(
        Level::DEBUG,
        "Found {} node(s) matching '{}'",
        nodes.len(),
        params
    );

    if nodes.is_empty() {
        return error::NoEligibleNodesSnafu {
            selector: params.to_string(),
        }
        .fail();
    }
    Ok(nodes)
}

async fn patch_nodes<T: ClusterClient>(
    client: &T,
    nodes: &[Node],
    patch: &Value,
    action: &str,
) -> Result<Vec<String>> {
    for node in nodes {
        event!(Level::WARN, "{} node '{}'", action, node.name());
        client
            .patch_node(node.name(), patch)
            .await
            .context(error::PatchSnafu {
                node_name: node.name(),
            })?;
    }
    Ok(node_names(nodes))
}

/// A merge patch setting label `key` to `value`. A `null` value removes the label.
fn labels_patch(key: &str, value: Value) -> Value {
    let mut labels = Map::new();
    labels.insert(key.to_string(), value);
    json!({ "metadata": { "labels": labels } })
}

fn node_names(nodes: &[Node]) -> Vec<String> {
    nodes.iter().map(|node| node.name().to_string()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{api_error, node, owned_pod, taint, tainted_node};
    use crate::Error;
    use models::cluster::{ClusterError, MockClusterClient};
    use models::constants::{DEFAULT_CHAOS_LABEL, DEFAULT_CHAOS_LABEL_VALUE};

    use std::collections::HashSet;
    use std::num::NonZeroUsize;
    use std::sync::{Arc, Mutex};

    fn listing(nodes: Vec<Node>) -> MockClusterClient {
        let mut client = MockClusterClient::new();
        client
            .expect_list_nodes()
            .returning(move |_| Ok(nodes.clone()))
            .times(1);
        client
    }

    /// Records the node names passed to `patch_node`, along with the patch.
    fn recording_patches(client: &mut MockClusterClient) -> Arc<Mutex<Vec<(String, Value)>>> {
        let patches = Arc::new(Mutex::new(Vec::new()));
        let recorder = patches.clone();
        client.expect_patch_node().returning(move |name, patch| {
            recorder
                .lock()
                .unwrap()
                .push((name.to_string(), patch.clone()));
            Ok(())
        });
        patches
    }

    #[tokio::test]
    async fn test_cordon_by_name() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_nodes()
            .withf(|params| params.node_name.as_deref() == Some("worker-1"))
            .returning(|_| Ok(vec![node("worker-1")]))
            .times(1);
        client
            .expect_set_node_schedulable()
            .withf(|name, schedulable| name == "worker-1" && !*schedulable)
            .returning(|_, _| Ok(()))
            .times(1);

        let cordoned = cordon_nodes(&client, &NodeTarget::Name("worker-1".to_string()))
            .await
            .unwrap();
        assert_eq!(cordoned, vec!["worker-1"]);
    }

    #[tokio::test]
    async fn test_uncordon_by_label() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_nodes()
            .withf(|params| params.label_selector.as_deref() == Some("pool=batch"))
            .returning(|_| Ok(vec![node("batch-1"), node("batch-2")]))
            .times(1);
        client
            .expect_set_node_schedulable()
            .withf(|_, schedulable| *schedulable)
            .returning(|_, _| Ok(()))
            .times(2);

        let uncordoned = uncordon_nodes(&client, &NodeTarget::Labels(Some("pool=batch".into())))
            .await
            .unwrap();
        assert_eq!(uncordoned, vec!["batch-1", "batch-2"]);
    }

    #[tokio::test]
    async fn test_cordon_without_matches_fails() {
        let mut client = listing(vec![]);
        client.expect_set_node_schedulable().times(0);

        let result = cordon_nodes(&client, &NodeTarget::Labels(Some("pool=none".into()))).await;
        assert!(matches!(result, Err(Error::NoEligibleNodes { .. })));
    }

    #[tokio::test]
    async fn test_delete_first_node_by_default() {
        let mut client = listing(vec![node("worker-1"), node("worker-2")]);
        client
            .expect_delete_node()
            .withf(|name, grace| name == "worker-1" && *grace == Some(30))
            .returning(|_, _| Ok(()))
            .times(1);

        let deleted = delete_nodes(&client, Some("role=worker"), SelectionPolicy::First, Some(30))
            .await
            .unwrap();
        assert_eq!(deleted, vec!["worker-1"]);
    }

    #[tokio::test]
    async fn test_delete_random_nodes_are_distinct() {
        let mut client = listing((1..=5).map(|i| node(&format!("worker-{}", i))).collect());
        client
            .expect_delete_node()
            .returning(|_, _| Ok(()))
            .times(3);

        let policy = SelectionPolicy::Random(NonZeroUsize::new(3).unwrap());
        let deleted = delete_nodes(&client, None, policy, None).await.unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(deleted.iter().collect::<HashSet<_>>().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_failure_stops() {
        let mut client = listing(vec![node("worker-1"), node("worker-2")]);
        client
            .expect_delete_node()
            .returning(|name, _| {
                Err(ClusterError::DeleteNode {
                    source: api_error(403),
                    node_name: name.to_string(),
                })
            })
            .times(1);

        let result = delete_nodes(&client, None, SelectionPolicy::All, None).await;
        assert!(matches!(
            result,
            Err(Error::DeleteNode { ref node_name, .. }) if node_name == "worker-1"
        ));
    }

    #[tokio::test]
    async fn test_taint_nodes_replaces_taints() {
        let mut client = listing(vec![node("worker-1")]);
        let patches = recording_patches(&mut client);

        let chaos_taint = taint("chaos", Some("true"), "NoSchedule");
        let tainted = taint_nodes(&client, Some("role=worker"), &chaos_taint)
            .await
            .unwrap();

        assert_eq!(tainted, vec!["worker-1"]);
        assert_eq!(
            patches.lock().unwrap().clone(),
            vec![(
                "worker-1".to_string(),
                json!({ "spec": { "taints": [
                    { "key": "chaos", "value": "true", "effect": "NoSchedule" }
                ] } })
            )]
        );
    }

    #[tokio::test]
    async fn test_remove_taints() {
        let mut client = listing(vec![tainted_node("worker-1", "chaos", None, "NoExecute")]);
        let patches = recording_patches(&mut client);

        remove_taints(&client, None).await.unwrap();
        assert_eq!(
            patches.lock().unwrap()[0].1,
            json!({ "spec": { "taints": [] } })
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_label() {
        let mut client = listing(vec![node("worker-1")]);
        let patches = recording_patches(&mut client);
        add_label_to_nodes(&client, None, DEFAULT_CHAOS_LABEL, DEFAULT_CHAOS_LABEL_VALUE)
            .await
            .unwrap();
        assert_eq!(
            patches.lock().unwrap()[0].1,
            json!({ "metadata": { "labels": { "under_chaos_test": "True" } } })
        );

        let mut client = listing(vec![node("worker-1")]);
        let patches = recording_patches(&mut client);
        remove_label_from_nodes(&client, None, DEFAULT_CHAOS_LABEL, &TaintIgnoreList::default())
            .await
            .unwrap();
        assert_eq!(
            patches.lock().unwrap()[0].1,
            json!({ "metadata": { "labels": { "under_chaos_test": null } } })
        );
    }

    #[tokio::test]
    async fn test_remove_label_skips_ignored_nodes() {
        let mut client = listing(vec![
            tainted_node("master-1", "node-role.kubernetes.io/master", None, "NoSchedule"),
            node("worker-1"),
        ]);
        let patches = recording_patches(&mut client);
        let ignore_list = TaintIgnoreList::new(vec![taint(
            "node-role.kubernetes.io/master",
            None,
            "NoSchedule",
        )]);

        let unlabelled = remove_label_from_nodes(&client, None, "chaos", &ignore_list)
            .await
            .unwrap();
        assert_eq!(unlabelled, vec!["worker-1"]);
        assert_eq!(patches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_label_random_node_picks_an_active_node() {
        let ignore_list =
            TaintIgnoreList::new(vec![taint("dedicated", Some("spot"), "NoSchedule")]);
        for _ in 0..10 {
            let mut client = listing(vec![
                tainted_node("spot-1", "dedicated", Some("spot"), "NoSchedule"),
                node("worker-1"),
                node("worker-2"),
            ]);
            client
                .expect_patch_node()
                .withf(|name, _| name != "spot-1")
                .returning(|_, _| Ok(()))
                .times(1);

            let labelled = label_random_node(&client, None, "chaos", "yes", &ignore_list)
                .await
                .unwrap();
            assert!(labelled == "worker-1" || labelled == "worker-2");
        }
    }

    #[tokio::test]
    async fn test_label_random_node_without_active_nodes() {
        let mut client = listing(vec![tainted_node("spot-1", "dedicated", None, "NoSchedule")]);
        client.expect_patch_node().times(0);
        let ignore_list = TaintIgnoreList::new(vec![taint("dedicated", None, "NoSchedule")]);

        let result = label_random_node(&client, None, "chaos", "yes", &ignore_list).await;
        assert!(matches!(result, Err(Error::NoEligibleNodes { .. })));
    }

    #[tokio::test]
    async fn test_terminate_pods_matching_pattern() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_pods()
            .withf(|params| {
                params.namespace.as_deref() == Some("shop")
                    && params.label_selector.as_deref() == Some("app=web")
            })
            .returning(|_| {
                Ok(vec![
                    owned_pod("web-1", "uid-1", "ReplicaSet"),
                    owned_pod("api-1", "uid-2", "ReplicaSet"),
                    owned_pod("web-2", "uid-3", "ReplicaSet"),
                    owned_pod("old-web-3", "uid-4", "ReplicaSet"),
                ])
            })
            .times(1);
        client
            .expect_delete_pod()
            .withf(|name, _| name.starts_with("web-"))
            .returning(|_, _| Ok(()))
            .times(2);

        let terminated = terminate_pods(
            &client,
            "shop",
            Some("app=web"),
            Some("web-"),
            SelectionPolicy::All,
        )
        .await
        .unwrap();
        assert_eq!(terminated, vec!["web-1", "web-2"]);
    }

    #[tokio::test]
    async fn test_terminate_pods_without_match() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_pods()
            .returning(|_| Ok(vec![owned_pod("api-1", "uid-1", "ReplicaSet")]));
        client.expect_delete_pod().times(0);

        let result =
            terminate_pods(&client, "shop", None, Some("web"), SelectionPolicy::First).await;
        assert!(matches!(result, Err(Error::NoMatchingPods { .. })));
    }

    #[tokio::test]
    async fn test_terminate_pods_invalid_pattern() {
        let mut client = MockClusterClient::new();
        client.expect_list_pods().times(0);

        let result =
            terminate_pods(&client, "shop", None, Some("web-("), SelectionPolicy::All).await;
        assert!(
            matches!(result, Err(Error::NamePattern { ref pattern, .. }) if pattern == "web-(")
        );
    }
}
