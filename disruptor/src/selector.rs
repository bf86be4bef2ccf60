//! Finds the nodes which may take part in an experiment.
use crate::error::{self, Result};
use models::cluster::{ClusterClient, NodeListParams};
use models::node::{Node, TaintIgnoreList};

use snafu::ResultExt;
use tracing::{event, instrument, Level};

/// Lists the nodes matching `label_selector` and drops every node carrying an ignored taint.
///
/// Nodes are returned in the order the API listed them. An empty result is not an error here;
/// callers which need at least one node go through [`crate::targets::select_targets`].
#[instrument(skip(client, ignore_list), err)]
pub async fn select_active_nodes<T: ClusterClient>(
    client: &T,
    label_selector: Option<&str>,
    ignore_list: &TaintIgnoreList,
) -> Result<Vec<Node>> {
    let params = NodeListParams::labelled(label_selector.map(String::from));
    select_active_nodes_matching(client, &params, ignore_list).await
}

/// Like [`select_active_nodes`], for any node listing, including a single node by name.
pub async fn select_active_nodes_matching<T: ClusterClient>(
    client: &T,
    params: &NodeListParams,
    ignore_list: &TaintIgnoreList,
) -> Result<Vec<Node>> {
    let nodes = client
        .list_nodes(params)
        .await
        .context(error::QuerySnafu)?;

    event!(
        Level::DEBUG,
        "Found {} nodes matching '{}'",
        nodes.len(),
        params
    );

    let active: Vec<Node> = nodes
        .into_iter()
        .filter(|node| {
            let ignored = node.is_tainted() && ignore_list.ignores(node.taints());
            if ignored {
                event!(
                    Level::DEBUG,
                    node = node.name(),
                    "Ignoring node: it carries a taint from the ignore-list"
                );
            }
            !ignored
        })
        .collect();

    Ok(active)
}
