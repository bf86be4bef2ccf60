mod taint;

pub use self::taint::{node_ignored_by_taints, taints_equal, Taint, TaintIgnoreList};

use crate::error::{self, ValidationError};

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node as K8sNode;
use kube::ResourceExt;

use std::collections::BTreeMap;
use std::convert::TryFrom;

/// A cluster node, as seen by the node selector and the drain orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    name: String,
    labels: BTreeMap<String, String>,
    taints: Vec<Taint>,
    unschedulable: bool,
    ready: Option<bool>,
    creation_timestamp: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new<S: Into<String>>(name: S) -> error::Result<Self> {
        Ok(Node {
            name: error::required(Some(name.into()), "Node", "metadata.name")?,
            labels: BTreeMap::new(),
            taints: Vec::new(),
            unschedulable: false,
            ready: None,
            creation_timestamp: None,
        })
    }

    pub fn with_taints(mut self, taints: Vec<Taint>) -> Self {
        self.taints = taints;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_unschedulable(mut self, unschedulable: bool) -> Self {
        self.unschedulable = unschedulable;
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn taints(&self) -> &[Taint] {
        &self.taints
    }

    pub fn is_tainted(&self) -> bool {
        !self.taints.is_empty()
    }

    pub fn is_schedulable(&self) -> bool {
        !self.unschedulable
    }

    /// The status of the node's `Ready` condition, if the node reports one.
    pub fn is_ready(&self) -> Option<bool> {
        self.ready
    }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.creation_timestamp
    }
}

impl TryFrom<&K8sNode> for Node {
    type Error = ValidationError;

    fn try_from(node: &K8sNode) -> error::Result<Self> {
        let spec = node.spec.as_ref();
        let taints = spec
            .and_then(|spec| spec.taints.as_ref())
            .map(|taints| {
                taints
                    .iter()
                    .map(Taint::try_from)
                    .collect::<error::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let ready = node
            .status
            .as_ref()
            .and_then(|status| status.conditions.as_ref())
            .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
            .map(|condition| condition.status == "True");

        Ok(Node {
            name: error::required(node.metadata.name.clone(), "Node", "metadata.name")?,
            labels: node.labels().clone(),
            taints,
            unschedulable: spec.and_then(|spec| spec.unschedulable).unwrap_or(false),
            ready,
            creation_timestamp: node.metadata.creation_timestamp.as_ref().map(|ts| ts.0),
        })
    }
}
