mod eviction;

pub use self::eviction::{classify, EvictionCandidate, EvictionReason, PodClass, SkipReason};

use crate::constants::MIRROR_POD_ANNOTATION;
use crate::error::{self, ValidationError};

use k8s_openapi::api::core::v1::Pod as K8sPod;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

/// The lifecycle phase reported in a Pod's status.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    /// Pods which have run to completion, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl From<Option<&str>> for PodPhase {
    fn from(phase: Option<&str>) -> Self {
        phase
            .and_then(|phase| serde_plain::from_str(phase).ok())
            .unwrap_or_default()
    }
}

/// A reference from a Pod to the object which owns it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

impl OwnerRef {
    pub fn controller<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        OwnerRef {
            kind: kind.into(),
            name: name.into(),
            controller: true,
        }
    }
}

/// A pod scheduled in the cluster, reduced to what is needed to decide whether it may be evicted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pod {
    name: String,
    namespace: String,
    uid: String,
    node_name: Option<String>,
    owner_references: Vec<OwnerRef>,
    has_local_storage: bool,
    phase: PodPhase,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

impl Pod {
    pub fn new<N, S, U>(name: N, namespace: S, uid: U) -> error::Result<Self>
    where
        N: Into<String>,
        S: Into<String>,
        U: Into<String>,
    {
        Ok(Pod {
            name: error::required(Some(name.into()), "Pod", "metadata.name")?,
            namespace: error::required(Some(namespace.into()), "Pod", "metadata.namespace")?,
            uid: error::required(Some(uid.into()), "Pod", "metadata.uid")?,
            node_name: None,
            owner_references: Vec::new(),
            has_local_storage: false,
            phase: PodPhase::Running,
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        })
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner_references.push(owner);
        self
    }

    pub fn with_local_storage(mut self, has_local_storage: bool) -> Self {
        self.has_local_storage = has_local_storage;
        self
    }

    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_annotation<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn on_node<S: Into<String>>(mut self, node_name: S) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    pub fn owner_references(&self) -> &[OwnerRef] {
        &self.owner_references
    }

    /// The owner reference flagged as the managing controller, if any.
    pub fn controller(&self) -> Option<&OwnerRef> {
        self.owner_references.iter().find(|owner| owner.controller)
    }

    pub fn has_local_storage(&self) -> bool {
        self.has_local_storage
    }

    pub fn phase(&self) -> PodPhase {
        self.phase
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Static pods are represented in the API server by a read-only mirror.
    pub fn is_mirror(&self) -> bool {
        self.annotations.contains_key(MIRROR_POD_ANNOTATION)
    }
}

impl fmt::Display for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl TryFrom<&K8sPod> for Pod {
    type Error = ValidationError;

    fn try_from(pod: &K8sPod) -> error::Result<Self> {
        let owner_references = pod
            .owner_references()
            .iter()
            .map(|owner| OwnerRef {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                controller: owner.controller.unwrap_or(false),
            })
            .collect();

        let has_local_storage = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.volumes.as_ref())
            .map_or(false, |volumes| {
                volumes.iter().any(|volume| volume.empty_dir.is_some())
            });

        let phase = PodPhase::from(
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref()),
        );

        Ok(Pod {
            name: error::required(pod.metadata.name.clone(), "Pod", "metadata.name")?,
            namespace: error::required(
                pod.metadata.namespace.clone(),
                "Pod",
                "metadata.namespace",
            )?,
            uid: error::required(pod.metadata.uid.clone(), "Pod", "metadata.uid")?,
            node_name: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
            owner_references,
            has_local_storage,
            phase,
            annotations: pod.annotations().clone(),
            labels: pod.labels().clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, PodSpec, PodStatus, Volume};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use maplit::btreemap;

    fn k8s_pod(volumes: Vec<Volume>, phase: Option<&str>) -> K8sPod {
        K8sPod {
            metadata: ObjectMeta {
                name: Some("web-7d9f8".to_string()),
                namespace: Some("shop".to_string()),
                uid: Some("0f6e3c5a".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "ReplicaSet".to_string(),
                    name: "web".to_string(),
                    uid: "rs-uid".to_string(),
                    controller: Some(true),
                    ..Default::default()
                }]),
                annotations: Some(btreemap! {
                    MIRROR_POD_ANNOTATION.to_string() => "abc".to_string(),
                }),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-1".to_string()),
                volumes: Some(volumes),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: phase.map(String::from),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_from_k8s_pod() {
        let pod = Pod::try_from(&k8s_pod(
            vec![
                Volume {
                    name: "config".to_string(),
                    ..Default::default()
                },
                Volume {
                    name: "scratch".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
            ],
            Some("Succeeded"),
        ))
        .unwrap();

        assert_eq!(pod.name(), "web-7d9f8");
        assert_eq!(pod.namespace(), "shop");
        assert_eq!(pod.uid(), "0f6e3c5a");
        assert_eq!(pod.node_name(), Some("node-1"));
        assert_eq!(
            pod.controller(),
            Some(&OwnerRef::controller("ReplicaSet", "web"))
        );
        assert!(pod.has_local_storage());
        assert!(pod.is_mirror());
        assert_eq!(pod.phase(), PodPhase::Succeeded);
        assert_eq!(pod.to_string(), "shop/web-7d9f8");
    }

    #[test]
    fn test_phase_parsing() {
        let test_cases = vec![
            (Some("Pending"), PodPhase::Pending),
            (Some("Running"), PodPhase::Running),
            (Some("Succeeded"), PodPhase::Succeeded),
            (Some("Failed"), PodPhase::Failed),
            (Some("Evicted"), PodPhase::Unknown),
            (None, PodPhase::Unknown),
        ];
        for (phase, expected) in test_cases {
            assert_eq!(PodPhase::from(phase), expected);
        }
        assert!(PodPhase::Failed.is_terminal());
        assert!(!PodPhase::Running.is_terminal());
    }

    #[test]
    fn test_pod_without_uid_is_rejected() {
        let mut pod = k8s_pod(vec![], None);
        pod.metadata.uid = None;
        assert!(Pod::try_from(&pod).is_err());
        assert!(Pod::new("web", "", "uid").is_err());
    }
}
