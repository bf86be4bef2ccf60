//! Node taints, and the ignore-list which keeps tainted nodes out of chaos experiments.
//!
//! Two taints are the same taint when their key, value and effect are all equal. Whether the
//! taint was added a minute or a month ago does not matter, so `timeAdded` is never compared.
use crate::error::{self, ValidationError};

use k8s_openapi::api::core::v1::Taint as K8sTaint;
use serde::{Deserialize, Serialize};

use std::convert::TryFrom;
use std::fmt;

/// An immutable `{key, value, effect}` taint descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TaintDescriptor")]
pub struct Taint {
    key: String,
    value: Option<String>,
    effect: String,
}

impl Taint {
    /// Creates a taint. `key` and `effect` must be non-empty.
    pub fn new<K, E>(key: K, value: Option<String>, effect: E) -> error::Result<Self>
    where
        K: Into<String>,
        E: Into<String>,
    {
        Ok(Taint {
            key: error::required(Some(key.into()), "Taint", "key")?,
            value,
            effect: error::required(Some(effect.into()), "Taint", "effect")?,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn effect(&self) -> &str {
        &self.effect
    }

    /// The representation used when patching taints onto a Kubernetes node.
    pub fn to_k8s(&self) -> K8sTaint {
        K8sTaint {
            key: self.key.clone(),
            value: self.value.clone(),
            effect: self.effect.clone(),
            time_added: None,
        }
    }
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}:{}", self.key, value, self.effect),
            None => write!(f, "{}:{}", self.key, self.effect),
        }
    }
}

/// The wire shape of a taint in configuration documents. `time_added` is accepted and dropped.
#[derive(Deserialize)]
struct TaintDescriptor {
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    effect: Option<String>,
}

impl TryFrom<TaintDescriptor> for Taint {
    type Error = ValidationError;

    fn try_from(descriptor: TaintDescriptor) -> error::Result<Self> {
        Taint::new(
            error::required(descriptor.key, "Taint", "key")?,
            descriptor.value,
            error::required(descriptor.effect, "Taint", "effect")?,
        )
    }
}

impl TryFrom<&K8sTaint> for Taint {
    type Error = ValidationError;

    fn try_from(taint: &K8sTaint) -> error::Result<Self> {
        Taint::new(taint.key.clone(), taint.value.clone(), taint.effect.clone())
    }
}

/// Returns true iff both taints are present and their key, value and effect all match.
pub fn taints_equal(a: Option<&Taint>, b: Option<&Taint>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.key == b.key && a.value == b.value && a.effect == b.effect,
        _ => false,
    }
}

/// Returns true if any of the node's taints matches any taint in the ignore-list.
pub fn node_ignored_by_taints(node_taints: &[Taint], ignore_list: &[Taint]) -> bool {
    node_taints.iter().any(|node_taint| {
        ignore_list
            .iter()
            .any(|ignored| taints_equal(Some(node_taint), Some(ignored)))
    })
}

/// An ordered list of taints. Nodes carrying any of these taints are not eligible for disruption.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaintIgnoreList(Vec<Taint>);

/// Ignore-lists are accepted either wrapped in a `taints-ignore-list` key or as a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum IgnoreListDocument {
    Wrapped(WrappedIgnoreList),
    Bare(Vec<Taint>),
}

/// The wrapping key is required and nothing else may sit beside it, so a misspelled key is an
/// error rather than an empty list. An explicit `null` under the key reads as an empty list.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WrappedIgnoreList {
    #[serde(rename = "taints-ignore-list", deserialize_with = "Option::deserialize")]
    taints: Option<Vec<Taint>>,
}

impl TaintIgnoreList {
    pub fn new(taints: Vec<Taint>) -> Self {
        TaintIgnoreList(taints)
    }

    pub fn from_json_str(document: &str) -> serde_json::Result<Self> {
        let taints = match serde_json::from_str(document)? {
            IgnoreListDocument::Wrapped(wrapped) => wrapped.taints.unwrap_or_default(),
            IgnoreListDocument::Bare(taints) => taints,
        };
        Ok(TaintIgnoreList(taints))
    }

    pub fn as_slice(&self) -> &[Taint] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether a node carrying `node_taints` must be left alone.
    pub fn ignores(&self, node_taints: &[Taint]) -> bool {
        node_ignored_by_taints(node_taints, &self.0)
    }
}

impl From<Vec<Taint>> for TaintIgnoreList {
    fn from(taints: Vec<Taint>) -> Self {
        TaintIgnoreList(taints)
    }
}
