//! Decides which pods on a node a drain may evict.
//!
//! The policy follows `kubectl drain --ignore-daemonsets`, optionally with
//! `--delete-emptydir-data`:
//! * Mirror pods are never evicted; they are managed by the kubelet from static manifests.
//! * DaemonSet pods are never evicted, as the DaemonSet controller ignores node cordons.
//! * Pods with `emptyDir` volumes lose that data when evicted, so they are only evicted on request.
//! * Pods without a controller would not be recreated anywhere. Finding one aborts the drain.
//!
//! There is no equivalent of `kubectl drain --force`.
use super::Pod;
use crate::constants::DAEMONSET_KIND;

use std::fmt;

/// Why a pod was chosen for eviction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EvictionReason {
    /// The pod has a controller which will replace it.
    Owned,
    /// The pod has already completed.
    Terminal,
    /// The pod has local storage and the caller asked for such pods to be evicted anyway.
    ForcedLocalStorage,
}

/// Why a pod is left in place.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    MirrorPod,
    DaemonSet,
    LocalStorage,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MirrorPod => write!(f, "Pod is a static Mirror Pod"),
            SkipReason::DaemonSet => write!(f, "Pod is member of a DaemonSet"),
            SkipReason::LocalStorage => write!(f, "Pod has a volume made of local storage"),
        }
    }
}

/// The classifier's verdict for a single pod.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PodClass {
    Evict(EvictionReason),
    EvictIfForced,
    Skip(SkipReason),
    Unmanaged,
}

/// Classifies a pod. The first matching rule wins.
pub fn classify(pod: &Pod) -> PodClass {
    if pod.is_mirror() {
        return PodClass::Skip(SkipReason::MirrorPod);
    }

    if pod.has_local_storage() {
        return PodClass::EvictIfForced;
    }

    if pod.phase().is_terminal() {
        return PodClass::Evict(EvictionReason::Terminal);
    }

    match pod.controller() {
        Some(owner) if owner.kind != DAEMONSET_KIND => PodClass::Evict(EvictionReason::Owned),
        Some(_) => PodClass::Skip(SkipReason::DaemonSet),
        None => PodClass::Unmanaged,
    }
}

/// A pod selected for eviction during a single drain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EvictionCandidate {
    pub pod: Pod,
    pub reason: EvictionReason,
}

impl EvictionCandidate {
    pub fn new(pod: Pod, reason: EvictionReason) -> Self {
        EvictionCandidate { pod, reason }
    }
}
