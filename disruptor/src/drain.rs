//! Provides an implementation for draining Pods from Kubernetes Nodes, similar to
//! `kubectl drain --ignore-daemonsets`.
//!
//! Draining in Kubernetes is done client side. A drain "cordons" each target Node by marking it as
//! unschedulable, then creates an Eviction for every Pod which may be moved. Evictions, unlike
//! deletions, respect PodDisruptionBudgets. Which Pods may be moved is decided by
//! [`models::pod::classify`].
//!
//! A drain is single-shot: cordon and eviction requests are never retried, so no Pod is ever
//! evicted twice. Only the final wait for evicted Pods to disappear polls the API repeatedly.
//! Failed drains leave their Nodes cordoned; uncordoning is up to the caller.
use crate::error::{self, Error, Result};
use crate::notify::DrainNotifier;
use crate::selector::select_active_nodes_matching;
use models::cluster::{ClusterClient, NodeListParams, PodListParams};
use models::constants::{DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_DRAIN_TIMEOUT};
use models::node::{Node, TaintIgnoreList};
use models::pod::{classify, EvictionCandidate, EvictionReason, Pod, PodClass, SkipReason};

use futures::{stream, TryStreamExt};
use snafu::{OptionExt, ResultExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{event, instrument, Level};

// Maximum number of eviction requests in flight for a single Node. All of them complete before
// polling starts.
const CONCURRENT_EVICTIONS: usize = 5;

/// The states a single Node passes through while it is drained.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DrainState {
    Cordoning,
    Classifying,
    Evicting,
    Polling,
    Done,
    TimedOut,
    Aborted,
}

impl fmt::Display for DrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            DrainState::Cordoning => "Cordoning",
            DrainState::Classifying => "Classifying",
            DrainState::Evicting => "Evicting",
            DrainState::Polling => "Polling",
            DrainState::Done => "Done",
            DrainState::TimedOut => "TimedOut",
            DrainState::Aborted => "Aborted",
        };
        write!(f, "{}", state)
    }
}

/// Caller-controlled drain behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrainSettings {
    /// Evict Pods with `emptyDir` volumes, discarding their data.
    pub delete_pods_with_local_storage: bool,
    /// How long to wait for evicted Pods to disappear, measured from the first eviction.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        DrainSettings {
            delete_pods_with_local_storage: false,
            timeout: DEFAULT_DRAIN_TIMEOUT,
            poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
        }
    }
}

/// The Nodes to act upon.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeTarget {
    Name(String),
    /// Nodes matching a label selector. `None` selects every Node.
    Labels(Option<String>),
}

impl NodeTarget {
    pub fn list_params(&self) -> NodeListParams {
        match self {
            NodeTarget::Name(name) => NodeListParams::named(name.clone()),
            NodeTarget::Labels(selector) => NodeListParams::labelled(selector.clone()),
        }
    }
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list_params())
    }
}

/// A Pod which a drain left on its Node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedPod {
    pub pod: Pod,
    pub reason: SkipReason,
}

/// Summary of a successful drain of one Node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DrainReport {
    pub node_name: String,
    pub evicted: Vec<EvictionCandidate>,
    pub skipped: Vec<SkippedPod>,
}

impl DrainReport {
    pub fn evicted_pod_names(&self) -> Vec<&str> {
        self.evicted
            .iter()
            .map(|candidate| candidate.pod.name())
            .collect()
    }
}

/// The terminal state of one Node's drain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DrainResult {
    Done(DrainReport),
    TimedOut {
        node_name: String,
        pending_pods: Vec<String>,
    },
    Aborted {
        node_name: String,
        pod_name: String,
    },
}

impl DrainResult {
    pub fn state(&self) -> DrainState {
        match self {
            DrainResult::Done(_) => DrainState::Done,
            DrainResult::TimedOut { .. } => DrainState::TimedOut,
            DrainResult::Aborted { .. } => DrainState::Aborted,
        }
    }

    /// Surfaces the non-successful terminal states as errors.
    pub fn into_report(self, timeout: Duration) -> Result<DrainReport> {
        match self {
            DrainResult::Done(report) => Ok(report),
            DrainResult::TimedOut {
                node_name,
                pending_pods,
            } => error::DrainTimeoutSnafu {
                node_name,
                timeout,
                pending_pods,
            }
            .fail(),
            DrainResult::Aborted {
                node_name,
                pod_name,
            } => error::UnmanagedPodSnafu {
                pod_name,
                node_name,
            }
            .fail(),
        }
    }
}

enum Classification {
    Candidates {
        evict: Vec<EvictionCandidate>,
        skipped: Vec<SkippedPod>,
    },
    Unmanaged {
        pod_name: String,
    },
}

/// Drives Nodes through the drain state machine.
pub struct DrainOrchestrator<T: ClusterClient> {
    client: T,
    settings: DrainSettings,
    ignore_list: TaintIgnoreList,
    notifier: Option<Arc<dyn DrainNotifier>>,
}

impl<T: ClusterClient> DrainOrchestrator<T> {
    pub fn new(client: T, settings: DrainSettings) -> Self {
        DrainOrchestrator {
            client,
            settings,
            ignore_list: TaintIgnoreList::default(),
            notifier: None,
        }
    }

    /// Leaves Nodes carrying any taint from `ignore_list` alone, whichever way they were targeted.
    pub fn with_ignore_list(mut self, ignore_list: TaintIgnoreList) -> Self {
        self.ignore_list = ignore_list;
        self
    }

    /// Reports fatal transitions to `notifier` in addition to returning them as errors.
    pub fn with_notifier(mut self, notifier: Arc<dyn DrainNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &DrainSettings {
        &self.settings
    }

    /// Drains every Node matching `target`.
    ///
    /// All matching Nodes are cordoned first, then drained one after another. The first failure
    /// stops the operation; Nodes drained before it stay drained and every matching Node stays
    /// cordoned.
    #[instrument(skip(self), err)]
    pub async fn drain(&self, target: &NodeTarget) -> Result<Vec<DrainReport>> {
        let nodes = self
            .resolve_target(target)
            .await
            .map_err(|e| self.report_failure(&target.to_string(), e))?;

        for node in &nodes {
            self.cordon(node.name())
                .await
                .map_err(|e| self.report_failure(node.name(), e))?;
        }

        let mut reports = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let report = self
                .drain_cordoned_node(node.name())
                .await
                .and_then(|result| result.into_report(self.settings.timeout))
                .map_err(|e| self.report_failure(node.name(), e))?;

            event!(
                Level::INFO,
                node = node.name(),
                state = %DrainState::Done,
                evicted = report.evicted.len(),
                skipped = report.skipped.len(),
                "Drained node."
            );
            reports.push(report);
        }

        Ok(reports)
    }

    /// Drains a single Node by name.
    pub async fn drain_node(&self, node_name: &str) -> Result<DrainReport> {
        self.drain(&NodeTarget::Name(node_name.to_string()))
            .await?
            .into_iter()
            .next()
            .context(error::NoEligibleNodesSnafu {
                selector: node_name,
            })
    }

    /// Lists the active Nodes matching `target`. Fails if there are none.
    async fn resolve_target(&self, target: &NodeTarget) -> Result<Vec<Node>> {
        let nodes =
            select_active_nodes_matching(&self.client, &target.list_params(), &self.ignore_list)
                .await?;

        event!(
            Level::INFO,
            "Found {} active node(s) matching '{}'",
            nodes.len(),
            target
        );

        if nodes.is_empty() {
            return error::NoEligibleNodesSnafu {
                selector: target.to_string(),
            }
            .fail();
        }
        Ok(nodes)
    }

    async fn cordon(&self, node_name: &str) -> Result<()> {
        event!(
            Level::INFO,
            node = node_name,
            state = %DrainState::Cordoning,
            "Marking node unschedulable."
        );
        self.client
            .set_node_schedulable(node_name, false)
            .await
            .context(error::PatchSnafu { node_name })
    }

    #[instrument(skip(self), err)]
    async fn drain_cordoned_node(&self, node_name: &str) -> Result<DrainResult> {
        let (candidates, skipped) = match self.classify_node_pods(node_name).await? {
            Classification::Candidates { evict, skipped } => (evict, skipped),
            Classification::Unmanaged { pod_name } => {
                return Ok(DrainResult::Aborted {
                    node_name: node_name.to_string(),
                    pod_name,
                });
            }
        };

        if candidates.is_empty() {
            event!(Level::INFO, node = node_name, "No pods to evict.");
            return Ok(DrainResult::Done(DrainReport {
                node_name: node_name.to_string(),
                evicted: candidates,
                skipped,
            }));
        }

        let eviction_start = Instant::now();
        self.evict_all(node_name, &candidates).await?;

        let pending_pods = self
            .wait_for_deletion(node_name, &candidates, eviction_start)
            .await;
        if !pending_pods.is_empty() {
            return Ok(DrainResult::TimedOut {
                node_name: node_name.to_string(),
                pending_pods,
            });
        }

        Ok(DrainResult::Done(DrainReport {
            node_name: node_name.to_string(),
            evicted: candidates,
            skipped,
        }))
    }

    /// Sorts the Pods on a Node into eviction candidates and Pods to leave alone.
    /// Stops at the first unmanaged Pod.
    async fn classify_node_pods(&self, node_name: &str) -> Result<Classification> {
        let pods = self
            .client
            .list_pods(&PodListParams::on_node(node_name))
            .await
            .context(error::QuerySnafu)?;

        event!(
            Level::INFO,
            node = node_name,
            state = %DrainState::Classifying,
            "Found {} pods on node.",
            pods.len()
        );

        let mut seen_uids = HashSet::new();
        let mut evict = Vec::new();
        let mut skipped = Vec::new();
        for pod in pods {
            if !seen_uids.insert(pod.uid().to_string()) {
                continue;
            }

            let reason = match classify(&pod) {
                PodClass::Evict(reason) => reason,
                PodClass::EvictIfForced if self.settings.delete_pods_with_local_storage => {
                    event!(
                        Level::INFO,
                        "Pod '{}' has a volume made of local storage. Evicting as requested.",
                        pod
                    );
                    EvictionReason::ForcedLocalStorage
                }
                PodClass::EvictIfForced => {
                    skipped.push(skip(pod, SkipReason::LocalStorage));
                    continue;
                }
                PodClass::Skip(reason) => {
                    skipped.push(skip(pod, reason));
                    continue;
                }
                PodClass::Unmanaged => {
                    event!(
                        Level::ERROR,
                        node = node_name,
                        "Pod '{}' is not managed by a controller. Aborting drain.",
                        pod
                    );
                    return Ok(Classification::Unmanaged {
                        pod_name: pod.name().to_string(),
                    });
                }
            };
            evict.push(EvictionCandidate::new(pod, reason));
        }

        Ok(Classification::Candidates { evict, skipped })
    }

    /// Creates an eviction for each candidate. Any failed eviction fails the drain.
    async fn evict_all(&self, node_name: &str, candidates: &[EvictionCandidate]) -> Result<()> {
        event!(
            Level::INFO,
            node = node_name,
            state = %DrainState::Evicting,
            "Found {} pods to evict.",
            candidates.len()
        );

        stream::iter(candidates.iter().map(Ok::<_, Error>))
            .try_for_each_concurrent(CONCURRENT_EVICTIONS, |candidate| async move {
                let pod = &candidate.pod;
                event!(
                    Level::INFO,
                    reason = ?candidate.reason,
                    "Evicting Pod '{}'",
                    pod
                );
                self.client
                    .evict_pod(pod.name(), pod.namespace())
                    .await
                    .context(error::EvictionSnafu {
                        pod_name: pod.name(),
                        namespace: pod.namespace(),
                    })
            })
            .await
    }

    /// Polls until every evicted Pod is gone, or `timeout` has passed since `eviction_start`.
    ///
    /// Returns the names of the Pods still present when time ran out.
    async fn wait_for_deletion(
        &self,
        node_name: &str,
        evicted: &[EvictionCandidate],
        eviction_start: Instant,
    ) -> Vec<String> {
        let mut pending: Vec<&Pod> = evicted.iter().map(|candidate| &candidate.pod).collect();

        loop {
            if eviction_start.elapsed() > self.settings.timeout {
                return pending.iter().map(|pod| pod.name().to_string()).collect();
            }

            event!(
                Level::DEBUG,
                node = node_name,
                state = %DrainState::Polling,
                "Waiting for {} pods to go.",
                pending.len()
            );

            let mut still_pending = Vec::with_capacity(pending.len());
            for pod in pending {
                if !self.is_gone(pod).await {
                    still_pending.push(pod);
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                event!(Level::INFO, node = node_name, "Evicted all pods.");
                return Vec::new();
            }

            sleep(self.settings.poll_interval).await;
        }
    }

    /// A Pod is gone once it no longer exists, or once its name belongs to a different Pod.
    async fn is_gone(&self, pod: &Pod) -> bool {
        match self.client.get_pod(pod.name(), pod.namespace()).await {
            Ok(None) => {
                event!(Level::INFO, "Pod '{}' deleted.", pod);
                true
            }
            Ok(Some(current)) if current.uid() != pod.uid() => {
                event!(
                    Level::INFO,
                    "Pod '{}' was replaced by a new Pod with the same name.",
                    pod
                );
                true
            }
            Ok(Some(current)) => {
                event!(
                    Level::DEBUG,
                    "Pod '{}' still around in phase: {:?}",
                    pod,
                    current.phase()
                );
                false
            }
            Err(e) => {
                event!(
                    Level::ERROR,
                    "Could not determine if Pod '{}' is gone: '{}'. Retrying in {:.2}s.",
                    pod,
                    e,
                    self.settings.poll_interval.as_secs_f64()
                );
                false
            }
        }
    }

    fn report_failure(&self, node_name: &str, error: Error) -> Error {
        let state = match error {
            Error::DrainTimeout { .. } => DrainState::TimedOut,
            _ => DrainState::Aborted,
        };
        if let Some(notifier) = &self.notifier {
            notifier.notify(node_name, state, &error.to_string());
        }
        error
    }
}

fn skip(pod: Pod, reason: SkipReason) -> SkippedPod {
    event!(Level::INFO, "Not evicting Pod '{}': {}", pod, reason);
    SkippedPod { pod, reason }
}
