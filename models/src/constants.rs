use tokio::time::Duration;

// Annotation set by the kubelet on the API server's copy of a static pod.
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

pub const DAEMONSET_KIND: &str = "DaemonSet";

// Field selectors used when listing cluster objects.
pub const NODE_NAME_FIELD: &str = "metadata.name";
pub const POD_NODE_NAME_FIELD: &str = "spec.nodeName";

// Label applied to nodes which are part of a running experiment.
pub const DEFAULT_CHAOS_LABEL: &str = "under_chaos_test";
pub const DEFAULT_CHAOS_LABEL_VALUE: &str = "True";

pub const DEFAULT_NAMESPACE: &str = "default";

// Drains wait this long for evicted pods to disappear before giving up.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
