use models::cluster::ClusterError;
use models::telemetry::TelemetryConfigError;

use snafu::Snafu;
use tokio::time::Duration;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to query the cluster: '{}'", source))]
    Query { source: ClusterError },

    #[snafu(display("Unable to patch Node '{}': '{}'", node_name, source))]
    Patch {
        source: ClusterError,
        node_name: String,
    },

    #[snafu(display("Unable to evict Pod '{}/{}': '{}'", namespace, pod_name, source))]
    Eviction {
        source: ClusterError,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display(
        "Pod '{}' on Node '{}' is unmanaged, cannot drain this node. Delete it manually first?",
        pod_name,
        node_name
    ))]
    UnmanagedPod { pod_name: String, node_name: String },

    #[snafu(display(
        "Draining Node '{}' did not complete within {:.2}s. Remaining pods are: {}",
        node_name,
        timeout.as_secs_f64(),
        pending_pods.join(", ")
    ))]
    DrainTimeout {
        node_name: String,
        timeout: Duration,
        pending_pods: Vec<String>,
    },

    #[snafu(display("Failed to find a node that matches selector '{}'", selector))]
    NoEligibleNodes { selector: String },

    #[snafu(display("Failed to find a pod matching '{}'", selector))]
    NoMatchingPods { selector: String },

    #[snafu(display("Unable to delete Node '{}': '{}'", node_name, source))]
    DeleteNode {
        source: ClusterError,
        node_name: String,
    },

    #[snafu(display("Unable to delete Pod '{}/{}': '{}'", namespace, pod_name, source))]
    DeletePod {
        source: ClusterError,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display("Invalid pod name pattern '{}': '{}'", pattern, source))]
    NamePattern {
        source: regex::Error,
        pattern: String,
    },

    #[snafu(display("Unable to read taint ignore-list '{}': '{}'", path, source))]
    ReadIgnoreList {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Unable to parse taint ignore-list '{}': '{}'", path, source))]
    ParseIgnoreList {
        source: serde_json::Error,
        path: String,
    },

    #[snafu(display(
        "Could not parse environment variable '{}={}': '{}'",
        env_var,
        env_value,
        source
    ))]
    ParseEnv {
        source: std::num::ParseIntError,
        env_var: String,
        env_value: String,
    },

    #[snafu(display("Invalid taint: '{}'", source))]
    InvalidTaint {
        source: models::error::ValidationError,
    },

    #[snafu(display("Unable to create Kubernetes client: '{}'", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Error configuring telemetry: '{}'", source))]
    TelemetryInit { source: TelemetryConfigError },
}
