use crate::error::ValidationError;

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Failures of individual cluster-management API calls.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClusterError {
    #[snafu(display("Unable to list Nodes matching '{}': '{}'", selector, source))]
    ListNodes {
        source: kube::Error,
        selector: String,
    },

    #[snafu(display("Unable to patch Node '{}': '{}'", node_name, source))]
    PatchNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to delete Node '{}': '{}'", node_name, source))]
    DeleteNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to list Pods matching '{}': '{}'", selector, source))]
    ListPods {
        source: kube::Error,
        selector: String,
    },

    #[snafu(display(
        "Unable to create eviction for Pod '{}/{}': '{}'",
        namespace,
        pod_name,
        source
    ))]
    EvictPod {
        source: kube::Error,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display("Unable to fetch Pod '{}/{}': '{}'", namespace, pod_name, source))]
    GetPod {
        source: kube::Error,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display("Unable to delete Pod '{}/{}': '{}'", namespace, pod_name, source))]
    DeletePod {
        source: kube::Error,
        pod_name: String,
        namespace: String,
    },

    #[snafu(display("The Kubernetes API returned an unusable object: '{}'", source))]
    InvalidObject { source: ValidationError },
}
