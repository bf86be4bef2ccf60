pub mod actions;
pub mod config;
pub mod drain;
pub mod error;
pub mod notify;
pub mod selector;
pub mod targets;

pub use crate::drain::{DrainOrchestrator, DrainReport, DrainSettings, NodeTarget};
pub use crate::error::{Error, Result};
pub use crate::targets::SelectionPolicy;

#[cfg(test)]
pub(crate) mod test_support {
    use models::cluster::ClusterError;
    use models::node::{Node, Taint};
    use models::pod::{OwnerRef, Pod};

    pub(crate) fn node(name: &str) -> Node {
        Node::new(name).unwrap()
    }

    pub(crate) fn tainted_node(name: &str, key: &str, value: Option<&str>, effect: &str) -> Node {
        node(name).with_taints(vec![taint(key, value, effect)])
    }

    pub(crate) fn taint(key: &str, value: Option<&str>, effect: &str) -> Taint {
        Taint::new(key, value.map(String::from), effect).unwrap()
    }

    pub(crate) fn owned_pod(name: &str, uid: &str, owner_kind: &str) -> Pod {
        Pod::new(name, "default", uid)
            .unwrap()
            .with_owner(OwnerRef::controller(owner_kind, "owner"))
    }

    pub(crate) fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "mocked failure".to_string(),
            reason: "Mocked".to_string(),
            code,
        })
    }

    pub(crate) fn list_nodes_error() -> ClusterError {
        ClusterError::ListNodes {
            source: api_error(500),
            selector: "role=worker".to_string(),
        }
    }
}
