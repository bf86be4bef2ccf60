//! Shared types for the disruptor workspace: validated cluster value types, the taint matcher,
//! the eviction classifier, and the `ClusterClient` abstraction over the Kubernetes API.
pub mod cluster;
pub mod constants;
pub mod error;
pub mod node;
pub mod pod;
pub mod telemetry;
