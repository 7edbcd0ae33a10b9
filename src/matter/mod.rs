//! Interaction-model data model: the capability registry, the provider the
//! protocol engine queries, and the cluster compatibility shim.

pub mod cluster;
pub mod command_enum;
pub mod device_types;
pub mod handlers;
pub mod hint;
pub mod invoke;
pub mod legacy;
pub mod metadata;
pub mod persistence;
pub mod provider;
pub mod registry;
pub mod shim;
pub mod status;
pub mod types;

#[cfg(test)]
mod testing;

pub use cluster::{ChangeLog, ChangeNotify, ServerCluster, ServerClusterContext};
pub use provider::DataModelProvider;
pub use shim::ClusterShim;
