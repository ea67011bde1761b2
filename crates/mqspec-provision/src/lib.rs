//! Cluster provisioning for mqspec
//!
//! This crate provides:
//! - The data model for a run (cluster spec, network environment, access topology)
//! - A `ControlPlane` trait over the remote cluster, network and IAM operations,
//!   plus an in-memory implementation for dry runs and tests
//! - Network and access topology builders, driven by a pluggable `Recipe`
//! - An orchestrator that resolves the cluster, builds its environment once,
//!   and rolls back what it created when a run fails

#![deny(missing_docs)]

pub mod access;
pub mod control_plane;
pub mod journal;
pub mod memory;
pub mod network;
pub mod orchestrator;
pub mod recipe;
pub mod resolver;
pub mod templates;
pub mod types;

pub use control_plane::ControlPlane;

#[cfg(test)]
pub use control_plane::MockControlPlane;

pub use access::AccessTopologyBuilder;
pub use journal::{CreatedResource, ProvisionJournal, RollbackSummary};
pub use memory::{InMemoryControlPlane, Inventory};
pub use network::NetworkTopologyBuilder;
pub use orchestrator::{Capacity, Orchestrator, OrchestratorConfig, ProvisionPhase, ProvisionReport};
pub use recipe::{
    recipe_by_name, recipe_names, AccessPlan, NetworkPlan, Recipe, StandardRecipe, DEFAULT_RECIPE,
};
pub use resolver::{resolve, Resolved};
pub use templates::{DirectoryDocuments, DocumentStore, EmbeddedDocuments};

#[cfg(test)]
pub use templates::MockDocumentStore;

pub use types::{
    AccessTopology, Cluster, ClusterSpec, IngressRule, IngressScope, InstanceProfile,
    NetworkEnvironment, Protocol, STANDARD_INGRESS_RULES,
};
