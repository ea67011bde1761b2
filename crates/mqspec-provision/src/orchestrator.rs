//! Provisioning orchestrator
//!
//! Runs one cluster through `ResolvingCluster -> (BuildingEnvironment)? -> Done`.
//! An existing cluster short-circuits straight to `Done`: its network and
//! access topology are assumed to have been built when it was created. A
//! freshly created cluster gets both, network first.
//!
//! A failure while building the environment aborts the run. Everything the
//! run created, the cluster included, is then rolled back best-effort unless
//! [`OrchestratorConfig::keep_on_failure`] is set; either way the caller sees
//! the original error.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use mqspec_common::retry::RetryConfig;
use mqspec_common::Result;

use crate::access::AccessTopologyBuilder;
use crate::control_plane::ControlPlane;
use crate::journal::{CreatedResource, ProvisionJournal};
use crate::network::NetworkTopologyBuilder;
use crate::recipe::Recipe;
use crate::resolver::{resolve, Resolved};
use crate::templates::DocumentStore;
use crate::types::{AccessTopology, Cluster, ClusterSpec, NetworkEnvironment};

/// Stage of a provisioning run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionPhase {
    /// Looking the cluster up by name, creating it on a miss
    ResolvingCluster,
    /// Building network and access topology for a new cluster
    BuildingEnvironment,
    /// Terminal
    Done,
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionPhase::ResolvingCluster => write!(f, "ResolvingCluster"),
            ProvisionPhase::BuildingEnvironment => write!(f, "BuildingEnvironment"),
            ProvisionPhase::Done => write!(f, "Done"),
        }
    }
}

/// Orchestrator settings
#[derive(Clone, Debug, Default)]
pub struct OrchestratorConfig {
    /// Backoff schedule for the instance profile readiness wait
    pub readiness: RetryConfig,
    /// Leave created resources in place when a run fails
    pub keep_on_failure: bool,
}

/// Desired versus registered capacity of the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Capacity {
    /// Requested number of instances
    pub desired: u32,
    /// Compute nodes currently registered with the cluster
    pub registered_nodes: u32,
}

impl Capacity {
    /// Whether enough nodes are registered
    pub fn is_satisfied(&self) -> bool {
        self.registered_nodes >= self.desired
    }
}

/// Outcome of a successful run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    /// The resolved cluster
    pub cluster: Cluster,
    /// Whether this run created the cluster
    pub created: bool,
    /// Network built by this run, if the cluster was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkEnvironment>,
    /// Access topology built by this run, if the cluster was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessTopology>,
    /// Recipe used
    pub recipe: String,
    /// Capacity summary
    pub capacity: Capacity,
}

/// Sequences resolver, network builder and access builder for one cluster
pub struct Orchestrator {
    control_plane: Arc<dyn ControlPlane>,
    documents: Arc<dyn DocumentStore>,
    recipe: Box<dyn Recipe>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        documents: Arc<dyn DocumentStore>,
        recipe: Box<dyn Recipe>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            control_plane,
            documents,
            recipe,
            config,
        }
    }

    /// Provision `spec`. Validates the cluster spec before any remote call.
    pub async fn run(&self, spec: &ClusterSpec) -> Result<ProvisionReport> {
        spec.validate()?;

        let cp = self.control_plane.as_ref();
        let name = spec.name.as_str();
        let mut journal = ProvisionJournal::new();

        enter(ProvisionPhase::ResolvingCluster, name);
        let resolved = resolve(
            "cluster",
            name,
            || cp.describe_cluster(name),
            || cp.create_cluster(name),
        )
        .await?;
        debug!(
            cluster = %name,
            status = %resolved.get().status,
            created = resolved.was_created(),
            "resolved cluster"
        );

        let (cluster, created, network, access) = match resolved {
            Resolved::Existing(cluster) => {
                info!(cluster = %name, "cluster already exists, skipping network and access");
                (cluster, false, None, None)
            }
            Resolved::Created(cluster) => {
                journal.record(CreatedResource::Cluster {
                    name: name.to_string(),
                });
                info!(cluster = %name, arn = %cluster.arn, "created cluster");

                enter(ProvisionPhase::BuildingEnvironment, name);
                match self.build_environment(name, &mut journal).await {
                    Ok((network, access)) => (cluster, true, Some(network), Some(access)),
                    Err(e) => {
                        warn!(cluster = %name, error = %e, "provisioning failed");
                        self.abort(journal).await;
                        return Err(e);
                    }
                }
            }
        };

        enter(ProvisionPhase::Done, name);

        let capacity = Capacity {
            desired: spec.instances,
            registered_nodes: cluster.registered_nodes,
        };
        if !capacity.is_satisfied() {
            warn!(
                cluster = %name,
                desired = capacity.desired,
                registered = capacity.registered_nodes,
                "cluster has fewer registered nodes than requested"
            );
        }

        Ok(ProvisionReport {
            cluster,
            created,
            network,
            access,
            recipe: self.recipe.name().to_string(),
            capacity,
        })
    }

    async fn build_environment(
        &self,
        cluster: &str,
        journal: &mut ProvisionJournal,
    ) -> Result<(NetworkEnvironment, AccessTopology)> {
        let cp = self.control_plane.as_ref();

        let network_plan = self.recipe.network_plan(cluster);
        let network = NetworkTopologyBuilder::new(cp)
            .build(&network_plan, journal)
            .await?;

        let access_plan = self.recipe.access_plan(cluster);
        let access = AccessTopologyBuilder::new(cp, self.documents.as_ref(), &self.config.readiness)
            .build(&access_plan, journal)
            .await?;

        Ok((network, access))
    }

    async fn abort(&self, journal: ProvisionJournal) {
        if self.config.keep_on_failure {
            for resource in journal.entries() {
                warn!(resource = %resource, "leaving resource in place");
            }
            return;
        }

        let summary = journal.rollback(self.control_plane.as_ref()).await;
        if summary.orphaned.is_empty() {
            info!(removed = summary.removed, "rollback complete");
        } else {
            warn!(
                removed = summary.removed,
                orphaned = summary.orphaned.len(),
                "rollback incomplete, some resources must be removed by hand"
            );
        }
    }
}

fn enter(phase: ProvisionPhase, cluster: &str) {
    info!(cluster = %cluster, phase = %phase, "entering phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;
    use crate::memory::InMemoryControlPlane;
    use crate::recipe::StandardRecipe;
    use crate::templates::EmbeddedDocuments;

    fn orchestrator(cp: Arc<dyn ControlPlane>, keep_on_failure: bool) -> Orchestrator {
        Orchestrator::new(
            cp,
            Arc::new(EmbeddedDocuments),
            Box::new(StandardRecipe),
            OrchestratorConfig {
                keep_on_failure,
                ..Default::default()
            },
        )
    }

    #[test]
    fn phase_display() {
        assert_eq!(ProvisionPhase::ResolvingCluster.to_string(), "ResolvingCluster");
        assert_eq!(
            ProvisionPhase::BuildingEnvironment.to_string(),
            "BuildingEnvironment"
        );
        assert_eq!(ProvisionPhase::Done.to_string(), "Done");
    }

    #[test]
    fn capacity_satisfied_when_enough_nodes() {
        let capacity = Capacity {
            desired: 3,
            registered_nodes: 3,
        };
        assert!(capacity.is_satisfied());
        let short = Capacity {
            desired: 3,
            registered_nodes: 1,
        };
        assert!(!short.is_satisfied());
    }

    #[tokio::test]
    async fn invalid_spec_makes_no_calls() {
        // No expectations: any call panics
        let cp = Arc::new(MockControlPlane::new());
        let spec = ClusterSpec {
            instances: 0,
            ..ClusterSpec::named("demo")
        };

        let err = orchestrator(cp, false).run(&spec).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn existing_cluster_only_describes() {
        let mut cp = MockControlPlane::new();
        cp.expect_describe_cluster()
            .withf(|name| name == "demo")
            .times(1)
            .returning(|name| {
                Ok(Some(Cluster {
                    arn: format!("arn:cluster/{}", name),
                    name: name.to_string(),
                    registered_nodes: 3,
                    status: "ACTIVE".to_string(),
                }))
            });

        let report = orchestrator(Arc::new(cp), false)
            .run(&ClusterSpec::named("demo"))
            .await
            .unwrap();

        assert!(!report.created);
        assert!(report.network.is_none());
        assert!(report.access.is_none());
        assert!(report.capacity.is_satisfied());
    }

    #[tokio::test]
    async fn describe_failure_propagates_without_create() {
        let mut cp = MockControlPlane::new();
        cp.expect_describe_cluster()
            .returning(|name| {
                Err(mqspec_common::Error::control_plane(
                    "DescribeClusters",
                    name,
                    "denied",
                ))
            });
        cp.expect_create_cluster().never();

        let err = orchestrator(Arc::new(cp), false)
            .run(&ClusterSpec::named("demo"))
            .await
            .unwrap_err();
        assert_eq!(err.operation(), Some("DescribeClusters"));
    }

    #[tokio::test]
    async fn failure_rolls_back_cluster_too() {
        let cp = Arc::new(InMemoryControlPlane::new().fail_on("CreateRole"));

        let err = orchestrator(cp.clone(), false)
            .run(&ClusterSpec::named("demo"))
            .await
            .unwrap_err();

        assert_eq!(err.operation(), Some("CreateRole"));
        let inv = cp.inventory();
        assert!(inv.clusters.is_empty());
        assert!(inv.has_no_environment());
    }

    #[tokio::test]
    async fn keep_on_failure_leaves_resources() {
        let cp = Arc::new(InMemoryControlPlane::new().fail_on("CreateRole"));

        orchestrator(cp.clone(), true)
            .run(&ClusterSpec::named("demo"))
            .await
            .unwrap_err();

        let inv = cp.inventory();
        assert_eq!(inv.clusters.len(), 1);
        assert_eq!(inv.vpcs.len(), 1);
        assert_eq!(inv.security_groups.len(), 1);
        assert_eq!(cp.call_count("DeleteVpc"), 0);
    }

    #[tokio::test]
    async fn report_serializes_without_empty_sections() {
        let cp = Arc::new(InMemoryControlPlane::new().with_cluster("demo", 1));

        let report = orchestrator(cp, false)
            .run(&ClusterSpec::named("demo"))
            .await
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["created"], false);
        assert_eq!(json["recipe"], "recipe1");
        assert_eq!(json["capacity"]["desired"], 3);
        assert_eq!(json["capacity"]["registered_nodes"], 1);
        assert!(json.get("network").is_none());
    }
}
