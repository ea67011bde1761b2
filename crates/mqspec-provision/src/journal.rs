//! Record of resources created during a run, for best-effort rollback.
//!
//! Each builder records an entry right after the create call that produced
//! it succeeds. If the run aborts, the journal is replayed in reverse so that
//! dependents are removed before the things they depend on (route before
//! gateway, gateway detach before gateway delete, subnet before VPC, ...).

use std::fmt;

use tracing::{info, warn};

use crate::control_plane::ControlPlane;

/// A resource created by this run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreatedResource {
    /// Compute cluster
    Cluster {
        /// Cluster name
        name: String,
    },
    /// VPC
    Vpc {
        /// VPC id
        vpc_id: String,
    },
    /// Subnet
    Subnet {
        /// Subnet id
        subnet_id: String,
    },
    /// Internet gateway
    InternetGateway {
        /// Gateway id
        gateway_id: String,
    },
    /// Gateway attached to a VPC
    GatewayAttachment {
        /// Gateway id
        gateway_id: String,
        /// VPC id
        vpc_id: String,
    },
    /// Route added to a route table
    Route {
        /// Route table id
        route_table_id: String,
        /// Destination CIDR of the route
        destination_cidr: String,
    },
    /// Security group
    SecurityGroup {
        /// Group id
        group_id: String,
    },
    /// IAM role
    Role {
        /// Role name
        name: String,
    },
    /// Managed policy
    Policy {
        /// Policy ARN
        arn: String,
    },
    /// Policy attached to a role
    PolicyAttachment {
        /// Role name
        role_name: String,
        /// Policy ARN
        policy_arn: String,
    },
    /// Instance profile
    InstanceProfile {
        /// Profile name
        name: String,
    },
    /// Role placed in an instance profile
    ProfileRole {
        /// Profile name
        profile_name: String,
        /// Role name
        role_name: String,
    },
}

impl CreatedResource {
    /// Remove this resource from the control plane
    pub async fn undo(&self, control_plane: &dyn ControlPlane) -> mqspec_common::Result<()> {
        match self {
            CreatedResource::Cluster { name } => control_plane.delete_cluster(name).await,
            CreatedResource::Vpc { vpc_id } => control_plane.delete_vpc(vpc_id).await,
            CreatedResource::Subnet { subnet_id } => control_plane.delete_subnet(subnet_id).await,
            CreatedResource::InternetGateway { gateway_id } => {
                control_plane.delete_internet_gateway(gateway_id).await
            }
            CreatedResource::GatewayAttachment { gateway_id, vpc_id } => {
                control_plane
                    .detach_internet_gateway(gateway_id, vpc_id)
                    .await
            }
            CreatedResource::Route {
                route_table_id,
                destination_cidr,
            } => {
                control_plane
                    .delete_route(route_table_id, destination_cidr)
                    .await
            }
            CreatedResource::SecurityGroup { group_id } => {
                control_plane.delete_security_group(group_id).await
            }
            CreatedResource::Role { name } => control_plane.delete_role(name).await,
            CreatedResource::Policy { arn } => control_plane.delete_policy(arn).await,
            CreatedResource::PolicyAttachment {
                role_name,
                policy_arn,
            } => control_plane.detach_role_policy(role_name, policy_arn).await,
            CreatedResource::InstanceProfile { name } => {
                control_plane.delete_instance_profile(name).await
            }
            CreatedResource::ProfileRole {
                profile_name,
                role_name,
            } => {
                control_plane
                    .remove_role_from_instance_profile(profile_name, role_name)
                    .await
            }
        }
    }
}

impl fmt::Display for CreatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatedResource::Cluster { name } => write!(f, "cluster {}", name),
            CreatedResource::Vpc { vpc_id } => write!(f, "vpc {}", vpc_id),
            CreatedResource::Subnet { subnet_id } => write!(f, "subnet {}", subnet_id),
            CreatedResource::InternetGateway { gateway_id } => {
                write!(f, "internet gateway {}", gateway_id)
            }
            CreatedResource::GatewayAttachment { gateway_id, vpc_id } => {
                write!(f, "attachment of {} to {}", gateway_id, vpc_id)
            }
            CreatedResource::Route {
                route_table_id,
                destination_cidr,
            } => write!(f, "route {} in {}", destination_cidr, route_table_id),
            CreatedResource::SecurityGroup { group_id } => {
                write!(f, "security group {}", group_id)
            }
            CreatedResource::Role { name } => write!(f, "role {}", name),
            CreatedResource::Policy { arn } => write!(f, "policy {}", arn),
            CreatedResource::PolicyAttachment {
                role_name,
                policy_arn,
            } => write!(f, "attachment of {} to role {}", policy_arn, role_name),
            CreatedResource::InstanceProfile { name } => write!(f, "instance profile {}", name),
            CreatedResource::ProfileRole {
                profile_name,
                role_name,
            } => write!(f, "role {} in instance profile {}", role_name, profile_name),
        }
    }
}

/// Summary of a rollback
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    /// Resources removed
    pub removed: usize,
    /// Resources that could not be removed and are left behind
    pub orphaned: Vec<CreatedResource>,
}

/// Ordered list of resources created so far
#[derive(Clone, Debug, Default)]
pub struct ProvisionJournal {
    created: Vec<CreatedResource>,
}

impl ProvisionJournal {
    /// Empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully created resource
    pub fn record(&mut self, resource: CreatedResource) {
        self.created.push(resource);
    }

    /// Resources in creation order
    pub fn entries(&self) -> &[CreatedResource] {
        &self.created
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Undo every recorded resource in reverse order.
    ///
    /// Failures are logged and skipped; the remaining entries are still
    /// attempted. Consumes the journal.
    pub async fn rollback(self, control_plane: &dyn ControlPlane) -> RollbackSummary {
        let mut summary = RollbackSummary::default();
        if self.created.is_empty() {
            return summary;
        }

        info!(resources = self.created.len(), "rolling back created resources");

        for resource in self.created.into_iter().rev() {
            match resource.undo(control_plane).await {
                Ok(()) => {
                    info!(resource = %resource, "rolled back");
                    summary.removed += 1;
                }
                Err(e) => {
                    warn!(
                        resource = %resource,
                        error = %e,
                        "rollback step failed, leaving resource behind"
                    );
                    summary.orphaned.push(resource);
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;
    use mockall::Sequence;
    use mqspec_common::Error;

    #[tokio::test]
    async fn rollback_runs_in_reverse_order() {
        let mut seq = Sequence::new();
        let mut cp = MockControlPlane::new();
        cp.expect_delete_subnet()
            .withf(|id| id == "subnet-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        cp.expect_delete_vpc()
            .withf(|id| id == "vpc-1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        cp.expect_delete_cluster()
            .withf(|name| name == "demo")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut journal = ProvisionJournal::new();
        journal.record(CreatedResource::Cluster {
            name: "demo".to_string(),
        });
        journal.record(CreatedResource::Vpc {
            vpc_id: "vpc-1".to_string(),
        });
        journal.record(CreatedResource::Subnet {
            subnet_id: "subnet-1".to_string(),
        });

        let summary = journal.rollback(&cp).await;
        assert_eq!(summary.removed, 3);
        assert!(summary.orphaned.is_empty());
    }

    #[tokio::test]
    async fn failed_undo_is_skipped_not_raised() {
        let mut cp = MockControlPlane::new();
        cp.expect_delete_security_group()
            .times(1)
            .returning(|id| Err(Error::control_plane("DeleteSecurityGroup", id, "in use")));
        cp.expect_delete_vpc().times(1).returning(|_| Ok(()));

        let mut journal = ProvisionJournal::new();
        journal.record(CreatedResource::Vpc {
            vpc_id: "vpc-1".to_string(),
        });
        journal.record(CreatedResource::SecurityGroup {
            group_id: "sg-1".to_string(),
        });

        let summary = journal.rollback(&cp).await;
        assert_eq!(summary.removed, 1);
        assert_eq!(
            summary.orphaned,
            vec![CreatedResource::SecurityGroup {
                group_id: "sg-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn empty_journal_makes_no_calls() {
        let cp = MockControlPlane::new();
        let summary = ProvisionJournal::new().rollback(&cp).await;
        assert_eq!(summary, RollbackSummary::default());
    }

    #[test]
    fn display_names_the_resource() {
        let route = CreatedResource::Route {
            route_table_id: "rtb-1".to_string(),
            destination_cidr: "0.0.0.0/0".to_string(),
        };
        assert_eq!(route.to_string(), "route 0.0.0.0/0 in rtb-1");
    }
}
