//! Network topology for a new cluster
//!
//! Builds VPC, subnet, internet gateway, default route and security group in
//! that order; every step needs the id produced by the one before it.
//!
//! Precondition: the VPC is the one created here, so its only route table is
//! the main table the control plane created with it. The first table the
//! VPC-filtered search returns is taken as that table; VPCs with custom
//! routing are not handled.

use tracing::{debug, info};

use mqspec_common::{Error, Result};

use crate::control_plane::ControlPlane;
use crate::journal::{CreatedResource, ProvisionJournal};
use crate::recipe::NetworkPlan;
use crate::types::{NetworkEnvironment, ANYWHERE_CIDR};

const NAME_TAG: &str = "Name";

/// Builds a [`NetworkEnvironment`] from a [`NetworkPlan`]
pub struct NetworkTopologyBuilder<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> NetworkTopologyBuilder<'a> {
    /// Create a builder over the given control plane
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }

    /// Create the whole network, recording each created resource in `journal`.
    ///
    /// There is no rollback here: a failure leaves what was created so far
    /// in the journal for the caller to undo.
    pub async fn build(
        &self,
        plan: &NetworkPlan,
        journal: &mut ProvisionJournal,
    ) -> Result<NetworkEnvironment> {
        let cp = self.control_plane;

        // VPC with DNS support and hostnames (two separate attribute calls)
        let vpc_id = cp.create_vpc(&plan.cidr).await?;
        journal.record(CreatedResource::Vpc {
            vpc_id: vpc_id.clone(),
        });
        info!(vpc_id = %vpc_id, cidr = %plan.cidr, "created vpc");

        cp.enable_vpc_dns_support(&vpc_id).await?;
        cp.enable_vpc_dns_hostnames(&vpc_id).await?;
        cp.create_tag(&vpc_id, NAME_TAG, &plan.vpc_name).await?;

        // Single subnet spanning the whole VPC range
        let subnet_id = cp.create_subnet(&vpc_id, &plan.cidr).await?;
        journal.record(CreatedResource::Subnet {
            subnet_id: subnet_id.clone(),
        });
        cp.create_tag(&subnet_id, NAME_TAG, &plan.subnet_name).await?;
        info!(subnet_id = %subnet_id, "created subnet");

        // Internet gateway
        let gateway_id = cp.create_internet_gateway().await?;
        journal.record(CreatedResource::InternetGateway {
            gateway_id: gateway_id.clone(),
        });
        cp.create_tag(&gateway_id, NAME_TAG, &plan.gateway_name).await?;
        cp.attach_internet_gateway(&gateway_id, &vpc_id).await?;
        journal.record(CreatedResource::GatewayAttachment {
            gateway_id: gateway_id.clone(),
            vpc_id: vpc_id.clone(),
        });
        info!(gateway_id = %gateway_id, vpc_id = %vpc_id, "attached internet gateway");

        // Default route through the gateway on the VPC's main route table
        let route_tables = cp.describe_route_tables(&vpc_id).await?;
        debug!(vpc_id = %vpc_id, tables = route_tables.len(), "found route tables");
        let route_table_id = route_tables.into_iter().next().ok_or_else(|| {
            Error::control_plane("DescribeRouteTables", &vpc_id, "vpc has no route table")
        })?;
        cp.create_route(&route_table_id, ANYWHERE_CIDR, &gateway_id).await?;
        journal.record(CreatedResource::Route {
            route_table_id: route_table_id.clone(),
            destination_cidr: ANYWHERE_CIDR.to_string(),
        });
        info!(route_table_id = %route_table_id, "added default route");

        // Security group with the ingress policy in one batch
        let security_group_id = cp
            .create_security_group(
                &plan.security_group_name,
                &plan.security_group_description,
                &vpc_id,
            )
            .await?;
        journal.record(CreatedResource::SecurityGroup {
            group_id: security_group_id.clone(),
        });
        cp.authorize_ingress(&security_group_id, &plan.ingress).await?;
        info!(
            security_group_id = %security_group_id,
            rules = plan.ingress.len(),
            "authorized ingress"
        );

        Ok(NetworkEnvironment {
            vpc_id,
            cidr: plan.cidr.clone(),
            subnet_id,
            internet_gateway_id: gateway_id,
            route_table_id,
            security_group_id,
            ingress: plan.ingress.clone(),
        })
    }
}
