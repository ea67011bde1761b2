//! `ControlPlane` over the AWS SDK
//!
//! Each trait method is one SDK request. SDK errors are flattened into
//! [`Error::ControlPlane`] with the AWS operation name, the resource the call
//! was about, and the full error chain as the message.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::types::{
    AttributeBooleanValue, Filter, IpPermission, IpRange, Tag, UserIdGroupPair,
};
use aws_sdk_ecs::error::DisplayErrorContext;
use tracing::debug;

use mqspec_common::{Error, Result};
use mqspec_provision::types::{IngressScope, ANYWHERE_CIDR};
use mqspec_provision::{Cluster, ControlPlane, IngressRule, InstanceProfile};

/// ECS reports deleted clusters with this status for a while after deletion
const INACTIVE_STATUS: &str = "INACTIVE";

fn sdk_error<E>(operation: &str, resource: &str, err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::control_plane(operation, resource, DisplayErrorContext(err).to_string())
}

fn missing(operation: &str, resource: &str, field: &str) -> Error {
    Error::control_plane(
        operation,
        resource,
        format!("response did not include {}", field),
    )
}

/// Map an ECS cluster description, treating inactive clusters as absent
fn active_cluster(cluster: &aws_sdk_ecs::types::Cluster) -> Option<Cluster> {
    let status = cluster.status().unwrap_or_default();
    if status == INACTIVE_STATUS {
        return None;
    }
    Some(Cluster {
        arn: cluster.cluster_arn().unwrap_or_default().to_string(),
        name: cluster.cluster_name().unwrap_or_default().to_string(),
        registered_nodes: u32::try_from(cluster.registered_container_instances_count())
            .unwrap_or(0),
        status: status.to_string(),
    })
}

/// Translate an ingress rule into an EC2 permission on `group_id`
fn ip_permission(rule: &IngressRule, group_id: &str) -> IpPermission {
    let port = i32::from(rule.port);
    let builder = IpPermission::builder()
        .ip_protocol(rule.protocol.as_str())
        .from_port(port)
        .to_port(port);
    match rule.scope {
        IngressScope::External => builder
            .ip_ranges(IpRange::builder().cidr_ip(ANYWHERE_CIDR).build())
            .build(),
        IngressScope::WithinGroup => builder
            .user_id_group_pairs(UserIdGroupPair::builder().group_id(group_id).build())
            .build(),
    }
}

/// Control plane backed by the ECS, EC2 and IAM APIs
#[derive(Clone, Debug)]
pub struct AwsControlPlane {
    ecs: aws_sdk_ecs::Client,
    ec2: aws_sdk_ec2::Client,
    iam: aws_sdk_iam::Client,
}

impl AwsControlPlane {
    /// Build clients for all three services from shared configuration
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ecs: aws_sdk_ecs::Client::new(config),
            ec2: aws_sdk_ec2::Client::new(config),
            iam: aws_sdk_iam::Client::new(config),
        }
    }

    /// Load configuration for `region` and `profile` and build clients
    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        let config = crate::config::load_sdk_config(region, profile).await;
        Self::new(&config)
    }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        debug!(cluster = %name, "DescribeClusters");
        let output = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeClusters", name, e))?;
        Ok(output
            .clusters()
            .iter()
            .filter(|c| c.cluster_name() == Some(name))
            .find_map(active_cluster))
    }

    async fn create_cluster(&self, name: &str) -> Result<Cluster> {
        debug!(cluster = %name, "CreateCluster");
        let output = self
            .ecs
            .create_cluster()
            .cluster_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("CreateCluster", name, e))?;
        output
            .cluster()
            .and_then(active_cluster)
            .ok_or_else(|| missing("CreateCluster", name, "an active cluster"))
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        debug!(cluster = %name, "DeleteCluster");
        self.ecs
            .delete_cluster()
            .cluster(name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteCluster", name, e))?;
        Ok(())
    }

    async fn create_vpc(&self, cidr: &str) -> Result<String> {
        debug!(cidr = %cidr, "CreateVpc");
        let output = self
            .ec2
            .create_vpc()
            .cidr_block(cidr)
            .send()
            .await
            .map_err(|e| sdk_error("CreateVpc", cidr, e))?;
        output
            .vpc()
            .and_then(|vpc| vpc.vpc_id())
            .map(str::to_string)
            .ok_or_else(|| missing("CreateVpc", cidr, "a vpc id"))
    }

    async fn enable_vpc_dns_support(&self, vpc_id: &str) -> Result<()> {
        debug!(vpc_id = %vpc_id, "ModifyVpcAttribute enableDnsSupport");
        self.ec2
            .modify_vpc_attribute()
            .vpc_id(vpc_id)
            .enable_dns_support(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| sdk_error("ModifyVpcAttribute", vpc_id, e))?;
        Ok(())
    }

    async fn enable_vpc_dns_hostnames(&self, vpc_id: &str) -> Result<()> {
        debug!(vpc_id = %vpc_id, "ModifyVpcAttribute enableDnsHostnames");
        self.ec2
            .modify_vpc_attribute()
            .vpc_id(vpc_id)
            .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| sdk_error("ModifyVpcAttribute", vpc_id, e))?;
        Ok(())
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        debug!(vpc_id = %vpc_id, "DeleteVpc");
        self.ec2
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteVpc", vpc_id, e))?;
        Ok(())
    }

    async fn create_tag(&self, resource_id: &str, key: &str, value: &str) -> Result<()> {
        debug!(resource = %resource_id, key = %key, value = %value, "CreateTags");
        self.ec2
            .create_tags()
            .resources(resource_id)
            .tags(Tag::builder().key(key).value(value).build())
            .send()
            .await
            .map_err(|e| sdk_error("CreateTags", resource_id, e))?;
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: &str) -> Result<String> {
        debug!(vpc_id = %vpc_id, cidr = %cidr, "CreateSubnet");
        let output = self
            .ec2
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .send()
            .await
            .map_err(|e| sdk_error("CreateSubnet", vpc_id, e))?;
        output
            .subnet()
            .and_then(|subnet| subnet.subnet_id())
            .map(str::to_string)
            .ok_or_else(|| missing("CreateSubnet", vpc_id, "a subnet id"))
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        debug!(subnet_id = %subnet_id, "DeleteSubnet");
        self.ec2
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteSubnet", subnet_id, e))?;
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        debug!("CreateInternetGateway");
        let output = self
            .ec2
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| sdk_error("CreateInternetGateway", "-", e))?;
        output
            .internet_gateway()
            .and_then(|gateway| gateway.internet_gateway_id())
            .map(str::to_string)
            .ok_or_else(|| missing("CreateInternetGateway", "-", "a gateway id"))
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        debug!(gateway_id = %gateway_id, vpc_id = %vpc_id, "AttachInternetGateway");
        self.ec2
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error("AttachInternetGateway", gateway_id, e))?;
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        debug!(gateway_id = %gateway_id, vpc_id = %vpc_id, "DetachInternetGateway");
        self.ec2
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error("DetachInternetGateway", gateway_id, e))?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        debug!(gateway_id = %gateway_id, "DeleteInternetGateway");
        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteInternetGateway", gateway_id, e))?;
        Ok(())
    }

    async fn describe_route_tables(&self, vpc_id: &str) -> Result<Vec<String>> {
        debug!(vpc_id = %vpc_id, "DescribeRouteTables");
        let output = self
            .ec2
            .describe_route_tables()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| sdk_error("DescribeRouteTables", vpc_id, e))?;
        Ok(output
            .route_tables()
            .iter()
            .filter_map(|table| table.route_table_id())
            .map(str::to_string)
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()> {
        debug!(
            route_table_id = %route_table_id,
            destination = %destination_cidr,
            gateway_id = %gateway_id,
            "CreateRoute"
        );
        self.ec2
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| sdk_error("CreateRoute", route_table_id, e))?;
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()> {
        debug!(route_table_id = %route_table_id, destination = %destination_cidr, "DeleteRoute");
        self.ec2
            .delete_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteRoute", route_table_id, e))?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<String> {
        debug!(name = %name, vpc_id = %vpc_id, "CreateSecurityGroup");
        let output = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error("CreateSecurityGroup", name, e))?;
        output
            .group_id()
            .map(str::to_string)
            .ok_or_else(|| missing("CreateSecurityGroup", name, "a group id"))
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        debug!(group_id = %group_id, rules = rules.len(), "AuthorizeSecurityGroupIngress");
        let permissions = rules
            .iter()
            .map(|rule| ip_permission(rule, group_id))
            .collect();
        self.ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
            .map_err(|e| sdk_error("AuthorizeSecurityGroupIngress", group_id, e))?;
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        debug!(group_id = %group_id, "DeleteSecurityGroup");
        self.ec2
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteSecurityGroup", group_id, e))?;
        Ok(())
    }

    async fn create_role(&self, name: &str, trust_document: &str) -> Result<String> {
        debug!(role = %name, "CreateRole");
        let output = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_document)
            .send()
            .await
            .map_err(|e| sdk_error("CreateRole", name, e))?;
        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| missing("CreateRole", name, "a role"))
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        debug!(role = %name, "DeleteRole");
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteRole", name, e))?;
        Ok(())
    }

    async fn create_policy(&self, name: &str, document: &str) -> Result<String> {
        debug!(policy = %name, "CreatePolicy");
        let output = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| sdk_error("CreatePolicy", name, e))?;
        output
            .policy()
            .and_then(|policy| policy.arn())
            .map(str::to_string)
            .ok_or_else(|| missing("CreatePolicy", name, "a policy arn"))
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        debug!(policy_arn = %policy_arn, "DeletePolicy");
        self.iam
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| sdk_error("DeletePolicy", policy_arn, e))?;
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        debug!(role = %role_name, policy_arn = %policy_arn, "AttachRolePolicy");
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| sdk_error("AttachRolePolicy", role_name, e))?;
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        debug!(role = %role_name, policy_arn = %policy_arn, "DetachRolePolicy");
        self.iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| sdk_error("DetachRolePolicy", role_name, e))?;
        Ok(())
    }

    async fn create_instance_profile(&self, name: &str) -> Result<()> {
        debug!(instance_profile = %name, "CreateInstanceProfile");
        self.iam
            .create_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("CreateInstanceProfile", name, e))?;
        Ok(())
    }

    async fn get_instance_profile(&self, name: &str) -> Result<Option<InstanceProfile>> {
        debug!(instance_profile = %name, "GetInstanceProfile");
        let output = match self
            .iam
            .get_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_no_such_entity_exception())
                    .unwrap_or(false) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(sdk_error("GetInstanceProfile", name, e)),
        };
        Ok(output.instance_profile().map(|profile| InstanceProfile {
            name: profile.instance_profile_name().to_string(),
            roles: profile
                .roles()
                .iter()
                .map(|role| role.role_name().to_string())
                .collect(),
        }))
    }

    async fn delete_instance_profile(&self, name: &str) -> Result<()> {
        debug!(instance_profile = %name, "DeleteInstanceProfile");
        self.iam
            .delete_instance_profile()
            .instance_profile_name(name)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteInstanceProfile", name, e))?;
        Ok(())
    }

    async fn add_role_to_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        debug!(instance_profile = %profile_name, role = %role_name, "AddRoleToInstanceProfile");
        self.iam
            .add_role_to_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| sdk_error("AddRoleToInstanceProfile", profile_name, e))?;
        Ok(())
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        debug!(
            instance_profile = %profile_name,
            role = %role_name,
            "RemoveRoleFromInstanceProfile"
        );
        self.iam
            .remove_role_from_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| sdk_error("RemoveRoleFromInstanceProfile", profile_name, e))?;
        Ok(())
    }
}
