//! Cloud control-plane abstraction
//!
//! Provides a trait over the cluster, network and identity operations the
//! provisioner consumes, allowing tests to mock remote calls while
//! production code talks to the real cloud API. Every method is a single
//! remote request: it either succeeds or fails with
//! [`Error::ControlPlane`](mqspec_common::Error::ControlPlane) naming the
//! operation and resource.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use mqspec_common::Result;

use crate::types::{Cluster, IngressRule, InstanceProfile};

/// Trait abstracting the cloud control plane
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Look up a cluster by name. `None` if it does not exist (or is inactive).
    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>>;

    /// Create a cluster with the given name
    async fn create_cluster(&self, name: &str) -> Result<Cluster>;

    /// Delete a cluster by name
    async fn delete_cluster(&self, name: &str) -> Result<()>;

    /// Create a VPC, returning its id
    async fn create_vpc(&self, cidr: &str) -> Result<String>;

    /// Turn on DNS resolution inside the VPC
    async fn enable_vpc_dns_support(&self, vpc_id: &str) -> Result<()>;

    /// Turn on DNS hostnames for instances in the VPC
    async fn enable_vpc_dns_hostnames(&self, vpc_id: &str) -> Result<()>;

    /// Delete a VPC
    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;

    /// Set a tag on any taggable resource
    async fn create_tag(&self, resource_id: &str, key: &str, value: &str) -> Result<()>;

    /// Create a subnet inside a VPC, returning its id
    async fn create_subnet(&self, vpc_id: &str, cidr: &str) -> Result<String>;

    /// Delete a subnet
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;

    /// Create an internet gateway, returning its id
    async fn create_internet_gateway(&self) -> Result<String>;

    /// Attach an internet gateway to a VPC
    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;

    /// Detach an internet gateway from a VPC
    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;

    /// Delete an internet gateway
    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()>;

    /// Ids of the route tables associated with a VPC, in control-plane order
    async fn describe_route_tables(&self, vpc_id: &str) -> Result<Vec<String>>;

    /// Add a route sending `destination_cidr` to an internet gateway
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()>;

    /// Remove a route
    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()>;

    /// Create a security group inside a VPC, returning its id
    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> Result<String>;

    /// Authorize a batch of ingress rules in one request.
    ///
    /// `WithinGroup` rules name `group_id` itself as the peer.
    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()>;

    /// Delete a security group
    async fn delete_security_group(&self, group_id: &str) -> Result<()>;

    /// Create a role with the given trust document, returning its ARN
    async fn create_role(&self, name: &str, trust_document: &str) -> Result<String>;

    /// Delete a role
    async fn delete_role(&self, name: &str) -> Result<()>;

    /// Create a managed policy, returning its ARN
    async fn create_policy(&self, name: &str, document: &str) -> Result<String>;

    /// Delete a managed policy
    async fn delete_policy(&self, policy_arn: &str) -> Result<()>;

    /// Attach a managed policy to a role
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Detach a managed policy from a role
    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Create an instance profile
    async fn create_instance_profile(&self, name: &str) -> Result<()>;

    /// Read an instance profile. `None` while it is not (yet) visible.
    async fn get_instance_profile(&self, name: &str) -> Result<Option<InstanceProfile>>;

    /// Delete an instance profile
    async fn delete_instance_profile(&self, name: &str) -> Result<()>;

    /// Put a role into an instance profile
    async fn add_role_to_instance_profile(&self, profile_name: &str, role_name: &str)
        -> Result<()>;

    /// Take a role out of an instance profile
    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()>;
}
