//! Process-local control plane
//!
//! Keeps clusters, networks and IAM entities in memory and enforces the
//! same preconditions the real control plane does (an internet gateway must
//! exist before it is attached, a role must exist before it joins a profile,
//! names are unique). Instance profiles can be given a propagation delay so
//! that they stay invisible for a number of reads after creation, and adding
//! a role to a profile that is not visible yet fails the way IAM does.
//!
//! Used for `--dry-run` and as the fake in scenario tests.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use mqspec_common::{Error, Result};

use crate::control_plane::ControlPlane;
use crate::types::{Cluster, IngressRule, InstanceProfile};

const ACCOUNT: &str = "000000000000";

/// A VPC held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpcRecord {
    /// VPC id
    pub id: String,
    /// Address range
    pub cidr: String,
    /// DNS resolution enabled
    pub dns_support: bool,
    /// DNS hostnames enabled
    pub dns_hostnames: bool,
}

/// A subnet held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetRecord {
    /// Subnet id
    pub id: String,
    /// Owning VPC
    pub vpc_id: String,
    /// Address range
    pub cidr: String,
}

/// An internet gateway held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayRecord {
    /// Gateway id
    pub id: String,
    /// VPC the gateway is attached to
    pub attached_vpc: Option<String>,
}

/// A route table held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTableRecord {
    /// Route table id
    pub id: String,
    /// Owning VPC
    pub vpc_id: String,
    /// Destination CIDR to gateway id
    pub routes: BTreeMap<String, String>,
}

/// A security group held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupRecord {
    /// Group id
    pub id: String,
    /// Group name
    pub name: String,
    /// Owning VPC
    pub vpc_id: String,
    /// Authorized ingress rules
    pub ingress: Vec<IngressRule>,
    /// Number of authorize requests received
    pub authorize_requests: u32,
}

/// A role held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRecord {
    /// Role name
    pub name: String,
    /// Role ARN
    pub arn: String,
    /// Trust document as submitted
    pub trust_document: String,
    /// ARNs of attached managed policies
    pub attached_policies: BTreeSet<String>,
}

/// A managed policy held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRecord {
    /// Policy name
    pub name: String,
    /// Policy ARN
    pub arn: String,
    /// Policy document as submitted
    pub document: String,
}

/// An instance profile held by the in-memory control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceProfileRecord {
    /// Profile name
    pub name: String,
    /// Roles in the profile
    pub roles: Vec<String>,
    /// Reads remaining before the profile becomes visible
    pub reads_until_visible: u32,
}

/// Snapshot of everything the in-memory control plane holds
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Clusters
    pub clusters: Vec<Cluster>,
    /// VPCs
    pub vpcs: Vec<VpcRecord>,
    /// Subnets
    pub subnets: Vec<SubnetRecord>,
    /// Internet gateways
    pub internet_gateways: Vec<GatewayRecord>,
    /// Route tables, including each VPC's main table
    pub route_tables: Vec<RouteTableRecord>,
    /// Security groups
    pub security_groups: Vec<SecurityGroupRecord>,
    /// Roles
    pub roles: Vec<RoleRecord>,
    /// Managed policies
    pub policies: Vec<PolicyRecord>,
    /// Instance profiles
    pub instance_profiles: Vec<InstanceProfileRecord>,
    /// Tags by resource id
    pub tags: BTreeMap<String, BTreeMap<String, String>>,
}

impl Inventory {
    /// Value of the `Name` tag on a resource
    pub fn name_tag(&self, resource_id: &str) -> Option<&str> {
        self.tags
            .get(resource_id)
            .and_then(|tags| tags.get("Name"))
            .map(String::as_str)
    }

    /// Whether nothing besides clusters exists
    pub fn has_no_environment(&self) -> bool {
        self.vpcs.is_empty()
            && self.subnets.is_empty()
            && self.internet_gateways.is_empty()
            && self.route_tables.is_empty()
            && self.security_groups.is_empty()
            && self.roles.is_empty()
            && self.policies.is_empty()
            && self.instance_profiles.is_empty()
    }
}

#[derive(Default)]
struct State {
    next_id: u32,
    calls: Vec<String>,
    fail_on: Option<String>,
    profile_delay: u32,
    clusters: BTreeMap<String, Cluster>,
    vpcs: BTreeMap<String, VpcRecord>,
    subnets: BTreeMap<String, SubnetRecord>,
    gateways: BTreeMap<String, GatewayRecord>,
    route_tables: BTreeMap<String, RouteTableRecord>,
    security_groups: BTreeMap<String, SecurityGroupRecord>,
    roles: BTreeMap<String, RoleRecord>,
    policies: BTreeMap<String, PolicyRecord>,
    profiles: BTreeMap<String, InstanceProfileRecord>,
    tags: BTreeMap<String, BTreeMap<String, String>>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    /// Log the call and apply an injected failure, if any
    fn enter(&mut self, operation: &str, resource: &str) -> Result<()> {
        debug!(operation, resource, "in-memory control plane call");
        self.calls.push(operation.to_string());
        if self.fail_on.as_deref() == Some(operation) {
            return Err(Error::control_plane(
                operation,
                resource,
                "injected failure",
            ));
        }
        Ok(())
    }
}

fn not_found(operation: &str, resource: &str) -> Error {
    Error::control_plane(operation, resource, "resource does not exist")
}

fn already_exists(operation: &str, resource: &str) -> Error {
    Error::control_plane(operation, resource, "resource already exists")
}

fn dependency_violation(operation: &str, resource: &str, what: &str) -> Error {
    Error::control_plane(
        operation,
        resource,
        format!("resource has a dependent object: {}", what),
    )
}

/// Control plane that keeps all state in process memory
#[derive(Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    /// Create an empty control plane
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing, active cluster with `registered_nodes` nodes
    pub fn with_cluster(self, name: &str, registered_nodes: u32) -> Self {
        self.state.lock().clusters.insert(
            name.to_string(),
            Cluster {
                arn: cluster_arn(name),
                name: name.to_string(),
                registered_nodes,
                status: "ACTIVE".to_string(),
            },
        );
        self
    }

    /// Keep new instance profiles invisible for the first `reads` reads
    pub fn with_profile_propagation_delay(self, reads: u32) -> Self {
        self.state.lock().profile_delay = reads;
        self
    }

    /// Fail every call to `operation` (e.g. "AuthorizeSecurityGroupIngress")
    pub fn fail_on(self, operation: &str) -> Self {
        self.state.lock().fail_on = Some(operation.to_string());
        self
    }

    /// Operation names in the order they were called
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of calls to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Snapshot of current state
    pub fn inventory(&self) -> Inventory {
        let state = self.state.lock();
        Inventory {
            clusters: state.clusters.values().cloned().collect(),
            vpcs: state.vpcs.values().cloned().collect(),
            subnets: state.subnets.values().cloned().collect(),
            internet_gateways: state.gateways.values().cloned().collect(),
            route_tables: state.route_tables.values().cloned().collect(),
            security_groups: state.security_groups.values().cloned().collect(),
            roles: state.roles.values().cloned().collect(),
            policies: state.policies.values().cloned().collect(),
            instance_profiles: state.profiles.values().cloned().collect(),
            tags: state.tags.clone(),
        }
    }
}

fn cluster_arn(name: &str) -> String {
    format!("arn:aws:ecs:local:{}:cluster/{}", ACCOUNT, name)
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        let mut state = self.state.lock();
        state.enter("DescribeClusters", name)?;
        Ok(state.clusters.get(name).cloned())
    }

    async fn create_cluster(&self, name: &str) -> Result<Cluster> {
        let mut state = self.state.lock();
        state.enter("CreateCluster", name)?;
        let cluster = state
            .clusters
            .entry(name.to_string())
            .or_insert_with(|| Cluster {
                arn: cluster_arn(name),
                name: name.to_string(),
                registered_nodes: 0,
                status: "ACTIVE".to_string(),
            });
        Ok(cluster.clone())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteCluster", name)?;
        state
            .clusters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteCluster", name))
    }

    async fn create_vpc(&self, cidr: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreateVpc", cidr)?;
        let vpc_id = state.next_id("vpc");
        state.vpcs.insert(
            vpc_id.clone(),
            VpcRecord {
                id: vpc_id.clone(),
                cidr: cidr.to_string(),
                dns_support: true,
                dns_hostnames: false,
            },
        );
        // Every new VPC comes with its main route table
        let rtb_id = state.next_id("rtb");
        state.route_tables.insert(
            rtb_id.clone(),
            RouteTableRecord {
                id: rtb_id,
                vpc_id: vpc_id.clone(),
                routes: BTreeMap::new(),
            },
        );
        Ok(vpc_id)
    }

    async fn enable_vpc_dns_support(&self, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("ModifyVpcAttribute", vpc_id)?;
        let vpc = state
            .vpcs
            .get_mut(vpc_id)
            .ok_or_else(|| not_found("ModifyVpcAttribute", vpc_id))?;
        vpc.dns_support = true;
        Ok(())
    }

    async fn enable_vpc_dns_hostnames(&self, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("ModifyVpcAttribute", vpc_id)?;
        let vpc = state
            .vpcs
            .get_mut(vpc_id)
            .ok_or_else(|| not_found("ModifyVpcAttribute", vpc_id))?;
        vpc.dns_hostnames = true;
        Ok(())
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteVpc", vpc_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("DeleteVpc", vpc_id));
        }
        if state.subnets.values().any(|s| s.vpc_id == vpc_id) {
            return Err(dependency_violation("DeleteVpc", vpc_id, "subnet"));
        }
        if state.security_groups.values().any(|g| g.vpc_id == vpc_id) {
            return Err(dependency_violation("DeleteVpc", vpc_id, "security group"));
        }
        if state
            .gateways
            .values()
            .any(|g| g.attached_vpc.as_deref() == Some(vpc_id))
        {
            return Err(dependency_violation(
                "DeleteVpc",
                vpc_id,
                "internet gateway",
            ));
        }
        state.vpcs.remove(vpc_id);
        state.route_tables.retain(|_, rt| rt.vpc_id != vpc_id);
        state.tags.remove(vpc_id);
        Ok(())
    }

    async fn create_tag(&self, resource_id: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("CreateTags", resource_id)?;
        let exists = state.vpcs.contains_key(resource_id)
            || state.subnets.contains_key(resource_id)
            || state.gateways.contains_key(resource_id)
            || state.route_tables.contains_key(resource_id)
            || state.security_groups.contains_key(resource_id);
        if !exists {
            return Err(not_found("CreateTags", resource_id));
        }
        state
            .tags
            .entry(resource_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreateSubnet", vpc_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("CreateSubnet", vpc_id));
        }
        let subnet_id = state.next_id("subnet");
        state.subnets.insert(
            subnet_id.clone(),
            SubnetRecord {
                id: subnet_id.clone(),
                vpc_id: vpc_id.to_string(),
                cidr: cidr.to_string(),
            },
        );
        Ok(subnet_id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteSubnet", subnet_id)?;
        state
            .subnets
            .remove(subnet_id)
            .ok_or_else(|| not_found("DeleteSubnet", subnet_id))?;
        state.tags.remove(subnet_id);
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreateInternetGateway", "-")?;
        let gateway_id = state.next_id("igw");
        state.gateways.insert(
            gateway_id.clone(),
            GatewayRecord {
                id: gateway_id.clone(),
                attached_vpc: None,
            },
        );
        Ok(gateway_id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("AttachInternetGateway", gateway_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("AttachInternetGateway", vpc_id));
        }
        let gateway = state
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| not_found("AttachInternetGateway", gateway_id))?;
        if gateway.attached_vpc.is_some() {
            return Err(Error::control_plane(
                "AttachInternetGateway",
                gateway_id,
                "gateway is already attached",
            ));
        }
        gateway.attached_vpc = Some(vpc_id.to_string());
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DetachInternetGateway", gateway_id)?;
        let gateway = state
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| not_found("DetachInternetGateway", gateway_id))?;
        if gateway.attached_vpc.as_deref() != Some(vpc_id) {
            return Err(Error::control_plane(
                "DetachInternetGateway",
                gateway_id,
                format!("gateway is not attached to {}", vpc_id),
            ));
        }
        gateway.attached_vpc = None;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteInternetGateway", gateway_id)?;
        match state.gateways.get(gateway_id) {
            None => return Err(not_found("DeleteInternetGateway", gateway_id)),
            Some(g) if g.attached_vpc.is_some() => {
                return Err(dependency_violation(
                    "DeleteInternetGateway",
                    gateway_id,
                    "vpc attachment",
                ))
            }
            Some(_) => {}
        }
        state.gateways.remove(gateway_id);
        state.tags.remove(gateway_id);
        Ok(())
    }

    async fn describe_route_tables(&self, vpc_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.enter("DescribeRouteTables", vpc_id)?;
        Ok(state
            .route_tables
            .values()
            .filter(|rt| rt.vpc_id == vpc_id)
            .map(|rt| rt.id.clone())
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("CreateRoute", route_table_id)?;
        if !state.gateways.contains_key(gateway_id) {
            return Err(not_found("CreateRoute", gateway_id));
        }
        let table = state
            .route_tables
            .get_mut(route_table_id)
            .ok_or_else(|| not_found("CreateRoute", route_table_id))?;
        if table.routes.contains_key(destination_cidr) {
            return Err(already_exists("CreateRoute", destination_cidr));
        }
        table
            .routes
            .insert(destination_cidr.to_string(), gateway_id.to_string());
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteRoute", route_table_id)?;
        let table = state
            .route_tables
            .get_mut(route_table_id)
            .ok_or_else(|| not_found("DeleteRoute", route_table_id))?;
        table
            .routes
            .remove(destination_cidr)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteRoute", destination_cidr))
    }

    async fn create_security_group(
        &self,
        name: &str,
        _description: &str,
        vpc_id: &str,
    ) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreateSecurityGroup", name)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("CreateSecurityGroup", vpc_id));
        }
        if state
            .security_groups
            .values()
            .any(|g| g.vpc_id == vpc_id && g.name == name)
        {
            return Err(already_exists("CreateSecurityGroup", name));
        }
        let group_id = state.next_id("sg");
        state.security_groups.insert(
            group_id.clone(),
            SecurityGroupRecord {
                id: group_id.clone(),
                name: name.to_string(),
                vpc_id: vpc_id.to_string(),
                ingress: Vec::new(),
                authorize_requests: 0,
            },
        );
        Ok(group_id)
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("AuthorizeSecurityGroupIngress", group_id)?;
        let group = state
            .security_groups
            .get_mut(group_id)
            .ok_or_else(|| not_found("AuthorizeSecurityGroupIngress", group_id))?;
        if let Some(dup) = rules.iter().find(|r| group.ingress.contains(r)) {
            return Err(Error::control_plane(
                "AuthorizeSecurityGroupIngress",
                group_id,
                format!("duplicate permission {}", dup),
            ));
        }
        group.ingress.extend_from_slice(rules);
        group.authorize_requests += 1;
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteSecurityGroup", group_id)?;
        state
            .security_groups
            .remove(group_id)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteSecurityGroup", group_id))
    }

    async fn create_role(&self, name: &str, trust_document: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreateRole", name)?;
        if state.roles.contains_key(name) {
            return Err(already_exists("CreateRole", name));
        }
        let arn = format!("arn:aws:iam::{}:role/{}", ACCOUNT, name);
        state.roles.insert(
            name.to_string(),
            RoleRecord {
                name: name.to_string(),
                arn: arn.clone(),
                trust_document: trust_document.to_string(),
                attached_policies: BTreeSet::new(),
            },
        );
        Ok(arn)
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteRole", name)?;
        match state.roles.get(name) {
            None => return Err(not_found("DeleteRole", name)),
            Some(role) if !role.attached_policies.is_empty() => {
                return Err(dependency_violation("DeleteRole", name, "attached policy"))
            }
            Some(_) => {}
        }
        if state
            .profiles
            .values()
            .any(|p| p.roles.iter().any(|r| r == name))
        {
            return Err(dependency_violation("DeleteRole", name, "instance profile"));
        }
        state.roles.remove(name);
        Ok(())
    }

    async fn create_policy(&self, name: &str, document: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.enter("CreatePolicy", name)?;
        let arn = format!("arn:aws:iam::{}:policy/{}", ACCOUNT, name);
        if state.policies.contains_key(&arn) {
            return Err(already_exists("CreatePolicy", name));
        }
        state.policies.insert(
            arn.clone(),
            PolicyRecord {
                name: name.to_string(),
                arn: arn.clone(),
                document: document.to_string(),
            },
        );
        Ok(arn)
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeletePolicy", policy_arn)?;
        if state
            .roles
            .values()
            .any(|r| r.attached_policies.contains(policy_arn))
        {
            return Err(dependency_violation("DeletePolicy", policy_arn, "role"));
        }
        state
            .policies
            .remove(policy_arn)
            .map(|_| ())
            .ok_or_else(|| not_found("DeletePolicy", policy_arn))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("AttachRolePolicy", role_name)?;
        if !state.policies.contains_key(policy_arn) {
            return Err(not_found("AttachRolePolicy", policy_arn));
        }
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("AttachRolePolicy", role_name))?;
        role.attached_policies.insert(policy_arn.to_string());
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DetachRolePolicy", role_name)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("DetachRolePolicy", role_name))?;
        if !role.attached_policies.remove(policy_arn) {
            return Err(not_found("DetachRolePolicy", policy_arn));
        }
        Ok(())
    }

    async fn create_instance_profile(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("CreateInstanceProfile", name)?;
        if state.profiles.contains_key(name) {
            return Err(already_exists("CreateInstanceProfile", name));
        }
        let reads_until_visible = state.profile_delay;
        state.profiles.insert(
            name.to_string(),
            InstanceProfileRecord {
                name: name.to_string(),
                roles: Vec::new(),
                reads_until_visible,
            },
        );
        Ok(())
    }

    async fn get_instance_profile(&self, name: &str) -> Result<Option<InstanceProfile>> {
        let mut state = self.state.lock();
        state.enter("GetInstanceProfile", name)?;
        let Some(profile) = state.profiles.get_mut(name) else {
            return Ok(None);
        };
        if profile.reads_until_visible > 0 {
            profile.reads_until_visible -= 1;
            return Ok(None);
        }
        Ok(Some(InstanceProfile {
            name: profile.name.clone(),
            roles: profile.roles.clone(),
        }))
    }

    async fn delete_instance_profile(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("DeleteInstanceProfile", name)?;
        match state.profiles.get(name) {
            None => Err(not_found("DeleteInstanceProfile", name)),
            Some(p) if !p.roles.is_empty() => Err(dependency_violation(
                "DeleteInstanceProfile",
                name,
                "role",
            )),
            Some(_) => {
                state.profiles.remove(name);
                Ok(())
            }
        }
    }

    async fn add_role_to_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("AddRoleToInstanceProfile", profile_name)?;
        if !state.roles.contains_key(role_name) {
            return Err(not_found("AddRoleToInstanceProfile", role_name));
        }
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| not_found("AddRoleToInstanceProfile", profile_name))?;
        if profile.reads_until_visible > 0 {
            return Err(not_found("AddRoleToInstanceProfile", profile_name));
        }
        if profile.roles.iter().any(|r| r == role_name) {
            return Err(already_exists("AddRoleToInstanceProfile", role_name));
        }
        profile.roles.push(role_name.to_string());
        Ok(())
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("RemoveRoleFromInstanceProfile", profile_name)?;
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| not_found("RemoveRoleFromInstanceProfile", profile_name))?;
        let before = profile.roles.len();
        profile.roles.retain(|r| r != role_name);
        if profile.roles.len() == before {
            return Err(not_found("RemoveRoleFromInstanceProfile", role_name));
        }
        Ok(())
    }
}
