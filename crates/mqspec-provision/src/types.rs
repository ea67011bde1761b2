//! Data model for a provisioning run.
//!
//! Every entity is keyed by the cluster name; there is no separate identity
//! scheme. Nothing here is ever deleted by a successful run.

use std::fmt;

use serde::{Deserialize, Serialize};

use mqspec_common::{Error, Result};

/// Address range of every cluster network (16 addresses)
pub const NETWORK_CIDR: &str = "172.31.0.0/28";

/// Source range for externally reachable ingress rules
pub const ANYWHERE_CIDR: &str = "0.0.0.0/0";

/// Default cluster name when none is supplied
pub const DEFAULT_CLUSTER_NAME: &str = "mq-cluster";

/// Default number of message-queue containers
pub const DEFAULT_INSTANCES: u32 = 3;

/// Default storage per node in GiB
pub const DEFAULT_STORAGE_GIB: u32 = 10;

/// Default target region
pub const DEFAULT_REGION: &str = "us-west-1";

/// Longest cluster name accepted (the IAM role name limit)
const MAX_CLUSTER_NAME_LEN: usize = 64;

/// Desired state for one provisioning run. Immutable once validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Cluster name; also names the role, policy, profile and security group
    pub name: String,
    /// Desired number of compute instances
    pub instances: u32,
    /// Desired storage per node in GiB
    pub storage_gib: u32,
    /// Target region
    pub region: String,
    /// Credential profile, if not the default chain
    pub profile: Option<String>,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_CLUSTER_NAME.to_string(),
            instances: DEFAULT_INSTANCES,
            storage_gib: DEFAULT_STORAGE_GIB,
            region: DEFAULT_REGION.to_string(),
            profile: None,
        }
    }
}

impl ClusterSpec {
    /// Spec for `name` with default sizing
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check the cluster spec before any remote call is made
    pub fn validate(&self) -> Result<()> {
        validate_cluster_name(&self.name)?;
        if self.instances == 0 {
            return Err(Error::configuration("instances must be at least 1"));
        }
        if self.storage_gib == 0 {
            return Err(Error::configuration("storage must be at least 1 GiB"));
        }
        if self.region.trim().is_empty() {
            return Err(Error::configuration("region must not be empty"));
        }
        Ok(())
    }
}

fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration("cluster name must not be empty"));
    }
    if name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(Error::configuration(format!(
            "cluster name '{}' is longer than {} characters",
            name, MAX_CLUSTER_NAME_LEN
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(Error::configuration(format!(
            "cluster name '{}' must start with a letter or digit",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::configuration(format!(
            "cluster name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

/// A compute cluster as reported by the control plane
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster ARN
    pub arn: String,
    /// Cluster name
    pub name: String,
    /// Number of compute nodes registered with the cluster
    pub registered_nodes: u32,
    /// Control-plane status string (e.g. "ACTIVE")
    pub status: String,
}

/// Transport protocol of an ingress rule
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl Protocol {
    /// Protocol name as the control plane expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may reach a port
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngressScope {
    /// Any address ([`ANYWHERE_CIDR`])
    External,
    /// Only members of the cluster's own security group
    WithinGroup,
}

impl fmt::Display for IngressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressScope::External => f.write_str("external"),
            IngressScope::WithinGroup => f.write_str("within-group"),
        }
    }
}

/// An allow-rule on the cluster security group
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    /// Transport protocol
    pub protocol: Protocol,
    /// Port (single port, not a range)
    pub port: u16,
    /// Permitted source
    pub scope: IngressScope,
}

impl IngressRule {
    /// Rule open to any address
    pub const fn external(protocol: Protocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            scope: IngressScope::External,
        }
    }

    /// Rule open only to the cluster's own security group
    pub const fn within_group(protocol: Protocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            scope: IngressScope::WithinGroup,
        }
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.port, self.protocol, self.scope)
    }
}

/// SSH
pub const SSH_PORT: u16 = 22;
/// HTTP
pub const HTTP_PORT: u16 = 80;
/// Application UI / API
pub const APP_PORT: u16 = 4040;
/// Overlay network control and data (tcp + udp)
pub const OVERLAY_PORT: u16 = 6783;
/// Overlay network fast datapath (udp)
pub const OVERLAY_FASTDP_PORT: u16 = 6784;

/// The fixed ingress policy: SSH, HTTP and the app port open externally;
/// overlay ports and the app port open within the group.
pub const STANDARD_INGRESS_RULES: [IngressRule; 7] = [
    IngressRule::external(Protocol::Tcp, SSH_PORT),
    IngressRule::external(Protocol::Tcp, HTTP_PORT),
    IngressRule::external(Protocol::Tcp, APP_PORT),
    IngressRule::within_group(Protocol::Tcp, OVERLAY_PORT),
    IngressRule::within_group(Protocol::Udp, OVERLAY_PORT),
    IngressRule::within_group(Protocol::Udp, OVERLAY_FASTDP_PORT),
    IngressRule::within_group(Protocol::Tcp, APP_PORT),
];

/// Network built for a freshly created cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEnvironment {
    /// VPC id
    pub vpc_id: String,
    /// Address range of both the VPC and its single subnet
    pub cidr: String,
    /// Subnet id
    pub subnet_id: String,
    /// Internet gateway id
    pub internet_gateway_id: String,
    /// Route table that carries the default route
    pub route_table_id: String,
    /// Security group id
    pub security_group_id: String,
    /// Rules authorized on the security group
    pub ingress: Vec<IngressRule>,
}

/// IAM entities built for a freshly created cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTopology {
    /// Role name
    pub role_name: String,
    /// Role ARN
    pub role_arn: String,
    /// Policy name
    pub policy_name: String,
    /// Policy ARN
    pub policy_arn: String,
    /// Instance profile name
    pub instance_profile_name: String,
    /// Whether the policy was attached to the role
    pub policy_attached: bool,
}

/// An instance profile as read back from the control plane
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProfile {
    /// Profile name
    pub name: String,
    /// Names of roles currently in the profile
    pub roles: Vec<String>,
}
