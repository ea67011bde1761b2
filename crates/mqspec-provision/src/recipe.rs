//! Recipes: per-environment strategies for what to provision
//!
//! A recipe decides the shape of the network and access topology for a
//! cluster name. The orchestrator owns sequencing; recipes own layout.

use std::fmt::Debug;

use tracing::warn;

use crate::templates::{POLICY_TEMPLATE, ROLE_TEMPLATE};
use crate::types::{IngressRule, NETWORK_CIDR, STANDARD_INGRESS_RULES};

/// Name of the default recipe
pub const DEFAULT_RECIPE: &str = "recipe1";

/// Layout of the network built for a new cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkPlan {
    /// Address range of the VPC and its single subnet
    pub cidr: String,
    /// `Name` tag for the VPC
    pub vpc_name: String,
    /// `Name` tag for the subnet
    pub subnet_name: String,
    /// `Name` tag for the internet gateway
    pub gateway_name: String,
    /// Security group name
    pub security_group_name: String,
    /// Security group description
    pub security_group_description: String,
    /// Rules to authorize in one batch
    pub ingress: Vec<IngressRule>,
}

/// Layout of the IAM entities built for a new cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPlan {
    /// Role name
    pub role_name: String,
    /// Policy name
    pub policy_name: String,
    /// Instance profile name
    pub instance_profile_name: String,
    /// Template holding the role trust document
    pub role_template: String,
    /// Template holding the policy document
    pub policy_template: String,
    /// Attach the policy to the role once both exist
    pub attach_policy: bool,
}

/// Strategy for a target environment
pub trait Recipe: Debug + Send + Sync {
    /// Name used to select the recipe
    fn name(&self) -> &'static str;

    /// Network layout for `cluster`
    fn network_plan(&self, cluster: &str) -> NetworkPlan;

    /// IAM layout for `cluster`
    fn access_plan(&self, cluster: &str) -> AccessPlan;
}

/// One VPC with a single /28 subnet, the fixed seven-rule ingress policy,
/// and one role/policy/profile named after the cluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRecipe;

impl Recipe for StandardRecipe {
    fn name(&self) -> &'static str {
        DEFAULT_RECIPE
    }

    fn network_plan(&self, cluster: &str) -> NetworkPlan {
        NetworkPlan {
            cidr: NETWORK_CIDR.to_string(),
            vpc_name: format!("{}-vpc", cluster),
            subnet_name: format!("{}-subnet", cluster),
            gateway_name: cluster.to_string(),
            security_group_name: cluster.to_string(),
            security_group_description: format!("message queue cluster {}", cluster),
            ingress: STANDARD_INGRESS_RULES.to_vec(),
        }
    }

    fn access_plan(&self, cluster: &str) -> AccessPlan {
        AccessPlan {
            role_name: cluster.to_string(),
            policy_name: cluster.to_string(),
            instance_profile_name: cluster.to_string(),
            role_template: ROLE_TEMPLATE.to_string(),
            policy_template: POLICY_TEMPLATE.to_string(),
            attach_policy: true,
        }
    }
}

/// Names of every known recipe
pub fn recipe_names() -> Vec<&'static str> {
    vec![StandardRecipe.name()]
}

/// Look up a recipe by name, falling back to the default for unknown names
pub fn recipe_by_name(name: &str) -> Box<dyn Recipe> {
    match name {
        DEFAULT_RECIPE => Box::new(StandardRecipe),
        other => {
            warn!(
                recipe = %other,
                fallback = DEFAULT_RECIPE,
                "unknown recipe, using default"
            );
            Box::new(StandardRecipe)
        }
    }
}
