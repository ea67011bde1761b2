//! IAM access topology for a new cluster
//!
//! Role, policy and instance profile are all named after the cluster. The
//! instance profile is eventually consistent: it can be created and still be
//! unknown to the next request, so the role is only placed into it once a
//! read has confirmed it exists.

use tracing::info;

use mqspec_common::retry::{poll_with_backoff, RetryConfig};
use mqspec_common::Result;

use crate::control_plane::ControlPlane;
use crate::journal::{CreatedResource, ProvisionJournal};
use crate::recipe::AccessPlan;
use crate::templates::DocumentStore;
use crate::types::AccessTopology;

/// Builds an [`AccessTopology`] from an [`AccessPlan`]
pub struct AccessTopologyBuilder<'a> {
    control_plane: &'a dyn ControlPlane,
    documents: &'a dyn DocumentStore,
    readiness: &'a RetryConfig,
}

impl<'a> AccessTopologyBuilder<'a> {
    /// Create a builder; `readiness` bounds the wait for the instance profile
    pub fn new(
        control_plane: &'a dyn ControlPlane,
        documents: &'a dyn DocumentStore,
        readiness: &'a RetryConfig,
    ) -> Self {
        Self {
            control_plane,
            documents,
            readiness,
        }
    }

    /// Create role, policy and instance profile, recording each in `journal`.
    ///
    /// Both documents are read before the first IAM call, so a missing
    /// template leaves nothing behind.
    pub async fn build(
        &self,
        plan: &AccessPlan,
        journal: &mut ProvisionJournal,
    ) -> Result<AccessTopology> {
        let cp = self.control_plane;

        let trust_document = self.documents.read(&plan.role_template)?;
        let policy_document = self.documents.read(&plan.policy_template)?;

        let role_arn = cp.create_role(&plan.role_name, &trust_document).await?;
        journal.record(CreatedResource::Role {
            name: plan.role_name.clone(),
        });
        info!(role = %plan.role_name, arn = %role_arn, "created role");

        let policy_arn = cp
            .create_policy(&plan.policy_name, &policy_document)
            .await?;
        journal.record(CreatedResource::Policy {
            arn: policy_arn.clone(),
        });
        info!(policy = %plan.policy_name, arn = %policy_arn, "created policy");

        if plan.attach_policy {
            cp.attach_role_policy(&plan.role_name, &policy_arn).await?;
            journal.record(CreatedResource::PolicyAttachment {
                role_name: plan.role_name.clone(),
                policy_arn: policy_arn.clone(),
            });
            info!(role = %plan.role_name, "attached policy to role");
        }

        let profile_name = plan.instance_profile_name.as_str();
        cp.create_instance_profile(profile_name).await?;
        journal.record(CreatedResource::InstanceProfile {
            name: profile_name.to_string(),
        });
        info!(instance_profile = %profile_name, "created instance profile");

        // Role attachment fails against a profile IAM cannot see yet
        let resource = format!("instance profile {}", profile_name);
        let profile = poll_with_backoff(self.readiness, &resource, move || {
            cp.get_instance_profile(profile_name)
        })
        .await?;
        info!(
            instance_profile = %profile.name,
            roles = profile.roles.len(),
            "instance profile is visible"
        );

        cp.add_role_to_instance_profile(profile_name, &plan.role_name)
            .await?;
        journal.record(CreatedResource::ProfileRole {
            profile_name: profile_name.to_string(),
            role_name: plan.role_name.clone(),
        });
        info!(
            instance_profile = %profile_name,
            role = %plan.role_name,
            "added role to instance profile"
        );

        Ok(AccessTopology {
            role_name: plan.role_name.clone(),
            role_arn,
            policy_name: plan.policy_name.clone(),
            policy_arn,
            instance_profile_name: profile_name.to_string(),
            policy_attached: plan.attach_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;
    use crate::memory::InMemoryControlPlane;
    use crate::recipe::{Recipe, StandardRecipe};
    use crate::templates::{EmbeddedDocuments, MockDocumentStore};
    use crate::types::InstanceProfile;
    use mockall::Sequence;
    use mqspec_common::Error;
    use std::time::Duration;

    fn fast_readiness(attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn builds_demo_access() {
        let cp = InMemoryControlPlane::new();
        let readiness = fast_readiness(3);
        let mut journal = ProvisionJournal::new();

        let access = AccessTopologyBuilder::new(&cp, &EmbeddedDocuments, &readiness)
            .build(&StandardRecipe.access_plan("demo"), &mut journal)
            .await
            .unwrap();

        assert_eq!(access.role_name, "demo");
        assert_eq!(access.policy_name, "demo");
        assert_eq!(access.instance_profile_name, "demo");
        assert!(access.policy_attached);

        let inv = cp.inventory();
        assert_eq!(inv.roles.len(), 1);
        assert!(inv.roles[0].trust_document.contains("sts:AssumeRole"));
        assert!(inv.roles[0].attached_policies.contains(&access.policy_arn));
        assert_eq!(inv.policies.len(), 1);
        assert_eq!(inv.instance_profiles.len(), 1);
        assert_eq!(inv.instance_profiles[0].roles, vec!["demo".to_string()]);
        assert_eq!(journal.entries().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_profile_before_adding_role() {
        let cp = InMemoryControlPlane::new().with_profile_propagation_delay(3);
        let readiness = fast_readiness(5);
        let mut journal = ProvisionJournal::new();

        AccessTopologyBuilder::new(&cp, &EmbeddedDocuments, &readiness)
            .build(&StandardRecipe.access_plan("demo"), &mut journal)
            .await
            .unwrap();

        // Three empty reads, one visible read, then the role is added
        assert_eq!(cp.call_count("GetInstanceProfile"), 4);
        let calls = cp.calls();
        let last_read = calls
            .iter()
            .rposition(|c| c == "GetInstanceProfile")
            .unwrap();
        let add = calls
            .iter()
            .position(|c| c == "AddRoleToInstanceProfile")
            .unwrap();
        assert!(last_read < add);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_never_visible_times_out() {
        let cp = InMemoryControlPlane::new().with_profile_propagation_delay(10);
        let readiness = fast_readiness(3);
        let mut journal = ProvisionJournal::new();

        let err = AccessTopologyBuilder::new(&cp, &EmbeddedDocuments, &readiness)
            .build(&StandardRecipe.access_plan("demo"), &mut journal)
            .await
            .unwrap_err();

        match err {
            Error::PropagationTimeout { resource, attempts } => {
                assert_eq!(resource, "instance profile demo");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected PropagationTimeout, got {:?}", other),
        }
        assert_eq!(cp.call_count("AddRoleToInstanceProfile"), 0);
    }

    #[tokio::test]
    async fn template_failure_makes_no_iam_calls() {
        let mut documents = MockDocumentStore::new();
        documents
            .expect_read()
            .withf(|name| name == "ecs-role.json")
            .returning(|_| Ok("{}".to_string()));
        documents
            .expect_read()
            .withf(|name| name == "ecs-policy.json")
            .returning(|name| Err(Error::template_read(name, "permission denied")));

        // No expectations: any control plane call panics
        let cp = MockControlPlane::new();
        let readiness = RetryConfig::default();
        let mut journal = ProvisionJournal::new();

        let err = AccessTopologyBuilder::new(&cp, &documents, &readiness)
            .build(&StandardRecipe.access_plan("demo"), &mut journal)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::TemplateRead { ref template, .. } if template == "ecs-policy.json"
        ));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn calls_follow_role_policy_profile_order() {
        let mut seq = Sequence::new();
        let mut cp = MockControlPlane::new();

        cp.expect_create_role()
            .withf(|name, doc| name == "demo" && doc.contains("sts:AssumeRole"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("arn:role/demo".to_string()));
        cp.expect_create_policy()
            .withf(|name, _| name == "demo")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("arn:policy/demo".to_string()));
        cp.expect_attach_role_policy()
            .withf(|role, arn| role == "demo" && arn == "arn:policy/demo")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        cp.expect_create_instance_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        cp.expect_get_instance_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(InstanceProfile {
                    name: name.to_string(),
                    roles: vec![],
                }))
            });
        cp.expect_add_role_to_instance_profile()
            .withf(|profile, role| profile == "demo" && role == "demo")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let readiness = RetryConfig::default();
        let mut journal = ProvisionJournal::new();
        let access = AccessTopologyBuilder::new(&cp, &EmbeddedDocuments, &readiness)
            .build(&StandardRecipe.access_plan("demo"), &mut journal)
            .await
            .unwrap();

        assert_eq!(access.role_arn, "arn:role/demo");
        assert_eq!(access.policy_arn, "arn:policy/demo");
    }

    #[tokio::test]
    async fn detached_plan_skips_attachment() {
        let cp = InMemoryControlPlane::new();
        let readiness = RetryConfig::default();
        let mut journal = ProvisionJournal::new();
        let plan = AccessPlan {
            attach_policy: false,
            ..StandardRecipe.access_plan("demo")
        };

        let access = AccessTopologyBuilder::new(&cp, &EmbeddedDocuments, &readiness)
            .build(&plan, &mut journal)
            .await
            .unwrap();

        assert!(!access.policy_attached);
        assert_eq!(cp.call_count("AttachRolePolicy"), 0);
        assert!(cp.inventory().roles[0].attached_policies.is_empty());
    }
}
