//! `mqspec provision`: find or create a cluster and build its environment

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use mqspec_aws::AwsControlPlane;
use mqspec_common::retry::RetryConfig;
use mqspec_provision::types::{
    DEFAULT_CLUSTER_NAME, DEFAULT_INSTANCES, DEFAULT_REGION, DEFAULT_STORAGE_GIB,
};
use mqspec_provision::{
    recipe_by_name, ClusterSpec, ControlPlane, DirectoryDocuments, DocumentStore,
    EmbeddedDocuments, InMemoryControlPlane, Orchestrator, OrchestratorConfig, ProvisionReport,
    DEFAULT_RECIPE,
};

use super::format::{render_report, OutputFormat};
use crate::config::{load_config, MqspecConfig};
use crate::key_pair::{load_key_pair, KeyPair};
use crate::Result;

/// Provision a cluster with its network and access topology
#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Cluster name; also names the role, policy, instance profile and security group
    #[arg(long, env = "MQSPEC_CLUSTER")]
    pub cluster: Option<String>,

    /// Number of message-queue instances
    #[arg(long, default_value_t = DEFAULT_INSTANCES)]
    pub instances: u32,

    /// Storage per node in GiB
    #[arg(long = "storage", default_value_t = DEFAULT_STORAGE_GIB)]
    pub storage_gib: u32,

    /// Recipe to use (see `mqspec recipes`)
    #[arg(long, default_value = DEFAULT_RECIPE)]
    pub recipe: String,

    /// Target region
    #[arg(long, env = "MQSPEC_REGION")]
    pub region: Option<String>,

    /// Credential profile from the shared AWS config
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Key-pair file for the cluster nodes; must be readable
    #[arg(long, env = "MQSPEC_KEY_PAIR")]
    pub key_pair: PathBuf,

    /// Read role and policy templates from this directory instead of the built-in set
    #[arg(long, env = "MQSPEC_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Leave created resources in place if the run fails
    #[arg(long)]
    pub keep_on_failure: bool,

    /// Run against an in-memory control plane instead of AWS
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Settings for one run after flags, environment and config file are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Desired cluster
    pub spec: ClusterSpec,
    /// Recipe name
    pub recipe: String,
    /// Key-pair file
    pub key_pair: PathBuf,
    /// Template directory, if not using the built-in templates
    pub templates_dir: Option<PathBuf>,
    /// Leave created resources in place on failure
    pub keep_on_failure: bool,
}

impl ProvisionSettings {
    /// Merge command line (flags and env) over the config file over defaults
    pub fn resolve(args: &ProvisionArgs, file: &MqspecConfig) -> Self {
        let spec = ClusterSpec {
            name: args
                .cluster
                .clone()
                .or_else(|| file.cluster.clone())
                .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string()),
            instances: args.instances,
            storage_gib: args.storage_gib,
            region: args
                .region
                .clone()
                .or_else(|| file.region.clone())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            profile: args.profile.clone().or_else(|| file.profile.clone()),
        };

        Self {
            spec,
            recipe: args.recipe.clone(),
            key_pair: args.key_pair.clone(),
            templates_dir: args
                .templates_dir
                .clone()
                .or_else(|| file.templates_dir.clone()),
            keep_on_failure: args.keep_on_failure || file.keep_on_failure,
        }
    }
}

/// Run `mqspec provision`
pub async fn run(args: ProvisionArgs) -> Result<()> {
    let file = load_config()?;
    let settings = ProvisionSettings::resolve(&args, &file);
    check_preconditions(&settings)?;

    let control_plane: Arc<dyn ControlPlane> = if args.dry_run {
        info!("dry run, using in-memory control plane");
        Arc::new(InMemoryControlPlane::new())
    } else {
        Arc::new(
            AwsControlPlane::connect(&settings.spec.region, settings.spec.profile.as_deref())
                .await,
        )
    };

    let report = provision(&settings, control_plane).await?;

    let rendered = render_report(&report, args.output)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Check the key pair and the cluster spec.
///
/// Nothing here touches the control plane, so a failure leaves no trace.
pub fn check_preconditions(settings: &ProvisionSettings) -> Result<KeyPair> {
    let key_pair = load_key_pair(&settings.key_pair)?;
    settings.spec.validate()?;
    Ok(key_pair)
}

/// Check preconditions and run the orchestrator against `control_plane`.
///
/// The key pair and the cluster spec are both checked before the first
/// remote call.
pub async fn provision(
    settings: &ProvisionSettings,
    control_plane: Arc<dyn ControlPlane>,
) -> Result<ProvisionReport> {
    let key_pair = check_preconditions(settings)?;

    info!(
        cluster = %settings.spec.name,
        region = %settings.spec.region,
        instances = settings.spec.instances,
        storage_gib = settings.spec.storage_gib,
        key_pair = %key_pair.name,
        "provisioning cluster"
    );

    let documents: Arc<dyn DocumentStore> = match &settings.templates_dir {
        Some(dir) => {
            let store = DirectoryDocuments::new(dir);
            info!(templates_dir = %store.root().display(), "reading templates from directory");
            Arc::new(store)
        }
        None => Arc::new(EmbeddedDocuments),
    };

    let orchestrator = Orchestrator::new(
        control_plane,
        documents,
        recipe_by_name(&settings.recipe),
        OrchestratorConfig {
            readiness: RetryConfig::default(),
            keep_on_failure: settings.keep_on_failure,
        },
    );

    Ok(orchestrator.run(&settings.spec).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use std::path::Path;

    fn parse(args: &[&str]) -> ProvisionArgs {
        let mut argv = vec!["mqspec", "provision"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Provision(args) => args,
            other => panic!("expected provision, got {:?}", other),
        }
    }

    fn settings_with_key(dir: &Path, name: &str) -> ProvisionSettings {
        let key = dir.join("demo.pem");
        std::fs::write(&key, "key material").unwrap();
        ProvisionSettings {
            spec: ClusterSpec::named(name),
            recipe: DEFAULT_RECIPE.to_string(),
            key_pair: key,
            templates_dir: None,
            keep_on_failure: false,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let args = parse(&[
            "--key-pair",
            "k.pem",
            "--cluster",
            "from-flag",
            "--region",
            "ap-south-1",
        ]);
        let file = MqspecConfig {
            cluster: Some("from-file".to_string()),
            region: Some("eu-west-1".to_string()),
            keep_on_failure: true,
            ..Default::default()
        };

        let settings = ProvisionSettings::resolve(&args, &file);
        assert_eq!(settings.spec.name, "from-flag");
        assert_eq!(settings.spec.region, "ap-south-1");
        assert!(settings.keep_on_failure);
    }

    #[test]
    fn config_file_fills_missing_flags() {
        let args = parse(&["--key-pair", "k.pem", "--cluster", "c", "--region", "r"]);
        let file = MqspecConfig {
            templates_dir: Some(PathBuf::from("/etc/mqspec/templates")),
            ..Default::default()
        };

        let settings = ProvisionSettings::resolve(&args, &file);
        assert_eq!(
            settings.templates_dir.as_deref(),
            Some(Path::new("/etc/mqspec/templates"))
        );
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let args = parse(&["--key-pair", "k.pem", "--cluster", "c", "--region", "us-west-1"]);
        let settings = ProvisionSettings::resolve(&args, &MqspecConfig::default());
        assert_eq!(settings.spec.instances, 3);
        assert_eq!(settings.spec.storage_gib, 10);
        assert_eq!(settings.recipe, "recipe1");
        assert!(!settings.keep_on_failure);
    }

    #[test]
    fn sizing_flags_are_parsed() {
        let args = parse(&["--key-pair", "k.pem", "--instances", "5", "--storage", "50"]);
        assert_eq!(args.instances, 5);
        assert_eq!(args.storage_gib, 50);
    }

    #[tokio::test]
    async fn unreadable_key_pair_makes_no_remote_calls() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ProvisionSettings {
            key_pair: dir.path().join("missing.pem"),
            ..settings_with_key(dir.path(), "demo")
        };
        let cp = Arc::new(InMemoryControlPlane::new());

        let err = provision(&settings, cp.clone()).await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(cp.calls().is_empty());
    }

    #[test]
    fn preconditions_reject_unreadable_key_pair() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ProvisionSettings {
            key_pair: dir.path().join("missing.pem"),
            ..settings_with_key(dir.path(), "demo")
        };

        let err = check_preconditions(&settings).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("missing.pem"));
    }

    #[test]
    fn preconditions_reject_invalid_cluster_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_preconditions(&settings_with_key(dir.path(), "-bad")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn preconditions_return_key_pair() {
        let dir = tempfile::tempdir().unwrap();
        let key = check_preconditions(&settings_with_key(dir.path(), "demo")).unwrap();
        assert_eq!(key.name, "demo");
    }

    #[tokio::test]
    async fn run_rejects_unreadable_key_pair_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");
        let args = parse(&[
            "--key-pair",
            missing.to_str().unwrap(),
            "--cluster",
            "demo",
            "--region",
            "us-west-1",
        ]);

        let err = run(args).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("missing.pem"));
    }

    #[tokio::test]
    async fn invalid_cluster_name_makes_no_remote_calls() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_with_key(dir.path(), "-bad");
        let cp = Arc::new(InMemoryControlPlane::new());

        let err = provision(&settings, cp.clone()).await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(cp.calls().is_empty());
    }

    #[tokio::test]
    async fn dry_run_provisions_demo() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_with_key(dir.path(), "demo");
        let cp = Arc::new(InMemoryControlPlane::new());

        let report = provision(&settings, cp.clone()).await.unwrap();

        assert!(report.created);
        assert_eq!(report.access.unwrap().role_name, "demo");
        assert_eq!(cp.inventory().vpcs.len(), 1);
    }

    #[tokio::test]
    async fn missing_template_dir_file_fails_before_iam() {
        let dir = tempfile::tempdir().unwrap();
        let templates = tempfile::tempdir().unwrap();
        let settings = ProvisionSettings {
            templates_dir: Some(templates.path().to_path_buf()),
            ..settings_with_key(dir.path(), "demo")
        };
        let cp = Arc::new(InMemoryControlPlane::new());

        let err = provision(&settings, cp.clone()).await.unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("ecs-role.json"));
        assert_eq!(cp.call_count("CreateRole"), 0);
        // The run is rolled back, cluster included
        assert!(cp.inventory().clusters.is_empty());
    }
}
