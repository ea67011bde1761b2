//! Role and policy document templates
//!
//! Documents are opaque text: they are handed to the control plane as-is and
//! never parsed here. The built-in set is compiled into the binary; a
//! directory on disk can replace it.

use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

use mqspec_common::{Error, Result};

/// Trust document for the cluster role
pub const ROLE_TEMPLATE: &str = "ecs-role.json";

/// Permission document for the cluster policy
pub const POLICY_TEMPLATE: &str = "ecs-policy.json";

const EMBEDDED: &[(&str, &str)] = &[
    (ROLE_TEMPLATE, include_str!("../templates/ecs-role.json")),
    (POLICY_TEMPLATE, include_str!("../templates/ecs-policy.json")),
];

/// Resolves a template name to its text content
#[cfg_attr(test, automock)]
pub trait DocumentStore: Send + Sync {
    /// Read the named template
    fn read(&self, name: &str) -> Result<String>;
}

/// Templates shipped inside the binary
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedDocuments;

impl DocumentStore for EmbeddedDocuments {
    fn read(&self, name: &str) -> Result<String> {
        EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, content)| content.to_string())
            .ok_or_else(|| Error::template_read(name, "no built-in template with this name"))
    }
}

/// Templates read from a directory at runtime
#[derive(Clone, Debug)]
pub struct DirectoryDocuments {
    root: PathBuf,
}

impl DirectoryDocuments {
    /// Read templates from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory templates are read from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentStore for DirectoryDocuments {
    fn read(&self, name: &str) -> Result<String> {
        // Names are flat file names; anything with a separator is refused
        if name.contains(['/', '\\']) || name == ".." {
            return Err(Error::template_read(name, "invalid template name"));
        }
        let path = self.root.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::template_read(name, format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_are_available() {
        let store = EmbeddedDocuments;
        let role = store.read(ROLE_TEMPLATE).unwrap();
        assert!(role.contains("sts:AssumeRole"));
        let policy = store.read(POLICY_TEMPLATE).unwrap();
        assert!(policy.contains("ecs:RegisterContainerInstance"));
    }

    #[test]
    fn unknown_embedded_template_is_template_error() {
        let err = EmbeddedDocuments.read("missing.json").unwrap_err();
        assert!(matches!(
            err,
            Error::TemplateRead { ref template, .. } if template == "missing.json"
        ));
    }

    #[test]
    fn directory_store_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ROLE_TEMPLATE), "{\"custom\":true}").unwrap();

        let store = DirectoryDocuments::new(dir.path());
        assert_eq!(store.read(ROLE_TEMPLATE).unwrap(), "{\"custom\":true}");
        assert_eq!(store.root(), dir.path());
    }

    #[test]
    fn directory_store_missing_file_names_template() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryDocuments::new(dir.path())
            .read(POLICY_TEMPLATE)
            .unwrap_err();
        match err {
            Error::TemplateRead { template, .. } => assert_eq!(template, POLICY_TEMPLATE),
            other => panic!("expected TemplateRead, got {:?}", other),
        }
    }

    #[test]
    fn directory_store_refuses_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryDocuments::new(dir.path())
            .read("../etc/passwd")
            .is_err());
    }
}
