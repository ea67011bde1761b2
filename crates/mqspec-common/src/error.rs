//! Error types for mqspec provisioning
//!
//! Every variant carries enough context (operation, resource, template name)
//! for the failure to be actionable without re-running with debug logs.

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unreadable required input. Raised before any remote call.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's missing or invalid
        message: String,
    },

    /// A remote control-plane operation failed
    #[error("control plane error [{operation}] on {resource}: {message}")]
    ControlPlane {
        /// Remote operation that failed (e.g. "CreateVpc")
        operation: String,
        /// Resource the operation targeted (cluster name, VPC id, ...)
        resource: String,
        /// Description reported by the control plane
        message: String,
    },

    /// A role or policy document template could not be read
    #[error("failed to read template {template}: {message}")]
    TemplateRead {
        /// Name of the template (e.g. "ecs-role.json")
        template: String,
        /// Description of what failed
        message: String,
    },

    /// A resource never became visible after creation
    #[error("{resource} not ready after {attempts} attempts")]
    PropagationTimeout {
        /// Resource that was being waited on
        resource: String,
        /// Number of reads performed before giving up
        attempts: u32,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a control plane error for an operation on a resource
    pub fn control_plane(
        operation: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ControlPlane {
            operation: operation.into(),
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a template read error
    pub fn template_read(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateRead {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before any remote call could happen
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// The failing control-plane operation, if this is a control-plane error
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::ControlPlane { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
