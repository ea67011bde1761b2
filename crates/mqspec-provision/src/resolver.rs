//! Find-or-create resolution of named resources.

use std::future::Future;

use tracing::{debug, info};

use mqspec_common::Result;

/// Outcome of resolving a resource by name
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The resource already existed and was returned unchanged
    Existing(T),
    /// The resource did not exist and was created
    Created(T),
}

impl<T> Resolved<T> {
    /// Whether this run created the resource
    pub fn was_created(&self) -> bool {
        matches!(self, Resolved::Created(_))
    }

    /// Borrow the resource regardless of how it was obtained
    pub fn get(&self) -> &T {
        match self {
            Resolved::Existing(value) | Resolved::Created(value) => value,
        }
    }

    /// Take the resource regardless of how it was obtained
    pub fn into_inner(self) -> T {
        match self {
            Resolved::Existing(value) | Resolved::Created(value) => value,
        }
    }
}

/// Return the resource `lookup` finds, or else the one `create` makes.
///
/// `kind` and `name` only label log lines.
///
/// Existence alone is sufficient: a found resource is not inspected,
/// tagged or corrected. `create` is only called on a lookup miss, and
/// errors from either call propagate unchanged.
pub async fn resolve<T, L, LF, C, CF>(
    kind: &str,
    name: &str,
    lookup: L,
    create: C,
) -> Result<Resolved<T>>
where
    L: FnOnce() -> LF,
    LF: Future<Output = Result<Option<T>>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T>>,
{
    debug!(kind = %kind, name = %name, "looking up resource");

    if let Some(existing) = lookup().await? {
        debug!(kind = %kind, name = %name, "resource exists");
        return Ok(Resolved::Existing(existing));
    }

    info!(kind = %kind, name = %name, "creating resource");
    let created = create().await?;
    Ok(Resolved::Created(created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqspec_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_existing_without_creating() {
        let creates = AtomicU32::new(0);
        let resolved = resolve(
            "cluster",
            "demo",
            || async { Ok(Some("found")) },
            || async {
                creates.fetch_add(1, Ordering::SeqCst);
                Ok("made")
            },
        )
        .await
        .unwrap();

        assert_eq!(resolved, Resolved::Existing("found"));
        assert!(!resolved.was_created());
        assert_eq!(creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn creates_on_miss() {
        let resolved = resolve(
            "role",
            "demo",
            || async { Ok(None) },
            || async { Ok("made") },
        )
        .await
        .unwrap();

        assert!(resolved.was_created());
        assert_eq!(*resolved.get(), "made");
        assert_eq!(resolved.into_inner(), "made");
    }

    #[tokio::test]
    async fn lookup_error_skips_create() {
        let creates = AtomicU32::new(0);
        let result: Result<Resolved<&str>> = resolve(
            "cluster",
            "demo",
            || async {
                Err(Error::control_plane(
                    "DescribeClusters",
                    "demo",
                    "access denied",
                ))
            },
            || async {
                creates.fetch_add(1, Ordering::SeqCst);
                Ok("made")
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation(), Some("DescribeClusters"));
        assert_eq!(creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_error_propagates_unchanged() {
        let result: Result<Resolved<&str>> = resolve(
            "cluster",
            "demo",
            || async { Ok(None) },
            || async { Err(Error::control_plane("CreateCluster", "demo", "quota")) },
        )
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "control plane error [CreateCluster] on demo: quota"
        );
    }
}
