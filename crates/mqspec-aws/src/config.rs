//! SDK configuration loading.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ecs::config::Region;
use tracing::debug;

/// Load shared SDK configuration for `region`, using `profile` from the
/// shared credentials file when given and the default chain otherwise.
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    debug!(region = %region, profile = ?profile, "loading aws configuration");

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn region_is_applied() {
        let config = load_sdk_config("eu-west-1", None).await;
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
