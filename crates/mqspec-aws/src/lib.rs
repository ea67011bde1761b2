//! AWS control plane for mqspec
//!
//! Implements `mqspec_provision::ControlPlane` on top of the ECS, EC2 and IAM
//! SDK clients. Credentials come from the SDK's default provider chain,
//! optionally narrowed to a named profile.

#![deny(missing_docs)]

pub mod client;
pub mod config;

pub use client::AwsControlPlane;
pub use config::load_sdk_config;
