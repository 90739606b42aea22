//! Core domain types and traits for the AnsibleRun controller.
//!
//! This crate contains:
//! - Resource identifiers and the AnsibleRun / ProviderConfig model
//! - Collaborator traits (control plane, usage tracking, secrets)
//! - The filesystem capability and its in-memory / fault-injecting doubles
//! - Generic credential extraction

pub mod control_plane;
pub mod credentials;
pub mod error;
pub mod fs;
pub mod id;
pub mod resource;
pub mod secret;

pub use control_plane::{ControlPlane, TrackerFn, UsageTracker};
pub use error::{Error, Result};
pub use id::Uid;
pub use resource::{AnsibleRun, Managed, ProviderConfig};
