//! Connect/bootstrap pipeline for AnsibleRun resources.
//!
//! This crate provides:
//! - Per-run staging directories and atomic file writes
//! - Credential and git-credential materialization
//! - Playbook and galaxy requirements materialization
//! - The [`Connector`] that drives these steps in order and hands back a runner

pub mod connector;
pub mod credentials;
pub mod error;
pub mod playbook;
pub mod staging;

pub use connector::{Connector, ConnectorBuilder, External};
pub use error::{ConnectError, ConnectErrorKind};
pub use playbook::{HttpFetcher, PlaybookFetcher};
pub use staging::Staging;
