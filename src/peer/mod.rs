//! Peer Module
//!
//! Client lifecycle: address allocation, configuration rendering, the
//! on-disk client store and the registry that keeps the store and the live
//! interface in lockstep.

mod allocator;
mod registry;
mod render;
mod store;

pub use allocator::{AddressPool, Allocation, FIRST_CLIENT_OCTET, LAST_CLIENT_OCTET, SERVER_OCTET};
pub use registry::{PeerRegistry, ProvisionedPeer, Reconciliation, ServerSettings};
pub use render::{parse, render, ArtifactParams, ParsedArtifact};
pub use store::{ClientStore, ARTIFACT_EXTENSION};

use crate::error::{Error, Result};

/// Longest accepted client name
pub const MAX_NAME_LEN: usize = 64;

/// Check that `name` can be used as a client file stem
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ValidationFailed("name is required".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::ValidationFailed(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    if name.starts_with('.') {
        return Err(Error::ValidationFailed("name cannot start with '.'".to_string()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(Error::ValidationFailed(format!(
            "name contains invalid character {:?}",
            c
        )));
    }
    Ok(())
}
