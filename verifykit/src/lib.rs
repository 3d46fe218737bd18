//! Umbrella crate re-exporting the VerifyKit core API.

pub use verifykit_core::*;

/// Convenience result alias for VerifyKit operations.
pub type VerifyKitResult<T, E = VerifyError> = std::result::Result<T, E>;
