#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Core lifecycle logic for VerifyKit address verification.
//!
//! The crate supervises one background verification session per location
//! identifier: it builds the authenticated process context, gates session
//! starts on device capabilities, registers a geofence with the host's
//! tracking engine, keeps sessions alive across process restarts and
//! push-triggered wake-ups, and tears them down cleanly.
//!
//! Everything platform-specific (the geofence engine, permission surfaces,
//! durable key-value storage, the foreground indicator) is supplied by the
//! application shell through foreign-implemented traits.

use strum::{Display, EnumString};

/// Deployment environment the SDK reports against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Test tenancy; no live verification outcomes.
    Sandbox,
    /// Live tenancy.
    Prod,
    /// Internal development tenancy.
    Dev,
}

mod auth;
pub use auth::*;

mod capability;
pub use capability::*;

mod config;
pub use config::*;

mod engine;
pub use engine::*;

mod error;
pub use error::*;

mod foreground;
pub use foreground::*;

pub mod logger;

mod session;
pub use session::*;

mod store;
pub use store::*;

mod verifier;
pub use verifier::*;

mod wake;

uniffi::setup_scaffolding!("verifykit_core");
