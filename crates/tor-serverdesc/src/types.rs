//! Various types that can occur in parsed server descriptors.

pub mod family;
pub(crate) mod misc;
pub mod policy;
pub mod protocols;
pub mod version;

pub use misc::RsaIdentity;
