//! Durable role configuration: the canonical codec and the storage it is
//! written to.

pub mod codec;
pub mod file;

pub use codec::{digest, DecodedConfiguration, DroppedPermission, CURRENT_VERSION};
pub use file::{ConfigFile, ConfigStorage, LoadFallback, LoadOutcome};
