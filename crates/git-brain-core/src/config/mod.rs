//! Descriptor parsing: the shared `ini` grammar plus the brain and consumer
//! descriptor schemas built on top of it.

pub mod brain;
pub mod consumer;
pub mod ini;

pub use brain::{BrainDescriptor, ExportPermission, UpdatePolicy};
pub use consumer::{BrainEntry, ConflictStrategy, ConsumerDescriptor, Mapping, SyncPolicy};
