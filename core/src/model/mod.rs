//! Durable and in-flight data types of spec §3.

pub mod check_history;
pub mod compose_backup;
pub mod config_snapshot;
pub mod container;
pub mod decision;
pub mod image_ref;
pub mod operation;
pub mod policy;
pub mod script_assignment;
pub mod version_cache;

pub use check_history::CheckHistoryEntry;
pub use compose_backup::ComposeBackup;
pub use config_snapshot::{ConfigSnapshot, RollbackPolicy};
pub use container::{Container, ContainerState, HealthStatus, MountInfo};
pub use decision::{DecisionStatus, UpdateDecision};
pub use image_ref::ImageRef;
pub use operation::{
  BatchDetail, BatchGroupId, Operation, OperationId, OperationStatus,
  OperationType,
};
pub use policy::Policy;
pub use script_assignment::ScriptAssignment;
pub use version_cache::VersionCacheEntry;
