//! Resource management
//!
//! The resource-loader seam the prefab machinery depends on: prefabs are
//! resources identified by UUID, lookups return a handle that may be
//! unloaded, and unused resources can be evicted in one sweep.

pub mod resource_manager;

pub use resource_manager::{ResourceError, ResourceHandle, ResourceManager};
