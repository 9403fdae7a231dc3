//! Backing CRUD services
//!
//! The service contracts the auto-cache decorators wrap, and in-memory
//! implementations of them.

mod memory;
mod traits;

pub use memory::{CrudMemory, ManyToOneMemory, ParentIdFn, SlaveToMasterMemory, StorageStats};
pub use traits::{Crud, CrudManyToOne, CrudSlaveToMaster};
