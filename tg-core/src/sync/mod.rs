//! Hand-off between the live sensor model and the external state store

mod file_store;
mod memory;
mod publisher;
mod store;

pub use file_store::JsonFileStore;
pub use memory::MemoryStore;
pub use publisher::{blank_record, Publisher, SensorField, SensorUpdate, SyncBatch};
pub use store::{LockState, StateStore};
