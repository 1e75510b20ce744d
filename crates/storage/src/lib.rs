#![forbid(unsafe_code)]

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::{Fault, InMemoryRepository};
pub use repository::{
    CatalogRepository, ModuleProgressRecord, ProfileRepository, ProgressStore, ProgressUnit,
    SoftStep, Storage, StorageError,
};
pub use sqlite::{PoolConfig, SqliteInitError, SqliteRepository};
