pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::core::types::TitleRecord;
use crate::error::Result;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

/// Mutation applied to a record while the store holds it exclusively.
/// Identity fields (`tmdb_id`, `created_at`) are never persisted from it and
/// `last_updated_at` is always bumped by the store.
pub type TitleMutator = Box<dyn FnOnce(&mut TitleRecord) + Send>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a placeholder record. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, tmdb_id: i64) -> Result<TitleRecord>;

    /// Fails with `NotFound` if the id is unknown.
    async fn get(&self, tmdb_id: i64) -> Result<TitleRecord>;

    /// Read-modify-write of a single record, serialized against every other
    /// update of the same id. Fails with `NotFound` if the id is unknown.
    async fn update(&self, tmdb_id: i64, mutator: TitleMutator) -> Result<TitleRecord>;

    /// All records, highest trend score first.
    async fn list(&self) -> Result<Vec<TitleRecord>>;
}
