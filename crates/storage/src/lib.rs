use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod ids;
pub mod memory;
pub mod sqlite;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::{EntryKey, MAX_SCOPE_ID_LEN, OwnerScope};
pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;
pub use types::KvRecord;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key-value slots scoped per owner. Owners never see each other's entries.
pub trait KvStore: Send + Sync {
    fn get_record<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<Option<KvRecord>>>;

    /// Writes `value`, replacing any previous value under the same owner and key.
    fn set<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
        value: String,
    ) -> BoxFuture<'a, StorageResult<()>>;

    /// Returns true when an entry existed.
    fn delete<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<bool>>;

    fn get<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<Option<String>>> {
        Box::pin(async move {
            let record = self.get_record(owner, key).await?;
            Ok(record.map(|record| record.value))
        })
    }
}
