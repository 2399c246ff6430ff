use std::collections::BTreeMap;

use tokio::sync::RwLock;

use super::error::StorageResult;
use super::ids::{EntryKey, OwnerScope};
use super::types::{KvRecord, unix_timestamp_seconds};
use super::{BoxFuture, KvStore};

/// Process-local store, lost on exit. Used for `--ephemeral` runs and tests.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<(OwnerScope, EntryKey), KvRecord>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get_record<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<Option<KvRecord>>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            Ok(entries.get(&(owner.clone(), key.clone())).cloned())
        })
    }

    fn set<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
        value: String,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let now = unix_timestamp_seconds();
            let mut entries = self.entries.write().await;
            entries
                .entry((owner.clone(), key.clone()))
                .and_modify(|record| {
                    record.value = value.clone();
                    record.updated_at_unix_seconds = now;
                })
                .or_insert_with(|| KvRecord {
                    owner: owner.clone(),
                    key: key.clone(),
                    value: value.clone(),
                    created_at_unix_seconds: now,
                    updated_at_unix_seconds: now,
                });
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            Ok(entries.remove(&(owner.clone(), key.clone())).is_some())
        })
    }
}
