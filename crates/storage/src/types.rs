use super::ids::{EntryKey, OwnerScope};

/// One stored value together with its bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvRecord {
    pub owner: OwnerScope,
    pub key: EntryKey,
    pub value: String,
    pub created_at_unix_seconds: u64,
    pub updated_at_unix_seconds: u64,
}

pub(crate) fn unix_timestamp_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
