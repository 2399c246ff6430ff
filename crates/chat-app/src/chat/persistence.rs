use std::sync::Arc;

use gatito_storage::{EntryKey, KvStore, OwnerScope, StorageError};
use snafu::{ResultExt, Snafu};

use super::message::{History, Message};
use crate::auth::{AuthError, AuthService};

/// Key the conversation snapshot lives under, per user.
pub const DEFAULT_HISTORY_KEY: &str = "gatitoSentimentalChatHistory";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PersistenceError {
    #[snafu(display("history key '{key}' is invalid: {source}"))]
    InvalidKey {
        stage: &'static str,
        key: String,
        source: StorageError,
    },
    #[snafu(display("failed to resolve the signed-in user on `{stage}`: {source}"))]
    Identity {
        stage: &'static str,
        source: AuthError,
    },
    #[snafu(display("username cannot scope stored history on `{stage}`: {source}"))]
    OwnerScope {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to read stored history on `{stage}`: {source}"))]
    ReadSnapshot {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to write stored history on `{stage}`: {source}"))]
    WriteSnapshot {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("stored history is not a message list on `{stage}`: {source}"))]
    DecodeSnapshot {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode history on `{stage}`: {source}"))]
    EncodeSnapshot {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub fn encode_snapshot(history: &History) -> serde_json::Result<String> {
    serde_json::to_string(history.conversation())
}

pub fn decode_snapshot(raw: &str) -> serde_json::Result<Vec<Message>> {
    serde_json::from_str(raw)
}

/// Reads and writes the conversational part of the history for the signed-in user.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn KvStore>,
    auth: Arc<dyn AuthService>,
    key: EntryKey,
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn KvStore>,
        auth: Arc<dyn AuthService>,
        key: &str,
    ) -> PersistenceResult<Self> {
        let key = EntryKey::parse(key).context(InvalidKeySnafu {
            stage: "persistence-new",
            key: key.to_string(),
        })?;
        Ok(Self { store, auth, key })
    }

    /// Returns the stored snapshot, or `None` when anonymous, absent or unreadable.
    pub async fn load(&self) -> Option<Vec<Message>> {
        if !self.auth.is_signed_in() {
            return None;
        }

        match self.try_load().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::error!(error = %error, "failed to load chat history");
                None
            }
        }
    }

    async fn try_load(&self) -> PersistenceResult<Option<Vec<Message>>> {
        let owner = self.current_owner("load-resolve-owner").await?;
        let stored = self
            .store
            .get(&owner, &self.key)
            .await
            .context(ReadSnapshotSnafu {
                stage: "load-read-store",
            })?;

        let Some(raw) = stored.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(None);
        };

        let snapshot = decode_snapshot(&raw).context(DecodeSnapshotSnafu {
            stage: "load-decode-snapshot",
        })?;
        if snapshot.is_empty() {
            return Ok(None);
        }

        tracing::debug!(
            owner = %owner,
            message_count = snapshot.len(),
            "loaded chat history"
        );
        Ok(Some(snapshot))
    }

    /// Stores everything after the system instruction. A no-op when anonymous.
    pub async fn save(&self, history: &History) -> PersistenceResult<()> {
        if !self.auth.is_signed_in() {
            return Ok(());
        }

        let owner = self.current_owner("save-resolve-owner").await?;
        let encoded = encode_snapshot(history).context(EncodeSnapshotSnafu {
            stage: "save-encode-snapshot",
        })?;
        self.store
            .set(&owner, &self.key, encoded)
            .await
            .context(WriteSnapshotSnafu {
                stage: "save-write-store",
            })?;

        tracing::info!(
            owner = %owner,
            message_count = history.conversation().len(),
            "chat history saved"
        );
        Ok(())
    }

    async fn current_owner(&self, stage: &'static str) -> PersistenceResult<OwnerScope> {
        let profile = self.auth.user().await.context(IdentitySnafu { stage })?;
        OwnerScope::parse(&profile.username).context(OwnerScopeSnafu { stage })
    }
}
