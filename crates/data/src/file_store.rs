//! JSON document store on the local filesystem.
//!
//! The whole state is rewritten on every mutation: serialized to a sibling
//! temporary file, flushed, then renamed over the target so a crash never
//! leaves a half-written document behind.

use crate::store::{PersistedState, StateStore, StoreError};
use async_trait::async_trait;
use ftrade_domain::entities::{HaltState, LedgerEntry, Order, OrderId, Position};
use ftrade_domain::value_objects::Symbol;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct FileStateStore {
    path: PathBuf,
    state: Mutex<Option<PersistedState>>,
}

impl FileStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_from_disk(&self) -> Result<PersistedState, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file, starting empty");
                Ok(PersistedState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_to_disk(&self, state: &PersistedState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "State written");
        Ok(())
    }

    /// Runs `f` against the cached state and writes the result through.
    async fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut PersistedState),
    {
        let mut guard = self.state.lock().await;
        let mut next = match guard.as_ref() {
            Some(state) => state.clone(),
            None => self.read_from_disk().await?,
        };
        f(&mut next);
        self.write_to_disk(&next).await?;
        *guard = Some(next);
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        let mut guard = self.state.lock().await;
        let state = self.read_from_disk().await?;
        *guard = Some(state.clone());
        Ok(state)
    }

    async fn upsert_position(&self, position: &Position) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.positions.insert(position.symbol.clone(), position.clone());
        })
        .await
    }

    async fn remove_position(&self, symbol: &Symbol) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.positions.remove(symbol);
        })
        .await
    }

    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.mutate(|s| s.put_order(order)).await
    }

    async fn remove_order(&self, id: OrderId) -> Result<(), StoreError> {
        self.mutate(|s| s.drop_order(id)).await
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.mutate(|s| s.ledger.push(entry.clone())).await
    }

    async fn save_halts(&self, halts: &HaltState) -> Result<(), StoreError> {
        self.mutate(|s| s.halts = halts.clone()).await
    }
}
