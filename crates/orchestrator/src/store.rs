//! Durable cycle records keyed by cycle id.
//!
//! File layout of [`JsonCycleStore`]:
//! ```text
//! <root>/
//! └── cycles/
//!     ├── <cycle-id>.json
//!     └── ...
//! ```

use async_trait::async_trait;
use pdca_core::{CycleState, PdcaStatus};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

const CYCLES_DIR: &str = "cycles";

#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Write the whole state, replacing any earlier record for the same id.
    async fn save(&self, state: &CycleState) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<CycleState>>;

    /// Every stored cycle, oldest first.
    async fn list(&self) -> Result<Vec<CycleState>>;

    async fn list_by_status(&self, status: PdcaStatus) -> Result<Vec<CycleState>> {
        let mut cycles = self.list().await?;
        cycles.retain(|c| c.status() == status);
        Ok(cycles)
    }

    /// Cycles whose `previous_cycle_id` is `id`, oldest first.
    async fn continuations_of(&self, id: Uuid) -> Result<Vec<CycleState>> {
        let mut cycles = self.list().await?;
        cycles.retain(|c| c.previous_cycle_id == Some(id));
        Ok(cycles)
    }
}

/// One pretty-printed JSON file per cycle.
#[derive(Debug, Clone)]
pub struct JsonCycleStore {
    root: PathBuf,
}

impl JsonCycleStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn cycles_dir(&self) -> PathBuf {
        self.root.join(CYCLES_DIR)
    }

    fn cycle_path(&self, id: Uuid) -> PathBuf {
        self.cycles_dir().join(format!("{}.json", id))
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        let dir = self.cycles_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            debug!("Created cycles directory: {}", dir.display());
        }
        Ok(())
    }
}

#[async_trait]
impl CycleStore for JsonCycleStore {
    async fn save(&self, state: &CycleState) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.cycle_path(state.id);
        let content = serde_json::to_string_pretty(state).map_err(|e| {
            OrchestratorError::Serialization(format!("Failed to serialize cycle: {}", e))
        })?;

        // Write then rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            cycle_id = %state.id,
            status = %state.status(),
            path = %path.display(),
            "Cycle saved"
        );
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<CycleState>> {
        let path = self.cycle_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let state = serde_json::from_str(&content).map_err(|e| {
            error!("Failed to parse cycle JSON {}: {}", path.display(), e);
            OrchestratorError::Serialization(format!("Failed to parse cycle {}: {}", id, e))
        })?;
        Ok(Some(state))
    }

    async fn list(&self) -> Result<Vec<CycleState>> {
        let dir = self.cycles_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut cycles = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<CycleState>(&content) {
                Ok(state) => cycles.push(state),
                Err(e) => warn!("Skipping unreadable cycle file {}: {}", path.display(), e),
            }
        }

        cycles.sort_by_key(|c| c.created_at);
        Ok(cycles)
    }
}

#[async_trait]
impl CycleStore for db::CycleRepository {
    async fn save(&self, state: &CycleState) -> Result<()> {
        Ok(self.upsert(state).await?)
    }

    async fn load(&self, id: Uuid) -> Result<Option<CycleState>> {
        Ok(self.find_by_id(id).await?)
    }

    async fn list(&self) -> Result<Vec<CycleState>> {
        Ok(self.find_all().await?)
    }

    async fn list_by_status(&self, status: PdcaStatus) -> Result<Vec<CycleState>> {
        Ok(self.find_by_status(status).await?)
    }

    async fn continuations_of(&self, id: Uuid) -> Result<Vec<CycleState>> {
        Ok(self.find_continuations(id).await?)
    }
}

/// Load a cycle or fail with `NotFound`.
pub async fn load_required(store: &dyn CycleStore, id: Uuid) -> Result<CycleState> {
    store
        .load(id)
        .await?
        .ok_or_else(|| OrchestratorError::NotFound(format!("cycle {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pdca_core::PdcaPhase;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonCycleStore::new(dir.path());
        let state = fixtures::state_after(PdcaPhase::Do);

        store.save(&state).await.unwrap();
        assert!(dir
            .path()
            .join("cycles")
            .join(format!("{}.json", state.id))
            .exists());

        let loaded = store.load(state.id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = JsonCycleStore::new(dir.path());
        let mut state = fixtures::state();
        store.save(&state).await.unwrap();

        state.start().unwrap();
        store.save(&state).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status(), PdcaStatus::InProgress);
    }

    #[tokio::test]
    async fn test_list_orders_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        let store = JsonCycleStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());

        let first = fixtures::state();
        let mut second = fixtures::state().with_previous_cycle(first.id);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();
        std::fs::write(dir.path().join("cycles").join("junk.json"), "{").unwrap();
        std::fs::write(dir.path().join("cycles").join("notes.txt"), "hi").unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let store = JsonCycleStore::new(dir.path());
        let id = Uuid::new_v4();
        assert!(store.load(id).await.unwrap().is_none());
        assert!(matches!(
            load_required(&store, id).await,
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repository_as_store() {
        let pool = db::create_pool_with("sqlite::memory:", 1).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let store: Box<dyn CycleStore> = Box::new(db::CycleRepository::new(pool));

        let state = fixtures::state_after(PdcaPhase::Plan);
        store.save(&state).await.unwrap();
        assert_eq!(store.load(state.id).await.unwrap(), Some(state.clone()));

        let next = fixtures::state().with_previous_cycle(state.id);
        store.save(&next).await.unwrap();
        assert_eq!(store.list_by_status(PdcaStatus::Pending).await.unwrap(), vec![next.clone()]);
        assert_eq!(store.continuations_of(state.id).await.unwrap(), vec![next]);
        assert!(store.continuations_of(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_filters() {
        let dir = TempDir::new().unwrap();
        let store = JsonCycleStore::new(dir.path());
        let first = fixtures::state_after(PdcaPhase::Act);
        let mut second = fixtures::state().with_previous_cycle(first.id);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let unrelated = fixtures::state();
        for state in [&first, &second, &unrelated] {
            store.save(state).await.unwrap();
        }

        let running = store.list_by_status(PdcaStatus::InProgress).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, first.id);

        let next = store.continuations_of(first.id).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, second.id);
    }
}
