use crate::error::Result;
use crate::models::CycleRow;
use pdca_core::{CycleState, PdcaStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct CycleRepository {
    pool: SqlitePool,
}

impl CycleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the cycle, or overwrite the stored row with the same id.
    pub async fn upsert(&self, state: &CycleState) -> Result<()> {
        let row = CycleRow::try_from_state(state)?;

        sqlx::query(
            r#"
            INSERT INTO cycles (id, name, status, current_phase, state_json, previous_cycle_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                current_phase = excluded.current_phase,
                state_json = excluded.state_json,
                previous_cycle_id = excluded.previous_cycle_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.status)
        .bind(&row.current_phase)
        .bind(&row.state_json)
        .bind(&row.previous_cycle_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(cycle_id = %state.id, status = %state.status(), "Cycle saved");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CycleState>> {
        let row: Option<CycleRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, current_phase, state_json, previous_cycle_id, created_at, updated_at
            FROM cycles
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CycleRow::into_domain).transpose()
    }

    /// All cycles, oldest first.
    pub async fn find_all(&self) -> Result<Vec<CycleState>> {
        let rows: Vec<CycleRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, current_phase, state_json, previous_cycle_id, created_at, updated_at
            FROM cycles
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CycleRow::into_domain).collect()
    }

    pub async fn find_by_status(&self, status: PdcaStatus) -> Result<Vec<CycleState>> {
        let rows: Vec<CycleRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, current_phase, state_json, previous_cycle_id, created_at, updated_at
            FROM cycles
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CycleRow::into_domain).collect()
    }

    /// Cycles that were continued from `id`.
    pub async fn find_continuations(&self, id: Uuid) -> Result<Vec<CycleState>> {
        let rows: Vec<CycleRow> = sqlx::query_as(
            r#"
            SELECT id, name, status, current_phase, state_json, previous_cycle_id, created_at, updated_at
            FROM cycles
            WHERE previous_cycle_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CycleRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool_with, run_migrations};
    use std::collections::BTreeMap;

    async fn setup() -> CycleRepository {
        let pool = create_pool_with("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        CycleRepository::new(pool)
    }

    fn cycle(problem: &str) -> CycleState {
        CycleState::new(BTreeMap::from([(
            "problem".to_string(),
            problem.to_string(),
        )]))
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = setup().await;
        let state = cycle("Scrap rate too high");

        repo.upsert(&state).await.unwrap();
        let found = repo.find_by_id(state.id).await.unwrap().unwrap();
        assert_eq!(found, state);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let repo = setup().await;
        let mut state = cycle("Scrap rate too high");
        repo.upsert(&state).await.unwrap();

        state.start().unwrap();
        repo.upsert(&state).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status(), PdcaStatus::InProgress);
        assert_eq!(
            repo.find_by_status(PdcaStatus::InProgress).await.unwrap().len(),
            1
        );
        assert!(repo
            .find_by_status(PdcaStatus::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_continuations() {
        let repo = setup().await;
        let first = cycle("Queue times");
        let second = cycle("Queue times").with_previous_cycle(first.id);
        repo.upsert(&first).await.unwrap();
        repo.upsert(&second).await.unwrap();

        let next = repo.find_continuations(first.id).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, second.id);
    }

    #[tokio::test]
    async fn test_find_missing() {
        let repo = setup().await;
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
