use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{RowStore, StoreError, HEADER};
use crate::models::WorkLogRow;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store. `store` names the workbook; tabs are rows of
/// `worklog.tabs` keyed by (store, name).
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
    store: String,
}

impl PgRowStore {
    pub fn new(pool: PgPool, store: impl Into<String>) -> Self {
        Self {
            pool,
            store: store.into(),
        }
    }

    async fn tab_exists(&self, member: &str) -> Result<bool, StoreError> {
        let found = sqlx::query("SELECT 1 FROM worklog.tabs WHERE store = $1 AND name = $2")
            .bind(&self.store)
            .bind(member)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn fetch(&self, member: &str) -> Result<Vec<WorkLogRow>, StoreError> {
        if !self.tab_exists(member).await? {
            return Err(StoreError::TabNotFound(member.to_string()));
        }

        let records = sqlx::query(
            r#"
            SELECT day, date_text, task, notes, reference
            FROM worklog.rows
            WHERE store = $1 AND tab = $2
            ORDER BY position
            "#,
        )
        .bind(&self.store)
        .bind(member)
        .fetch_all(&self.pool)
        .await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(WorkLogRow {
                member: member.to_string(),
                day: record.get("day"),
                date: record.get("date_text"),
                task: record.get("task"),
                notes: record.get("notes"),
                reference: record.get("reference"),
            });
        }

        Ok(rows)
    }

    async fn create_tab(&self, member: &str) -> Result<(), StoreError> {
        let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO worklog.tabs (store, name, header)
            VALUES ($1, $2, $3)
            ON CONFLICT (store, name) DO NOTHING
            "#,
        )
        .bind(&self.store)
        .bind(member)
        .bind(header)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_row(&self, member: &str, row: &WorkLogRow) -> Result<(), StoreError> {
        if !self.tab_exists(member).await? {
            return Err(StoreError::TabNotFound(member.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO worklog.rows
            (id, store, tab, day, date_text, task, notes, reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.store)
        .bind(member)
        .bind(&row.day)
        .bind(&row.date)
        .bind(&row.task)
        .bind(&row.notes)
        .bind(&row.reference)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
