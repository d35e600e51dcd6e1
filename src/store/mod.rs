use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::WorkLogRow;

pub mod csv_dir;
pub mod pg;

/// Column order of every tab.
pub const HEADER: [&str; 5] = ["Day", "Date", "Task", "Notes", "Referring Docs"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tab not found: {0}")]
    TabNotFound(String),

    #[error("invalid tab name: {0:?}")]
    InvalidTabName(String),

    #[error("tab {tab} has unexpected header {found:?}")]
    Header { tab: String, found: Vec<String> },

    #[error("tab {tab} line {line} has {fields} fields")]
    Record { tab: String, line: u64, fields: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    CreatedTab,
}

/// A named store holding one append-only tab per team member.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All data rows of a member's tab, in append order, header excluded.
    async fn fetch(&self, member: &str) -> Result<Vec<WorkLogRow>, StoreError>;

    /// Creates the tab with [`HEADER`]. A no-op when it already exists.
    async fn create_tab(&self, member: &str) -> Result<(), StoreError>;

    /// Appends to an existing tab; `TabNotFound` when the tab is missing.
    async fn append_row(&self, member: &str, row: &WorkLogRow) -> Result<(), StoreError>;

    async fn append(&self, member: &str, row: &WorkLogRow) -> Result<AppendOutcome, StoreError> {
        match self.append_row(member, row).await {
            Ok(()) => Ok(AppendOutcome::Appended),
            Err(StoreError::TabNotFound(_)) => {
                self.create_tab(member).await?;
                self.append_row(member, row).await?;
                Ok(AppendOutcome::CreatedTab)
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemberRows {
    pub member: String,
    pub rows: Vec<WorkLogRow>,
}

/// Reads every roster member's tab. Missing tabs and read failures skip
/// that member only.
pub async fn fetch_team(store: &dyn RowStore, roster: &[String]) -> Vec<MemberRows> {
    let mut team = Vec::with_capacity(roster.len());

    for member in roster {
        match store.fetch(member).await {
            Ok(rows) => team.push(MemberRows {
                member: member.clone(),
                rows,
            }),
            Err(StoreError::TabNotFound(_)) => {
                debug!(member = %member, "no tab yet, skipping");
            }
            Err(err) => {
                warn!(member = %member, error = %err, "failed to read tab, skipping");
            }
        }
    }

    team
}

/// Appends rows from a CSV export of a tab. Returns the number appended.
pub async fn import_csv(
    store: &dyn RowStore,
    member: &str,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        #[serde(rename = "Day")]
        day: String,
        #[serde(rename = "Date")]
        date: String,
        #[serde(rename = "Task")]
        task: String,
        #[serde(rename = "Notes", default)]
        notes: String,
        #[serde(rename = "Referring Docs", default)]
        reference: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let row = WorkLogRow {
            member: member.to_string(),
            day: row.day,
            date: row.date,
            task: row.task,
            notes: row.notes,
            reference: row.reference,
        };
        store
            .append(member, &row)
            .await
            .with_context(|| format!("failed to append imported row for {member}"))?;
        inserted += 1;
    }

    Ok(inserted)
}
