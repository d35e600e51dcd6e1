use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{RowStore, StoreError, HEADER};
use crate::models::WorkLogRow;

/// Directory-backed store: `<base>/<store>/<member>.csv`, one file per tab.
#[derive(Debug, Clone)]
pub struct CsvDirStore {
    root: PathBuf,
}

impl CsvDirStore {
    pub fn new(base: impl AsRef<Path>, store: &str) -> Self {
        Self {
            root: base.as_ref().join(store),
        }
    }

    fn tab_path(&self, member: &str) -> Result<PathBuf, StoreError> {
        let trimmed = member.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('.')
            || trimmed.contains(['/', '\\'])
        {
            return Err(StoreError::InvalidTabName(member.to_string()));
        }
        Ok(self.root.join(format!("{trimmed}.csv")))
    }
}

fn check_header<R: Read>(
    member: &str,
    reader: &mut csv::Reader<R>,
) -> Result<(), StoreError> {
    let found: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if found.iter().map(String::as_str).ne(HEADER.iter().copied()) {
        return Err(StoreError::Header {
            tab: member.to_string(),
            found,
        });
    }
    Ok(())
}

/// Whether a non-empty file's last byte terminates a line.
fn ends_with_line_break(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(matches!(last[0], b'\n' | b'\r'))
}

#[async_trait]
impl RowStore for CsvDirStore {
    async fn fetch(&self, member: &str) -> Result<Vec<WorkLogRow>, StoreError> {
        let path = self.tab_path(member)?;
        if !path.exists() {
            return Err(StoreError::TabNotFound(member.to_string()));
        }
        if fs::metadata(&path)?.len() == 0 {
            return Ok(Vec::new());
        }

        // Short records are padded with blanks; long ones mean a damaged tab.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        check_header(member, &mut reader)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > HEADER.len() {
                return Err(StoreError::Record {
                    tab: member.to_string(),
                    line: record.position().map_or(0, |pos| pos.line()),
                    fields: record.len(),
                });
            }
            let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
            rows.push(WorkLogRow {
                member: member.to_string(),
                day: field(0),
                date: field(1),
                task: field(2),
                notes: field(3),
                reference: field(4),
            });
        }

        Ok(rows)
    }

    async fn create_tab(&self, member: &str) -> Result<(), StoreError> {
        let path = self.tab_path(member)?;
        if path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.root)?;
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(())
    }

    async fn append_row(&self, member: &str, row: &WorkLogRow) -> Result<(), StoreError> {
        let path = self.tab_path(member)?;
        if !path.exists() {
            return Err(StoreError::TabNotFound(member.to_string()));
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&path)?;
        let fresh = file.metadata()?.len() == 0;
        if !fresh {
            check_header(member, &mut csv::Reader::from_path(&path)?)?;
            if !ends_with_line_break(&mut file)? {
                file.write_all(b"\n")?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(HEADER)?;
        }
        writer.write_record(row.fields())?;
        writer.flush()?;
        Ok(())
    }
}
