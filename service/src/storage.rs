use crate::arrow_io::{
    build_batch, build_schema, column_meta, plan_columns, read_arrow_chunk, write_arrow_chunk,
    MetaCollector, CHUNK_SIZE,
};
use crate::models::TableMeta;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use logparser::ParseOutcome;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// One directory per session: `meta.json`, `records.mp` and `chunks/NNN.arrow`.
pub struct SessionStorage {
    base_path: PathBuf,
}

impl SessionStorage {
    pub fn new(base_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn create_session(&self) -> Result<String, StorageError> {
        let session_id = Uuid::new_v4().to_string();
        let session_path = self.session_path(&session_id)?;

        fs::create_dir_all(session_path.join("chunks"))?;

        Ok(session_id)
    }

    /// Only UUIDs are accepted, so an id can never escape the base directory.
    pub fn session_path(&self, session_id: &str) -> Result<PathBuf, StorageError> {
        Uuid::parse_str(session_id)
            .map_err(|_| StorageError::InvalidSessionId(session_id.to_string()))?;
        Ok(self.base_path.join(session_id))
    }

    fn existing_session_path(&self, session_id: &str) -> Result<PathBuf, StorageError> {
        let path = self.session_path(session_id)?;
        if !path.is_dir() {
            return Err(StorageError::NotFound(session_id.to_string()));
        }
        Ok(path)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), StorageError> {
        let session_path = self.existing_session_path(session_id)?;
        fs::remove_dir_all(session_path)?;
        Ok(())
    }

    pub fn write_meta(&self, session_id: &str, meta: &TableMeta) -> Result<(), StorageError> {
        let meta_path = self.session_path(session_id)?.join("meta.json");
        fs::write(meta_path, serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }

    pub fn read_meta(&self, session_id: &str) -> Result<TableMeta, StorageError> {
        let meta_path = self.existing_session_path(session_id)?.join("meta.json");
        let json = fs::read(meta_path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn write_records<T: serde::Serialize>(
        &self,
        session_id: &str,
        records: &[T],
    ) -> Result<(), StorageError> {
        let records_path = self.session_path(session_id)?.join("records.mp");
        fs::write(records_path, rmp_serde::to_vec(records)?)?;
        Ok(())
    }

    /// Records as JSON objects, `offset..offset + limit`, plus the total count.
    pub fn read_records(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<serde_json::Value>, usize), StorageError> {
        let records_path = self.existing_session_path(session_id)?.join("records.mp");
        let msgpack = fs::read(records_path)?;
        let records: Vec<serde_json::Value> = rmp_serde::from_slice(&msgpack)?;

        let total = records.len();
        let page = records.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    pub fn chunk_path(&self, session_id: &str, chunk_idx: usize) -> Result<PathBuf, StorageError> {
        Ok(self
            .session_path(session_id)?
            .join("chunks")
            .join(format!("{:03}.arrow", chunk_idx)))
    }

    pub fn list_chunks(&self, session_id: &str) -> Result<Vec<PathBuf>, StorageError> {
        let chunks_dir = self.existing_session_path(session_id)?.join("chunks");
        let mut chunks = Vec::new();

        for entry in fs::read_dir(chunks_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("arrow") {
                chunks.push(path);
            }
        }

        chunks.sort();
        Ok(chunks)
    }

    pub fn read_batches(&self, session_id: &str) -> Result<Vec<RecordBatch>, StorageError> {
        let mut batches = Vec::new();
        for chunk in self.list_chunks(session_id)? {
            batches.extend(read_arrow_chunk(&chunk)?);
        }
        Ok(batches)
    }
}

/// Encode a parse outcome into a session: Arrow chunks, records and metadata.
pub fn ingest_table(
    storage: &SessionStorage,
    session_id: &str,
    source_name: &str,
    outcome: &ParseOutcome,
) -> Result<TableMeta, StorageError> {
    let table = &outcome.table;
    let plans = plan_columns(table);
    let schema = build_schema(&plans);
    debug!("Column plan for session {}: {:?}", session_id, plans);

    let mut meta_collector = MetaCollector::new();
    let mut chunk_count = 0;

    for (chunk_idx, records) in table.records().chunks(CHUNK_SIZE).enumerate() {
        for record in records {
            meta_collector.update(record);
        }

        let batch = build_batch(&schema, &plans, records)?;
        write_arrow_chunk(&batch, &storage.chunk_path(session_id, chunk_idx)?)?;
        chunk_count += 1;
    }

    storage.write_records(session_id, table.records())?;

    let meta = TableMeta {
        source_name: source_name.to_string(),
        log_type: outcome.log_type.clone(),
        detection: outcome.detection,
        container: outcome.container,
        row_count: meta_collector.row_count,
        raw_line_count: outcome.raw_line_count,
        chunk_count,
        columns: column_meta(&plans),
        t_min: meta_collector.t_min,
        t_max: meta_collector.t_max,
        status_classes: meta_collector.status_classes,
        warnings: outcome.warnings.clone(),
    };
    storage.write_meta(session_id, &meta)?;

    info!(
        "Stored {} rows in {} chunks for session {}",
        meta.row_count, chunk_count, session_id
    );
    Ok(meta)
}
