use anyhow::{anyhow, Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{index_key, ChapterEntry, ChapterHit, VectorIndex};

/// Maximum number of rows to query when fetching all keys.
/// Used as a fallback when count_rows fails.
const MAX_QUERY_ROWS: usize = 10_000_000;

/// Quote a value for a LanceDB SQL predicate
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("Missing {} column", name))
}

/// Arrow schema of the chapter table
fn chapter_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("comic_hash", DataType::Utf8, false),
        Field::new("chapter", DataType::Utf8, false),
        Field::new("document", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}

/// Open `name`, creating it empty when missing.
///
/// A create that loses against another writer falls back to opening the
/// table that writer made.
async fn open_or_create_table(db: &Connection, name: &str, dimension: i32) -> Result<Table> {
    let table_names = db.table_names().execute().await?;
    if table_names.iter().any(|t| t == name) {
        return db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", name));
    }

    debug!("Creating new table: {}", name);
    let batches = RecordBatchIterator::new(vec![], Arc::new(chapter_schema(dimension)));
    match db.create_table(name, Box::new(batches)).execute().await {
        Ok(table) => Ok(table),
        Err(create_err) => {
            warn!(table = name, error = %create_err, "Create failed, opening existing table");
            db.open_table(name)
                .execute()
                .await
                .with_context(|| format!("Failed to create table {}: {}", name, create_err))
        }
    }
}

/// LanceDB table of chapter embeddings
pub struct LanceStorage {
    table: Table,
    db_path: PathBuf,
    dimension: i32,
}

impl LanceStorage {
    /// Open the database at `path` and its chapter table, creating both if needed
    pub async fn new(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        let db_path = path.to_path_buf();
        let path_str = path.to_string_lossy();

        info!("Opening LanceDB at: {}", path_str);

        let db = connect(&path_str)
            .execute()
            .await
            .with_context(|| format!("Failed to connect to LanceDB at {}", path_str))?;
        let dimension = dimension as i32;
        let table = open_or_create_table(&db, table_name, dimension).await?;

        Ok(Self {
            table,
            db_path,
            dimension,
        })
    }

    async fn get_row_count_or_max(table: &Table) -> usize {
        match table.count_rows(None).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = MAX_QUERY_ROWS,
                    "Failed to count rows, using fallback limit"
                );
                MAX_QUERY_ROWS
            }
        }
    }

    fn table_schema(&self) -> Schema {
        chapter_schema(self.dimension)
    }

    fn entry_to_record_batch(&self, entry: &ChapterEntry) -> Result<RecordBatch> {
        if entry.vector.len() != self.dimension as usize {
            return Err(anyhow!(
                "Vector for {} has dimension {}, index expects {}",
                entry.id,
                entry.vector.len(),
                self.dimension
            ));
        }

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            std::iter::once(Some(entry.vector.iter().map(|&v| Some(v)))),
            self.dimension,
        );

        RecordBatch::try_new(
            Arc::new(self.table_schema()),
            vec![
                Arc::new(StringArray::from(vec![entry.id.as_str()])),
                Arc::new(StringArray::from(vec![entry.comic_hash.as_str()])),
                Arc::new(StringArray::from(vec![entry.chapter.as_str()])),
                Arc::new(StringArray::from(vec![entry.document.as_str()])),
                Arc::new(vector_array),
            ],
        )
        .with_context(|| "Failed to create RecordBatch")
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl VectorIndex for LanceStorage {
    async fn upsert(&self, entry: ChapterEntry) -> Result<()> {
        let table = &self.table;
        let batch = self.entry_to_record_batch(&entry)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], Arc::new(self.table_schema()));

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .with_context(|| format!("Failed to upsert {}", entry.id))?;

        debug!(id = %entry.id, "Upserted chapter vector");
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChapterHit>> {
        let table = &self.table;

        let results = table
            .vector_search(vector.to_vec())
            .with_context(|| "Failed to create vector search query")?
            .limit(k)
            .execute()
            .await
            .with_context(|| "Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .with_context(|| "Failed to collect search results")?;

        let mut hits = Vec::new();
        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let hashes = string_column(&batch, "comic_hash")?;
            let chapters = string_column(&batch, "chapter")?;
            let documents = string_column(&batch, "document")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                hits.push(ChapterHit {
                    id: ids.value(i).to_string(),
                    comic_hash: hashes.value(i).to_string(),
                    chapter: chapters.value(i).to_string(),
                    document: documents.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<ChapterEntry>> {
        let table = &self.table;

        let results = table
            .query()
            .only_if(format!("id = {}", sql_literal(id)))
            .limit(1)
            .execute()
            .await
            .with_context(|| format!("Failed to query entry {}", id))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .with_context(|| "Failed to collect entry")?;

        for batch in batches.iter().filter(|b| b.num_rows() > 0) {
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow!("Missing vector column"))?;
            let values = vectors.value(0);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow!("Vector column is not float32"))?;

            return Ok(Some(ChapterEntry {
                id: string_column(batch, "id")?.value(0).to_string(),
                comic_hash: string_column(batch, "comic_hash")?.value(0).to_string(),
                chapter: string_column(batch, "chapter")?.value(0).to_string(),
                document: string_column(batch, "document")?.value(0).to_string(),
                vector: floats.values().to_vec(),
            }));
        }

        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let table = &self.table;
        let filter = format!("id = {}", sql_literal(id));

        let existing = table
            .count_rows(Some(filter.clone()))
            .await
            .with_context(|| format!("Failed to count rows for {}", id))?;
        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&filter)
            .await
            .with_context(|| format!("Failed to delete entry {}", id))?;

        debug!("Deleted chapter vector {}", id);
        Ok(true)
    }

    async fn delete_by_comic(&self, comic_hash: &str) -> Result<usize> {
        let table = &self.table;
        let filter = format!("comic_hash = {}", sql_literal(comic_hash));

        let existing = table
            .count_rows(Some(filter.clone()))
            .await
            .with_context(|| format!("Failed to count rows for comic {}", comic_hash))?;
        if existing > 0 {
            table
                .delete(&filter)
                .await
                .with_context(|| format!("Failed to delete vectors for comic {}", comic_hash))?;
        }

        info!("Deleted {} chapter vectors for comic {}", existing, comic_hash);
        Ok(existing)
    }

    async fn list_keys(&self) -> Result<BTreeSet<String>> {
        let table = &self.table;
        let total_rows = Self::get_row_count_or_max(table).await;

        let results = table
            .query()
            .select(Select::Columns(vec![
                "comic_hash".to_string(),
                "chapter".to_string(),
            ]))
            .limit(total_rows.max(1))
            .execute()
            .await
            .with_context(|| "Failed to query chapter keys")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .with_context(|| "Failed to collect chapter keys")?;

        let mut keys = BTreeSet::new();
        for batch in batches {
            let hashes = string_column(&batch, "comic_hash")?;
            let chapters = string_column(&batch, "chapter")?;
            for i in 0..batch.num_rows() {
                keys.insert(index_key(hashes.value(i), chapters.value(i)));
            }
        }

        Ok(keys)
    }

    async fn count(&self) -> Result<usize> {
        let table = &self.table;
        table
            .count_rows(None)
            .await
            .with_context(|| "Failed to count chapter vectors")
    }
}
