use anyhow::{anyhow, Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{ReaderBuilder, WriterBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
};
use tracing::debug;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build an all-Utf8 schema from the file's header row. Every column is read
/// as a nullable string; typed interpretation happens downstream.
fn header_schema(path: &Path) -> Result<SchemaRef> {
    let file =
        File::open(path).with_context(|| format!("opening `{}`", path.display()))?;
    let mut header = String::new();
    BufReader::new(file)
        .read_line(&mut header)
        .with_context(|| format!("reading header row of `{}`", path.display()))?;
    if header.trim().is_empty() {
        anyhow::bail!("`{}` has no header row", path.display());
    }

    let fields: Vec<Field> = header
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|h| Field::new(clean_str(h), DataType::Utf8, true))
        .collect();
    Ok(Arc::new(Schema::new(fields)))
}

/// Read a comma-delimited file with a header row into a single RecordBatch.
pub fn read_csv_file(path: &Path) -> Result<RecordBatch> {
    let schema = header_schema(path)?;
    debug!(columns = schema.fields().len(), file = %path.display(), "parsed header");

    let file =
        File::open(path).with_context(|| format!("opening `{}`", path.display()))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(8192)
        .with_quote(b'"')
        .with_escape(b'"')
        .with_delimiter(b',')
        .build(file)
        .context("creating CSV reader")?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.context("reading CSV batch")?);
    }
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&schema, &batches).context("concatenating CSV batches")
}

/// Write a RecordBatch to a comma-delimited file with a header row. An empty
/// batch produces a header-only file.
pub fn write_csv_file(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating `{}`", path.display()))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .with_context(|| format!("writing CSV to `{}`", path.display()))?;
    Ok(())
}

/// Look up a column by name, or fail with a missing-column error.
pub fn required_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a arrow::array::ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("input table is missing required column `{}`", name))
}
