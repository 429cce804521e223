use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, StringArray, TimestampMillisecondBuilder},
    compute::filter_record_batch,
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::debug;

use crate::table::{clean_str, required_column};

pub mod dates;

pub const PRICE_COLUMN: &str = "price";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LAST_REVIEW_COLUMN: &str = "last_review";

/// NYC latitude bounds. Fixed constants, not CLI parameters: rows outside
/// this band are bad geocodes for this dataset.
pub const LATITUDE_MIN: f64 = 40.5;
pub const LATITUDE_MAX: f64 = 41.2;

/// Drop outliers, then convert `last_review` to a timestamp column.
pub fn clean_listings(
    batch: &RecordBatch,
    min_price: f64,
    max_price: f64,
) -> Result<RecordBatch> {
    let kept = drop_outliers(batch, min_price, max_price)?;
    parse_last_review(&kept)
}

/// Keep rows where `price` lies in `[min_price, max_price]` and `latitude`
/// lies in `[LATITUDE_MIN, LATITUDE_MAX]`, both closed intervals. Rows with
/// a missing or non-numeric value in either column are dropped. The result
/// is an independent batch; the input is untouched.
pub fn drop_outliers(
    batch: &RecordBatch,
    min_price: f64,
    max_price: f64,
) -> Result<RecordBatch> {
    let price = string_column(batch, PRICE_COLUMN)?;
    let latitude = string_column(batch, LATITUDE_COLUMN)?;
    // surface a missing `last_review` here too, before any rows are dropped
    string_column(batch, LAST_REVIEW_COLUMN)?;

    let mut keep = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let in_range = match (parse_f64(price, i), parse_f64(latitude, i)) {
            (Some(p), Some(lat)) => {
                p >= min_price && p <= max_price && lat >= LATITUDE_MIN && lat <= LATITUDE_MAX
            }
            _ => false,
        };
        keep.push(in_range);
    }

    let mask = BooleanArray::from(keep);
    let kept = filter_record_batch(batch, &mask).context("applying outlier mask")?;
    debug!(
        before = batch.num_rows(),
        after = kept.num_rows(),
        "applied outlier mask"
    );
    Ok(kept)
}

/// Rebuild the batch with `last_review` as a nullable millisecond timestamp.
/// Values that do not parse become nulls; every other column is untouched.
pub fn parse_last_review(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema_in = batch.schema();

    let fields: Vec<Field> = schema_in
        .fields()
        .iter()
        .map(|f| {
            if f.name() == LAST_REVIEW_COLUMN {
                Field::new(
                    f.name(),
                    DataType::Timestamp(TimeUnit::Millisecond, None),
                    true,
                )
            } else {
                f.as_ref().clone()
            }
        })
        .collect();

    let mut cols: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (arr, fld) in batch.columns().iter().zip(schema_in.fields()) {
        if fld.name() == LAST_REVIEW_COLUMN {
            let sarr = arr
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow!("column `{}` is not a string column", LAST_REVIEW_COLUMN))?;
            let mut b = TimestampMillisecondBuilder::new();
            for opt in sarr.iter() {
                let ts = opt.and_then(|s| dates::parse_review_millis(&clean_str(s)));
                b.append_option(ts);
            }
            cols.push(Arc::new(b.finish()) as ArrayRef);
        } else {
            cols.push(arr.clone());
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).map_err(Into::into)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    required_column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column `{}` is not a string column", name))
}

fn parse_f64(arr: &StringArray, i: usize) -> Option<f64> {
    if arr.is_null(i) {
        return None;
    }
    clean_str(arr.value(i)).parse().ok()
}
