//! CSV rendering for series and metadata downloads.

use chrono::{DateTime, Utc};

use crate::catalog::MetadataRow;
use crate::error::{AppError, Result};
use crate::models::Series;
use crate::series::TimeWindow;

pub const METADATA_FILENAME: &str = "ngif-metadata.csv";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---

fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Rendering failures are our fault, not the caller's or the store's.
fn render_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("render CSV: {e}"))
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    // ---
    let bytes = writer.into_inner().map_err(render_error)?;
    String::from_utf8(bytes).map_err(render_error)
}

/// `time,"{label}"` followed by one row per point, in series order.
pub fn series_csv(series: &Series) -> Result<String> {
    // ---
    let mut out = format!("time,\"{}\"\n", series.label.replace('"', "\"\""));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for point in &series.points {
        writer
            .write_record([format_time(&point.time), point.value.to_string()])
            .map_err(render_error)?;
    }
    out.push_str(&into_string(writer)?);
    Ok(out)
}

/// Catalog dump: name, field, units, last_updated, last_value.
pub fn metadata_csv(rows: &[MetadataRow]) -> Result<String> {
    // ---
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["name", "field", "units", "last_updated", "last_value"])
        .map_err(render_error)?;
    for row in rows {
        writer.write_record([
            row.name.clone(),
            row.field.clone(),
            row.units.clone(),
            row.last_updated.as_ref().map(format_time).unwrap_or_default(),
            row.last_value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        ])
        .map_err(render_error)?;
    }
    into_string(writer)
}

/// `ngif-[{name}]-[{field}{ (smoothed)}]-[{start}]-[{end}].csv`
pub fn series_filename(name: &str, field: &str, window: &TimeWindow, smooth: bool) -> String {
    format!(
        "ngif-[{}]-[{}{}]-[{}]-[{}].csv",
        name,
        field,
        if smooth { " (smoothed)" } else { "" },
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d")
    )
}
