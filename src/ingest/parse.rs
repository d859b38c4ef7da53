//! Upload parsers.
//!
//! Both upload shapes end up as [`RawBatch`]es: one per sensor, rows as sparse
//! `field -> value` maps plus a timestamp, units collected on the side.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{FieldValue, IngestRow, RawBatch};

/// Keys of an uploaded JSON row that are not sensor fields.
const RESERVED_KEYS: [&str; 3] = ["customer", "unitID", "time"];

const NAIVE_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

// ---

/// Parse a logger timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    // ---
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::validation(format!("invalid timestamp '{input}'")))
}

/// Extract the sensor identifier from an upload filename.
///
/// The identifier is the first parenthesised token (`Logger (pond_1).csv`),
/// otherwise the first `+`-separated token (`pond_1+2023-05.csv`), otherwise
/// the whole file stem.
pub fn sensor_id_from_filename(filename: &str) -> Result<String> {
    // ---
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };

    let parenthesised = stem.find('(').and_then(|open| {
        stem[open + 1..]
            .find(')')
            .map(|close| &stem[open + 1..open + 1 + close])
    });

    let id = parenthesised
        .unwrap_or_else(|| stem.split('+').next().unwrap_or(stem))
        .trim();

    if id.is_empty() {
        return Err(AppError::validation(format!(
            "cannot find a sensor identifier in filename '{filename}'"
        )));
    }
    Ok(id.to_string())
}

fn detect_delimiter(header_line: &str) -> u8 {
    // ---
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header_line.bytes().filter(|b| b == d).count())
        .filter(|d| header_line.as_bytes().contains(d))
        .unwrap_or(b',')
}

/// A unit row has no timestamp-like first cell and no numeric values. Anything
/// else on line 2 is data, so a mistyped timestamp is reported, not stored
/// as units.
fn is_unit_row(record: &csv::StringRecord) -> bool {
    // ---
    let mut cells = record.iter().map(str::trim);
    let first = cells.next().unwrap_or_default();
    !first.starts_with(|c: char| c.is_ascii_digit()) && cells.all(|c| c.parse::<f64>().is_err())
}

/// Parse a delimited text upload.
///
/// The first column is the timestamp, the remaining header cells name fields.
/// An optional unit row may follow the header.
pub fn delimited(filename: &str, text: &str) -> Result<RawBatch> {
    // ---
    let sensor_id = sensor_id_from_filename(filename)?;
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = detect_delimiter(text.lines().next().unwrap_or_default());

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = rdr.records();
    let header = records
        .next()
        .ok_or_else(|| AppError::validation(format!("'{filename}' is empty")))??;

    let columns: Vec<Option<String>> = header
        .iter()
        .skip(1)
        .map(|h| Some(h.trim().to_string()).filter(|h| !h.is_empty()))
        .collect();
    if columns.iter().all(Option::is_none) {
        return Err(AppError::validation(format!(
            "'{filename}' has no field columns after the timestamp"
        )));
    }

    let mut batch = RawBatch {
        sensor_id,
        ..Default::default()
    };

    for (idx, record) in records.enumerate() {
        let record = record?;
        let line = idx + 2;
        let first = record.get(0).unwrap_or_default().trim();

        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let time = match parse_timestamp(first) {
            Ok(time) => time,
            Err(_) if line == 2 && is_unit_row(&record) => {
                for (column, unit) in columns.iter().zip(record.iter().skip(1)) {
                    if let (Some(field), unit) = (column, unit.trim()) {
                        if !unit.is_empty() {
                            batch.units.insert(field.clone(), unit.to_string());
                        }
                    }
                }
                continue;
            }
            Err(_) => {
                return Err(AppError::validation(format!(
                    "'{filename}' line {line}: invalid timestamp '{first}'"
                )))
            }
        };

        let values = columns
            .iter()
            .zip(record.iter().skip(1))
            .filter_map(|(column, cell)| {
                let field = column.as_ref()?;
                FieldValue::from_cell(cell).map(|v| (field.clone(), v))
            })
            .collect();

        batch.rows.push(IngestRow { time, values });
    }

    tracing::debug!(
        "Parsed '{}': sensor={} rows={} units={}",
        filename,
        batch.sensor_id,
        batch.rows.len(),
        batch.units.len()
    );
    Ok(batch)
}

/// Parse a JSON upload: an array of rows with `time`, `unitID` and
/// `field: [value, unit]` pairs. Returns one batch per `unitID`, in
/// first-seen order.
pub fn json_rows(payload: &Value) -> Result<Vec<RawBatch>> {
    // ---
    let rows = payload
        .as_array()
        .ok_or_else(|| AppError::validation("upload must be a JSON array of rows"))?;

    let mut batches: Vec<RawBatch> = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .ok_or_else(|| AppError::validation(format!("row {idx} is not an object")))?;

        let time = obj
            .get("time")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation(format!("row {idx} has no 'time'")))
            .and_then(parse_timestamp)?;

        let sensor_id = match obj.get("unitID") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(AppError::validation(format!("row {idx} has no 'unitID'"))),
        };

        let batch = match batches.iter().position(|b| b.sensor_id == sensor_id) {
            Some(pos) => &mut batches[pos],
            None => {
                batches.push(RawBatch {
                    sensor_id,
                    ..Default::default()
                });
                let last = batches.len() - 1;
                &mut batches[last]
            }
        };

        let mut values = BTreeMap::new();
        for (key, raw) in obj {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let (value, unit) = match raw {
                Value::Array(pair) => (
                    pair.first().and_then(FieldValue::from_json),
                    pair.last()
                        .filter(|_| pair.len() > 1)
                        .and_then(Value::as_str)
                        .map(str::to_string),
                ),
                scalar => (FieldValue::from_json(scalar), None),
            };
            if let Some(unit) = unit {
                batch.units.insert(key.clone(), unit);
            }
            if let Some(value) = value {
                values.insert(key.clone(), value);
            }
        }
        batch.rows.push(IngestRow { time, values });
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_formats() {
        // ---
        let expected = Utc.with_ymd_and_hms(2023, 5, 1, 12, 30, 0).unwrap();
        for input in [
            "2023-05-01T12:30:00Z",
            "2023-05-01T13:30:00+01:00",
            "2023-05-01 12:30:00",
            "2023-05-01 12:30",
            "01/05/2023 12:30",
            "2023-05-01T12:30:00.000",
        ] {
            assert_eq!(parse_timestamp(input).unwrap(), expected, "{input}");
        }
        assert!(parse_timestamp("mm").is_err());
    }

    #[test]
    fn test_sensor_id_from_filename() {
        // ---
        assert_eq!(
            sensor_id_from_filename("uploads/Logger (pond_1) 2023.csv").unwrap(),
            "pond_1"
        );
        assert_eq!(sensor_id_from_filename("roof_2+May+2023.csv").unwrap(), "roof_2");
        assert_eq!(sensor_id_from_filename("swale.txt").unwrap(), "swale");
        assert!(sensor_id_from_filename("().csv").is_err());
    }

    #[test]
    fn test_delimited_with_unit_row() {
        // ---
        let text = "Time,Level,Temp\n,mm,C\n2023-05-01 00:00:00,12.5,\n2023-05-01 00:15:00,12.7,9.1\n";
        let batch = delimited("(pond_1).csv", text).unwrap();

        assert_eq!(batch.sensor_id, "pond_1");
        assert_eq!(batch.units.get("Level").map(String::as_str), Some("mm"));
        assert_eq!(batch.units.get("Temp").map(String::as_str), Some("C"));
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].values.len(), 1);
        assert_eq!(
            batch.rows[1].values.get("Temp"),
            Some(&FieldValue::Number(9.1))
        );
    }

    #[test]
    fn test_delimited_semicolon_without_units() {
        // ---
        let text = "time;flow\n01/05/2023 10:00;0\n01/05/2023 10:05;3\n";
        let batch = delimited("roof_2+x.csv", text).unwrap();

        assert!(batch.units.is_empty());
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[1].values.get("flow"), Some(&FieldValue::Number(3.0)));
    }

    #[test]
    fn test_delimited_bad_timestamp_is_validation_error() {
        // ---
        let text = "time,flow\n2023-05-01 10:00,1\nlater,2\n";
        let err = delimited("roof_2.csv", text).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_delimited_bad_first_timestamp_is_not_a_unit_row() {
        // ---
        let text = "time,lvl\n2023-13-01 00:00,12.5\n2023-05-01 00:15,13\n";
        let err = delimited("pond_1.csv", text).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("line 2"));

        // Numeric cells mark a data row even when the first cell is text.
        let text = "time,lvl\nyesterday,12.5\n2023-05-01 00:15,13\n";
        assert!(delimited("pond_1.csv", text).is_err());

        let text = "time,lvl\nunits,mm\n2023-05-01 00:15,13\n";
        let batch = delimited("pond_1.csv", text).unwrap();
        assert_eq!(batch.units.get("lvl").map(String::as_str), Some("mm"));
        assert_eq!(batch.rows.len(), 1);
    }

    #[test]
    fn test_json_rows_group_by_unit() {
        // ---
        let payload = serde_json::json!([
            {"time": "2023-05-01T10:00:00Z", "unitID": "eml_1", "customer": "ngif",
             "temp": [9.5, "C"], "rh": [null, "%"]},
            {"time": "2023-05-01T10:00:00Z", "unitID": "eml_2", "temp": [7.0, "C"]},
            {"time": "2023-05-01T10:10:00Z", "unitID": "eml_1", "temp": [9.7, "C"]}
        ]);
        let batches = json_rows(&payload).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].sensor_id, "eml_1");
        assert_eq!(batches[0].rows.len(), 2);
        assert!(!batches[0].rows[0].values.contains_key("customer"));
        assert!(!batches[0].rows[0].values.contains_key("rh"));
        assert_eq!(batches[0].units.get("rh").map(String::as_str), Some("%"));
        assert_eq!(batches[1].rows[0].values.get("temp"), Some(&FieldValue::Number(7.0)));
    }

    #[test]
    fn test_json_rows_reject_bad_shapes() {
        // ---
        assert!(json_rows(&serde_json::json!({"time": "x"})).is_err());
        assert!(json_rows(&serde_json::json!([{"unitID": "a"}])).is_err());
        assert!(json_rows(&serde_json::json!([{"time": "2023-05-01T10:00:00Z"}])).is_err());
        assert!(json_rows(&serde_json::json!([])).unwrap().is_empty());
    }
}
