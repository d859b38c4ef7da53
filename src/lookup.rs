//! Static field lookup table.
//!
//! Maps raw `(sensor, field)` identifiers, as stored by the loggers, to display
//! names, units, grouping columns and a keep/drop decision. Loaded once at
//! startup and only read afterwards, so it can be shared across requests
//! without locking.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::LookupEntry;

const CURRENT_NAME: &str = "Current name";
const CURRENT_FIELD: &str = "Current field";
const NEW_NAME: &str = "New name";
const NEW_FIELD: &str = "New field";
const UNITS: &str = "units";
const NEW_UNITS: &str = "New units";
const KEEP: &str = "To keep?";
const LOCATION: &str = "Location";

const KNOWN_COLUMNS: [&str; 8] = [
    CURRENT_NAME,
    CURRENT_FIELD,
    NEW_NAME,
    NEW_FIELD,
    UNITS,
    NEW_UNITS,
    KEEP,
    LOCATION,
];

// ---

#[derive(Debug, Clone, Default)]
pub struct FieldLookupTable {
    entries: BTreeMap<(String, String), LookupEntry>,
    /// Grouping columns beyond `Location`, in file order.
    dimensions: Vec<String>,
}

impl FieldLookupTable {
    /// Load the table from a CSV file.
    ///
    /// Fails with [`AppError::Config`] if the file is missing, malformed, or
    /// contains the same `(Current name, Current field)` twice.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| AppError::config(format!("open lookup table {:?}: {}", path, e)))?;
        let table = Self::from_reader(file)
            .map_err(|e| AppError::config(format!("lookup table {:?}: {}", path, e)))?;

        tracing::info!(
            "Loaded {} lookup entries from {:?} ({} grouping dimensions)",
            table.len(),
            path,
            table.dimensions.len() + 1
        );
        Ok(table)
    }

    /// Load the table from any CSV source with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // ---
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| AppError::config(format!("read headers: {e}")))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let name_idx = column(CURRENT_NAME)
            .ok_or_else(|| AppError::config(format!("missing '{CURRENT_NAME}' column")))?;
        let field_idx = column(CURRENT_FIELD)
            .ok_or_else(|| AppError::config(format!("missing '{CURRENT_FIELD}' column")))?;

        let dimensions: Vec<String> = headers
            .iter()
            .filter(|h| !h.is_empty() && !KNOWN_COLUMNS.contains(&h.as_str()))
            .cloned()
            .collect();

        let mut entries = BTreeMap::new();
        for (idx, record) in rdr.records().enumerate() {
            let record =
                record.map_err(|e| AppError::config(format!("row {}: {}", idx + 2, e)))?;

            let cell = |i: Option<usize>| -> Option<String> {
                i.and_then(|i| record.get(i))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let (Some(current_name), Some(current_field)) =
                (cell(Some(name_idx)), cell(Some(field_idx)))
            else {
                return Err(AppError::config(format!(
                    "row {}: '{CURRENT_NAME}' and '{CURRENT_FIELD}' are required",
                    idx + 2
                )));
            };

            let keep = !cell(column(KEEP)).is_some_and(|k| k.eq_ignore_ascii_case("n"));

            let groups = dimensions
                .iter()
                .filter_map(|d| cell(column(d.as_str())).map(|v| (d.clone(), v)))
                .collect();

            let entry = LookupEntry {
                current_name: current_name.clone(),
                current_field: current_field.clone(),
                new_name: cell(column(NEW_NAME)),
                new_field: cell(column(NEW_FIELD)),
                units: cell(column(UNITS)),
                new_units: cell(column(NEW_UNITS)),
                keep,
                location: cell(column(LOCATION)),
                groups,
            };

            let key = (current_name, current_field);
            if entries.contains_key(&key) {
                return Err(AppError::config(format!(
                    "duplicate lookup key ({:?}, {:?}) at row {}",
                    key.0,
                    key.1,
                    idx + 2
                )));
            }
            entries.insert(key, entry);
        }

        Ok(Self {
            entries,
            dimensions,
        })
    }

    /// Build a table from already-parsed entries, rejecting duplicate keys.
    pub fn from_entries(
        entries: impl IntoIterator<Item = LookupEntry>,
        dimensions: Vec<String>,
    ) -> Result<Self> {
        // ---
        let mut map = BTreeMap::new();
        for entry in entries {
            let key = (entry.current_name.clone(), entry.current_field.clone());
            if map.insert(key.clone(), entry).is_some() {
                return Err(AppError::config(format!(
                    "duplicate lookup key ({:?}, {:?})",
                    key.0, key.1
                )));
            }
        }
        Ok(Self {
            entries: map,
            dimensions,
        })
    }

    pub fn get(&self, name: &str, field: &str) -> Option<&LookupEntry> {
        self.entries.get(&(name.to_string(), field.to_string()))
    }

    /// First `New name` declared on a kept row of a raw sensor. Dropped rows
    /// never rename the fields that survive.
    pub fn sensor_rename(&self, name: &str) -> Option<&str> {
        self.entries
            .values()
            .filter(|e| e.keep && e.current_name == name)
            .find_map(|e| e.new_name.as_deref())
    }

    /// Grouping columns beyond `Location`, in file order.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
