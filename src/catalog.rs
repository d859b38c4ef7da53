//! Metadata reconciliation.
//!
//! Joins the live per-sensor field summaries from the store with the static
//! [`FieldLookupTable`] and produces a [`Catalog`]: the set of
//! [`CanonicalField`]s that drives every selection list, the metadata table,
//! and the translation from display identifiers back to storage identifiers.
//!
//! The catalog is a pure projection. It is rebuilt from the store whenever it
//! is needed and never cached between requests.
//!
//! # Known limitation
//!
//! Two raw sensors may be renamed to the same display name and expose the same
//! display field. [`Catalog::lookup`] then resolves deterministically to the
//! lexicographically first `db_name` (then `db_field`); the other raw series is
//! reachable only by fixing the lookup table.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::lookup::FieldLookupTable;
use crate::models::{CanonicalField, FieldValue, SensorDocument};

/// Grouping dimension every catalog has, defaulting to the raw sensor name.
pub const LOCATION: &str = "Location";

/// Pseudo-dimension grouping every sensor together.
pub const ALL: &str = "All";

// ---

/// One row of the metadata table and of `ngif-metadata.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRow {
    pub name: String,
    pub field: String,
    pub units: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_value: Option<FieldValue>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Sorted by `(display_name, display_field, db_name, db_field)`.
    fields: Vec<CanonicalField>,
    /// Lookup grouping columns beyond `Location`.
    dimensions: Vec<String>,
}

/// Build the catalog from raw sensor documents and the lookup table.
///
/// Fields with no lookup entry pass through under their raw identifiers and
/// are kept. Fields whose entry says `keep = N` are left out entirely.
pub fn reconcile(documents: &[SensorDocument], lookup: &FieldLookupTable) -> Catalog {
    // ---
    let mut fields = Vec::new();
    let mut dropped = 0usize;

    for doc in documents {
        let sensor_rename = lookup.sensor_rename(&doc.name);

        for (raw_field, meta) in &doc.fields {
            let entry = lookup.get(&doc.name, raw_field);
            if entry.is_some_and(|e| !e.keep) {
                dropped += 1;
                continue;
            }

            let display_name = entry
                .and_then(|e| e.new_name.clone())
                .or_else(|| sensor_rename.map(str::to_string))
                .unwrap_or_else(|| doc.name.clone());

            let display_field = entry
                .and_then(|e| e.new_field.clone())
                .unwrap_or_else(|| raw_field.clone());

            let units = entry
                .and_then(|e| e.new_units.clone())
                .or_else(|| meta.units.clone())
                .or_else(|| entry.and_then(|e| e.units.clone()))
                .unwrap_or_default();

            let location = entry
                .and_then(|e| e.location.clone())
                .unwrap_or_else(|| doc.name.clone());

            fields.push(CanonicalField {
                display_name,
                display_field,
                units,
                db_name: doc.name.clone(),
                db_field: raw_field.clone(),
                last_updated: meta.last_updated,
                last_value: meta.last_value.clone(),
                location,
                groups: entry.map(|e| e.groups.clone()).unwrap_or_default(),
            });
        }
    }

    fields.sort_by(|a, b| {
        (&a.display_name, &a.display_field, &a.db_name, &a.db_field).cmp(&(
            &b.display_name,
            &b.display_field,
            &b.db_name,
            &b.db_field,
        ))
    });

    tracing::debug!(
        "Reconciled {} sensors into {} catalog fields ({} dropped)",
        documents.len(),
        fields.len(),
        dropped
    );

    Catalog {
        fields,
        dimensions: lookup.dimensions().to_vec(),
    }
}

impl Catalog {
    pub fn fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Distinct display names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self.fields.iter().map(|f| f.display_name.as_str()).collect();
        names.into_iter().collect()
    }

    /// Resolve a display pair to the catalog entry used for querying.
    ///
    /// When several raw pairs share the display pair, the first by `db_name`
    /// then `db_field` wins.
    pub fn lookup(&self, display_name: &str, display_field: &str) -> Result<&CanonicalField> {
        // ---
        let mut matches = self
            .fields
            .iter()
            .filter(|f| f.display_name == display_name && f.display_field == display_field);

        let first = matches.next().ok_or_else(|| {
            AppError::not_found(format!("no field '{display_field}' for sensor '{display_name}'"))
        })?;

        let shadowed: Vec<String> = matches
            .map(|f| format!("{}/{}", f.db_name, f.db_field))
            .collect();
        if !shadowed.is_empty() {
            tracing::debug!(
                "{}/{} is ambiguous; using {}/{}, shadowing {}",
                display_name,
                display_field,
                first.db_name,
                first.db_field,
                shadowed.join(", ")
            );
        }
        Ok(first)
    }

    /// Dimensions a user can filter sensors by.
    pub fn themes(&self) -> Vec<String> {
        // ---
        let mut themes = vec![LOCATION.to_string()];
        themes.extend(
            self.dimensions
                .iter()
                .filter(|d| d.as_str() != ALL)
                .cloned(),
        );
        themes.push(ALL.to_string());
        themes
    }

    /// Group values for a dimension, natural-sorted.
    pub fn group_options(&self, dimension: &str) -> Result<Vec<String>> {
        // ---
        let mut options = BTreeSet::new();
        for field in &self.fields {
            options.extend(self.memberships(field, dimension)?);
        }
        let mut options: Vec<String> = options.into_iter().collect();
        options.sort_by(|a, b| natural_cmp(a, b));
        Ok(options)
    }

    /// Display names of every sensor belonging to `value` in `dimension`.
    pub fn groups_by(&self, dimension: &str, value: &str) -> Result<BTreeSet<String>> {
        // ---
        Ok(self
            .fields_in_group(dimension, value)?
            .into_iter()
            .map(|f| f.display_name.clone())
            .collect())
    }

    /// Catalog fields of every sensor belonging to `value` in `dimension`.
    pub fn fields_in_group(&self, dimension: &str, value: &str) -> Result<Vec<&CanonicalField>> {
        // ---
        let value = value.trim();
        let mut selected = Vec::new();
        for field in &self.fields {
            if self.memberships(field, dimension)?.iter().any(|m| m == value) {
                selected.push(field);
            }
        }
        Ok(selected)
    }

    /// Rows for the metadata table, in catalog order.
    pub fn metadata_rows(&self) -> Vec<MetadataRow> {
        self.fields
            .iter()
            .map(|f| MetadataRow {
                name: f.display_name.clone(),
                field: f.display_field.clone(),
                units: f.units.clone(),
                last_updated: f.last_updated,
                last_value: f.last_value.clone(),
            })
            .collect()
    }

    fn memberships(&self, field: &CanonicalField, dimension: &str) -> Result<Vec<String>> {
        // ---
        let raw = if dimension == LOCATION {
            Some(field.location.as_str())
        } else if self.dimensions.iter().any(|d| d == dimension) {
            field.groups.get(dimension).map(String::as_str)
        } else if dimension == ALL {
            Some(ALL)
        } else {
            return Err(AppError::validation(format!("unknown theme '{dimension}'")));
        };

        Ok(raw.map(split_groups).unwrap_or_default())
    }
}

/// Split a `;`-separated membership cell, dropping blanks and NBSP placeholders.
pub fn split_groups(cell: &str) -> Vec<String> {
    cell.split(';')
        .filter(|s| *s != "\u{a0}")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Num(u64),
    Text(String),
}

fn natural_key(s: &str) -> Vec<Chunk> {
    // ---
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let mut flush = |current: &mut String, digits: bool| {
        if current.is_empty() {
            return;
        }
        let chunk = match current.parse::<u64>() {
            Ok(n) if digits => Chunk::Num(n),
            _ => Chunk::Text(current.to_lowercase()),
        };
        chunks.push(chunk);
        current.clear();
    };

    for c in s.chars() {
        let digit = c.is_ascii_digit();
        if digit != in_digits {
            flush(&mut current, in_digits);
            in_digits = digit;
        }
        current.push(c);
    }
    flush(&mut current, in_digits);
    chunks
}

/// Compare so that `Pond 2` sorts before `Pond 10`, ignoring case.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b)).then_with(|| a.cmp(b))
}
