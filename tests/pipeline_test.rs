//! End-to-end behaviour of ingest → reconcile → series against the in-memory store.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use ngif_dashboard::catalog::reconcile;
use ngif_dashboard::ingest::{ingest, parse};
use ngif_dashboard::lookup::FieldLookupTable;
use ngif_dashboard::models::IngestRow;
use ngif_dashboard::series::{build_series, TimeWindow};
use ngif_dashboard::store::{MemoryReadingStore, ReadingStore};
use ngif_dashboard::{AppError, FieldValue, RawBatch};

const LOOKUP: &str = "\
Current name,Current field,New name,New field,units,New units,To keep?,Location,Project
pond_1,lvl,Pond 1,Water level,,mm,Y,Swale; Pond,Flood
pond_1,batt,,,V,,N,,
pond_2,lvl,Pond 1,Water level,,mm,Y,Pond,Flood
roof_2,flow,Roof 2,Outflow,,l,,Roof,Green roof
roof_2,rain,Roof 2,Outflow,,mm,,Roof,Green roof
";

fn lookup() -> FieldLookupTable {
    FieldLookupTable::from_reader(LOOKUP.as_bytes()).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, day, hour, 0, 0).unwrap()
}

fn row(time: DateTime<Utc>, values: &[(&str, f64)]) -> IngestRow {
    // ---
    IngestRow {
        time,
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Number(*v)))
            .collect(),
    }
}

fn batch(sensor: &str, rows: Vec<IngestRow>) -> RawBatch {
    RawBatch {
        sensor_id: sensor.to_string(),
        rows,
        units: BTreeMap::new(),
    }
}

async fn catalog_of(store: &MemoryReadingStore) -> ngif_dashboard::catalog::Catalog {
    reconcile(&store.sensor_documents().await.unwrap(), &lookup())
}

#[tokio::test]
async fn reconcile_yields_one_field_per_kept_raw_pair() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(
        &store,
        batch("pond_1", vec![row(at(1, 0), &[("lvl", 1.0), ("batt", 12.1)])]),
        None,
    )
    .await?;
    ingest(
        &store,
        batch("pond_9", vec![row(at(1, 0), &[("temp", 8.0)])]),
        None,
    )
    .await?;

    let catalog = catalog_of(&store).await;
    let pairs: Vec<(&str, &str)> = catalog
        .fields()
        .iter()
        .map(|f| (f.db_name.as_str(), f.db_field.as_str()))
        .collect();

    assert_eq!(pairs, vec![("pond_1", "lvl"), ("pond_9", "temp")]);
    assert_eq!(catalog.lookup("Pond 1", "Water level")?.units, "mm");
    Ok(())
}

#[tokio::test]
async fn reingesting_old_rows_accepts_nothing() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    let rows = vec![row(at(1, 0), &[("lvl", 1.0)]), row(at(1, 1), &[("lvl", 2.0)])];

    let first = ingest(&store, batch("pond_1", rows.clone()), None).await?;
    assert_eq!(first.accepted, 2);
    let before = store.sensor_documents().await?;

    let again = ingest(&store, batch("pond_1", rows), None).await?;
    assert_eq!(again.accepted, 0);
    assert_eq!(store.sensor_documents().await?, before);
    assert_eq!(store.readings().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn only_rows_newer_than_latest_are_kept() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(&store, batch("pond_1", vec![row(at(1, 5), &[("lvl", 1.0)])]), None).await?;

    let outcome = ingest(
        &store,
        batch(
            "pond_1",
            vec![
                row(at(1, 4), &[("lvl", 9.0)]),
                row(at(1, 5), &[("lvl", 9.0)]),
                row(at(1, 6), &[("lvl", 3.0)]),
            ],
        ),
        None,
    )
    .await?;

    assert_eq!(outcome.accepted, 1);
    Ok(())
}

#[tokio::test]
async fn last_updated_follows_time_not_row_order() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    let t1 = at(2, 8);
    let t2 = at(2, 9);
    ingest(
        &store,
        batch(
            "pond_1",
            vec![row(t2, &[("lvl", 20.0)]), row(t1, &[("lvl", 10.0)])],
        ),
        None,
    )
    .await?;

    let docs = store.sensor_documents().await?;
    let lvl = &docs[0].fields["lvl"];
    assert_eq!(lvl.last_updated, Some(t2));
    assert_eq!(lvl.last_value, Some(FieldValue::Number(20.0)));
    Ok(())
}

#[tokio::test]
async fn series_window_includes_whole_end_day() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(
        &store,
        batch(
            "pond_1",
            vec![
                row(at(1, 23), &[("lvl", 1.0)]),
                row(at(2, 0), &[("lvl", 2.0)]),
                row(at(3, 23), &[("lvl", 3.0)]),
                row(at(4, 0), &[("lvl", 4.0)]),
            ],
        ),
        None,
    )
    .await?;
    let catalog = catalog_of(&store).await;

    let window = TimeWindow::parse("2023-05-02", "2023-05-03")?;
    let series = build_series(&store, &catalog, "Pond 1", "Water level", Some(window), false).await?;

    assert_eq!(series.label, "Water level (mm)");
    let values: Vec<FieldValue> = series.points.into_iter().map(|p| p.value).collect();
    assert_eq!(values, vec![FieldValue::Number(2.0), FieldValue::Number(3.0)]);

    let all = build_series(&store, &catalog, "Pond 1", "Water level", None, false).await?;
    assert_eq!(all.len(), 4);
    Ok(())
}

#[tokio::test]
async fn empty_window_is_an_empty_series() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(&store, batch("pond_1", vec![row(at(1, 0), &[("lvl", 1.0)])]), None).await?;
    let catalog = catalog_of(&store).await;

    let window = TimeWindow::parse("2022-01-01", "2022-01-02")?;
    let series = build_series(&store, &catalog, "Pond 1", "Water level", Some(window), true).await?;
    assert!(series.is_empty());
    Ok(())
}

#[tokio::test]
async fn smoothing_spreads_counter_totals() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(
        &store,
        batch(
            "roof_2",
            vec![
                row(at(1, 0), &[("flow", 0.0)]),
                row(at(1, 1), &[("flow", 0.0)]),
                row(at(1, 2), &[("flow", 6.0)]),
                row(at(1, 3), &[("flow", 0.0)]),
            ],
        ),
        None,
    )
    .await?;
    let catalog = catalog_of(&store).await;

    let field = catalog.lookup("Roof 2", "Outflow")?;
    assert!(field.supports_smoothing());

    let series = build_series(&store, &catalog, "Roof 2", "Outflow", None, true).await?;
    let values: Vec<f64> = series.points.iter().filter_map(|p| p.value.as_f64()).collect();
    assert_eq!(values, vec![2.0, 2.0, 2.0, 0.0]);
    Ok(())
}

#[tokio::test]
async fn merged_display_pair_queries_only_the_chosen_raw_field() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    // roof_2/flow and roof_2/rain both display as "Roof 2" / "Outflow".
    ingest(
        &store,
        batch(
            "roof_2",
            vec![
                row(at(1, 0), &[("flow", 1.0)]),
                row(at(1, 1), &[("rain", 50.0)]),
                row(at(1, 2), &[("flow", 2.0), ("rain", 60.0)]),
            ],
        ),
        None,
    )
    .await?;
    let catalog = catalog_of(&store).await;

    let field = catalog.lookup("Roof 2", "Outflow")?;
    assert_eq!((field.db_name.as_str(), field.db_field.as_str()), ("roof_2", "flow"));

    let series = build_series(&store, &catalog, "Roof 2", "Outflow", None, false).await?;
    let values: Vec<f64> = series.points.iter().filter_map(|p| p.value.as_f64()).collect();
    assert_eq!(values, vec![1.0, 2.0]);
    Ok(())
}

#[tokio::test]
async fn renamed_sensors_do_not_mix_readings() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    ingest(&store, batch("pond_1", vec![row(at(1, 0), &[("lvl", 1.0)])]), None).await?;
    ingest(&store, batch("pond_2", vec![row(at(1, 0), &[("lvl", 7.0)])]), None).await?;
    let catalog = catalog_of(&store).await;

    let field = catalog.lookup("Pond 1", "Water level")?;
    assert_eq!(field.db_name, "pond_1");

    let series = build_series(&store, &catalog, "Pond 1", "Water level", None, false).await?;
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].value, FieldValue::Number(1.0));
    Ok(())
}

#[tokio::test]
async fn unknown_field_is_not_found() {
    // ---
    let store = MemoryReadingStore::new();
    let catalog = catalog_of(&store).await;
    let result = build_series(&store, &catalog, "Pond 1", "Water level", None, false).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn export_window_over_thirty_days_is_rejected() {
    // ---
    let window = TimeWindow::parse("2023-01-01", "2023-02-05").unwrap();
    assert!(matches!(
        window.check_export_limit(30),
        Err(AppError::PeriodTooLong { max_days: 30 })
    ));
}

#[tokio::test]
async fn delimited_upload_flows_into_catalog() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    let text = "Timestamp,lvl,batt\n,cm,V\n2023-05-01 00:00,10,12.9\n2023-05-01 00:15,11,12.8\n";
    let parsed = parse::delimited("NGIF (pond_1) May.csv", text)?;

    let outcome = ingest(&store, parsed, Some("127.0.0.1")).await?;
    assert_eq!(outcome.accepted, 2);

    let catalog = catalog_of(&store).await;
    let lvl = catalog.lookup("Pond 1", "Water level")?;
    // The lookup's unit override wins over the uploaded unit row.
    assert_eq!(lvl.units, "mm");
    assert_eq!(lvl.last_value, Some(FieldValue::Number(11.0)));
    assert_eq!(catalog.len(), 1);
    Ok(())
}

#[tokio::test]
async fn json_upload_records_units_per_sensor() -> Result<()> {
    // ---
    let store = MemoryReadingStore::new();
    let payload = serde_json::json!([
        {"time": "2023-05-01T10:00:00Z", "unitID": "eml_7", "temp": [9.5, "C"]},
        {"time": "2023-05-01T10:10:00Z", "unitID": "eml_7", "temp": [9.9, "C"]}
    ]);

    for parsed in parse::json_rows(&payload)? {
        ingest(&store, parsed, None).await?;
    }

    let catalog = catalog_of(&store).await;
    let temp = catalog.lookup("eml_7", "temp")?;
    assert_eq!(temp.label(), "temp (C)");
    assert_eq!(temp.location, "eml_7");
    Ok(())
}
