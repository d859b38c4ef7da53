//! Time-windowed series queries.
//!
//! Resolves a display `(name, field)` pair through the [`Catalog`], queries the
//! store by the raw storage keys only, and shapes the result into a labelled
//! [`Series`]. No interpolation or gap filling: one point per stored reading.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};

use crate::catalog::Catalog;
use crate::error::{AppError, Result};
use crate::models::{CanonicalField, FieldValue, ReadingQuery, Series};
use crate::store::ReadingStore;

// ---

/// Inclusive range of calendar days, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        // ---
        if end < start {
            return Err(AppError::validation(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse two ISO dates (`YYYY-MM-DD`, or a datetime whose date part is used).
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// `[start 00:00, end + 1 day 00:00)`: the end date covers its whole day.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        // ---
        let end = self
            .end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::validation(format!("end date {} out of range", self.end)))?;
        Ok((
            self.start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end.and_time(chrono::NaiveTime::MIN).and_utc(),
        ))
    }

    /// Whole days between start and end.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Reject windows longer than `max_days`; exactly `max_days` is allowed.
    pub fn check_export_limit(&self, max_days: u32) -> Result<()> {
        // ---
        if self.days() > i64::from(max_days) {
            return Err(AppError::PeriodTooLong { max_days });
        }
        Ok(())
    }
}

/// Parse an ISO date, accepting a full datetime and keeping its date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    // ---
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(dt.date());
        }
    }
    Err(AppError::validation(format!("invalid date '{input}'")))
}

/// Query and shape the series for one display `(name, field)` pair.
pub async fn build_series(
    store: &dyn ReadingStore,
    catalog: &Catalog,
    display_name: &str,
    display_field: &str,
    window: Option<TimeWindow>,
    smooth: bool,
) -> Result<Series> {
    // ---
    let field = catalog.lookup(display_name, display_field)?;
    series_for_field(store, field, window, smooth).await
}

/// Query and shape the series for an already resolved catalog field.
pub async fn series_for_field(
    store: &dyn ReadingStore,
    field: &CanonicalField,
    window: Option<TimeWindow>,
    smooth: bool,
) -> Result<Series> {
    // ---
    let query = ReadingQuery {
        name: field.db_name.clone(),
        field: field.db_field.clone(),
        bounds: window.map(|w| w.bounds()).transpose()?,
    };

    tracing::debug!(
        "Querying {}/{} as {}/{} window={:?} smooth={}",
        field.display_name,
        field.display_field,
        query.name,
        query.field,
        window,
        smooth
    );

    let mut points = store.find_readings(&query).await?;

    if smooth && !points.is_empty() {
        let mut values = points
            .iter()
            .map(|p| {
                p.value.as_f64().ok_or_else(|| {
                    AppError::validation(format!(
                        "cannot smooth non-numeric value '{}' in {}",
                        p.value,
                        field.label()
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        smooth_zero_runs(&mut values);
        for (point, value) in points.iter_mut().zip(values) {
            point.value = FieldValue::Number(value);
        }
    }

    tracing::info!("Series {} has {} points", field.label(), points.len());

    Ok(Series {
        label: field.label(),
        points,
    })
}

/// Spread each non-zero value evenly over itself and the zeros right before it.
///
/// Models counters that report an accumulated total only every so often:
/// `[0, 0, 6]` becomes `[2, 2, 2]`. Zeros with no closing non-zero value
/// after them are left as they are.
pub fn smooth_zero_runs(values: &mut [f64]) {
    // ---
    let mut run_start = 0;
    for i in 0..values.len() {
        let value = values[i];
        if value != 0.0 {
            let share = value / (i - run_start + 1) as f64;
            for v in &mut values[run_start..=i] {
                *v = share;
            }
            run_start = i + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn smoothed(values: &[f64]) -> Vec<f64> {
        let mut v = values.to_vec();
        smooth_zero_runs(&mut v);
        v
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_smoothing_closed_run() {
        // ---
        assert_eq!(smoothed(&[0.0, 0.0, 6.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_smoothing_trailing_zeros_untouched() {
        // ---
        assert_eq!(smoothed(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(smoothed(&[4.0, 0.0, 0.0]), vec![4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_smoothing_single_and_mixed() {
        // ---
        assert_eq!(smoothed(&[5.0]), vec![5.0]);
        assert_eq!(smoothed(&[]), Vec::<f64>::new());
        assert_eq!(
            smoothed(&[3.0, 0.0, 8.0, 0.0, 0.0, 0.0, 4.0, 0.0]),
            vec![3.0, 4.0, 4.0, 1.0, 1.0, 1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_smoothing_is_stable_on_closed_sequences() {
        // ---
        let once = smoothed(&[0.0, 0.0, 6.0]);
        assert_eq!(smoothed(&once), once);
    }

    #[test]
    fn test_window_bounds_cover_end_day() {
        // ---
        let window = TimeWindow::parse("2023-01-01", "2023-01-02").unwrap();
        let (start, end) = window.bounds().unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_date_formats() {
        // ---
        assert_eq!(parse_date("2023-04-05").unwrap(), date(2023, 4, 5));
        assert_eq!(parse_date("2023-04-05T13:20:00").unwrap(), date(2023, 4, 5));
        assert_eq!(
            parse_date("2023-04-05T13:20:00+00:00").unwrap(),
            date(2023, 4, 5)
        );
        assert!(matches!(
            parse_date("05/04/2023"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(parse_date("yesterday"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_reversed_window_rejected() {
        // ---
        assert!(matches!(
            TimeWindow::parse("2023-02-01", "2023-01-01"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_export_limit() {
        // ---
        let long = TimeWindow::parse("2023-01-01", "2023-02-05").unwrap();
        assert_eq!(long.days(), 35);
        assert!(matches!(
            long.check_export_limit(30),
            Err(AppError::PeriodTooLong { max_days: 30 })
        ));

        let exact = TimeWindow::parse("2023-01-01", "2023-01-31").unwrap();
        assert_eq!(exact.days(), 30);
        assert!(exact.check_export_limit(30).is_ok());
    }
}
