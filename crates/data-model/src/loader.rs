//! CSV readers for sensor, camera-IMU and skeleton data.
//!
//! The first column of every file is the time index; all other columns are
//! parsed as `f64` (empty cells become NaN).

use crate::config::SensorConfig;
use crate::timeseries::TimeSeries;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp};

/// Column identifying the tracked body in skeleton exports.
pub const BODY_INDEX_COLUMN: &str = "body_idx";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse an index cell: plain seconds, RFC 3339, or a naive UTC date/time.
pub fn parse_timestamp(text: &str) -> SyncplotResult<Timestamp> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<f64>() {
        if secs.is_finite() {
            return Ok(Timestamp::from_secs_f64(secs));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Timestamp::from_datetime(dt.with_timezone(&Utc))
            .ok_or_else(|| SyncplotError::data(format!("timestamp out of range: {text}")));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Timestamp::from_datetime(naive.and_utc())
                .ok_or_else(|| SyncplotError::data(format!("timestamp out of range: {text}")));
        }
    }
    Err(SyncplotError::data(format!("unparseable timestamp '{text}'")))
}

/// Read a comma-separated time series.
pub fn read_time_series(path: &Path) -> SyncplotResult<TimeSeries> {
    read_time_series_with(path, b',')
}

/// Read a time series with the given field delimiter.
pub fn read_time_series_with(path: &Path, delimiter: u8) -> SyncplotResult<TimeSeries> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SyncplotError::resource(path, e.to_string()))?;
    parse_series(reader, path)
}

fn parse_series<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
) -> SyncplotResult<TimeSeries> {
    let headers = reader
        .headers()
        .map_err(|e| SyncplotError::resource(path, e.to_string()))?
        .clone();
    if headers.len() < 2 {
        return Err(SyncplotError::data(format!(
            "{}: expected an index column and at least one data column",
            path.display()
        )));
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut data = vec![Vec::new(); columns.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SyncplotError::resource(path, e.to_string()))?;
        let line = row + 2;
        let mut fields = record.iter();
        let ts = fields.next().unwrap_or_default();
        index.push(parse_timestamp(ts).map_err(|e| {
            SyncplotError::data(format!("{}:{line}: {e}", path.display()))
        })?);
        for (c, column) in columns.iter().enumerate() {
            let cell = fields.next().unwrap_or_default();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>().map_err(|_| {
                    SyncplotError::data(format!(
                        "{}:{line}: column '{column}' holds non-numeric value '{cell}'",
                        path.display()
                    ))
                })?
            };
            data[c].push(value);
        }
    }

    TimeSeries::new(index, columns, data)
        .map_err(|e| SyncplotError::data(format!("{}: {e}", path.display())))
}

/// Read a `;`-separated skeleton export, keeping only the first tracked body.
pub fn read_skeleton(path: &Path) -> SyncplotResult<TimeSeries> {
    let series = read_time_series_with(path, b';')?;
    let Some(bodies) = series.column(BODY_INDEX_COLUMN) else {
        return Ok(series);
    };
    let first_body = bodies
        .iter()
        .copied()
        .filter(|b| b.is_finite())
        .fold(f64::INFINITY, f64::min);
    let bodies = bodies.to_vec();
    let filtered = series
        .retain_rows(|_, row| bodies[row] == first_body)
        .without_column(BODY_INDEX_COLUMN);
    tracing::debug!(
        path = %path.display(),
        rows = filtered.len(),
        body = first_body,
        "Loaded skeleton data"
    );
    Ok(filtered)
}

/// Read a sensor CSV, crop it to the configured window, and move its first
/// sample to timestamp zero.
pub fn load_sensor(config: &SensorConfig) -> SyncplotResult<TimeSeries> {
    let series = read_time_series(&config.path)?;
    let start = config.start_time.as_ref().map(|b| b.resolve()).transpose()?;
    let end = config.end_time.as_ref().map(|b| b.resolve()).transpose()?;

    let mut series = if start.is_some() || end.is_some() {
        series.crop(start, end)
    } else {
        series
    };
    if series.is_empty() {
        return Err(SyncplotError::data(format!(
            "{}: no samples in the selected time window",
            config.path.display()
        )));
    }
    series.epochize();
    tracing::info!(
        path = %config.path.display(),
        rows = series.len(),
        columns = series.columns().len(),
        "Loaded sensor data"
    );
    Ok(series)
}
