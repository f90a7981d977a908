//! Timestamp-indexed multi-column series.

use crate::groups::ColumnSelection;
use chrono::TimeDelta;
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp};

/// A table of `f64` columns sharing one non-decreasing timestamp index.
///
/// Values are stored column-major so that plotting and signal extraction can
/// borrow a whole column as a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    index: Vec<Timestamp>,
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl TimeSeries {
    /// Build a series, validating shape and index ordering.
    pub fn new(
        index: Vec<Timestamp>,
        columns: Vec<String>,
        data: Vec<Vec<f64>>,
    ) -> SyncplotResult<Self> {
        if columns.len() != data.len() {
            return Err(SyncplotError::data(format!(
                "{} column names for {} data columns",
                columns.len(),
                data.len()
            )));
        }
        for (name, values) in columns.iter().zip(&data) {
            if values.len() != index.len() {
                return Err(SyncplotError::data(format!(
                    "column '{name}' has {} values but the index has {}",
                    values.len(),
                    index.len()
                )));
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(SyncplotError::data(format!("duplicate column '{name}'")));
            }
        }
        if let Some(pos) = index.windows(2).position(|w| w[1] < w[0]) {
            return Err(SyncplotError::data(format!(
                "index decreases at row {}: {} < {}",
                pos + 1,
                index[pos + 1],
                index[pos]
            )));
        }
        Ok(Self {
            index,
            columns,
            data,
        })
    }

    /// Build a series from row-major samples.
    pub fn from_rows(
        index: Vec<Timestamp>,
        columns: Vec<String>,
        rows: &[Vec<f64>],
    ) -> SyncplotResult<Self> {
        let mut data = vec![Vec::with_capacity(rows.len()); columns.len()];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SyncplotError::data(format!(
                    "row {r} has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in data.iter_mut().zip(row) {
                column.push(*value);
            }
        }
        Self::new(index, columns, data)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    /// First and last timestamp, or `None` for an empty series.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        Some((*self.index.first()?, *self.index.last()?))
    }

    /// Sub-series holding the columns named by `selection`, in resolved order.
    pub fn select(&self, selection: &ColumnSelection) -> SyncplotResult<TimeSeries> {
        let names = selection.resolve(&self.columns)?;
        self.select_columns(&names)
    }

    /// Sub-series holding exactly `names`; every name must exist.
    pub fn select_columns(&self, names: &[String]) -> SyncplotResult<TimeSeries> {
        let mut data = Vec::with_capacity(names.len());
        for name in names {
            let values = self
                .column(name)
                .ok_or_else(|| SyncplotError::data(format!("Unknown columns: {name}")))?;
            data.push(values.to_vec());
        }
        Self::new(self.index.clone(), names.to_vec(), data)
    }

    /// Row-major copy of the values (`rows[time][column]`).
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.len())
            .map(|r| self.data.iter().map(|c| c[r]).collect())
            .collect()
    }

    /// Add `offset` to every timestamp.
    ///
    /// This is the raw primitive: it applies unconditionally every time it is
    /// called. Renderers guard against applying their offset twice.
    pub fn shift_index(&mut self, offset: TimeDelta) {
        for ts in &mut self.index {
            *ts = ts.shifted(offset);
        }
    }

    /// Re-base the index so the first sample sits at timestamp zero.
    pub fn epochize(&mut self) {
        if let Some(&first) = self.index.first() {
            let shift = Timestamp::ZERO.since(first);
            self.shift_index(shift);
        }
    }

    /// Keep rows whose timestamp lies within `[start, end]` (either bound optional).
    pub fn crop(&self, start: Option<Timestamp>, end: Option<Timestamp>) -> TimeSeries {
        self.retain_rows(|ts, _| start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e))
    }

    /// Keep rows for which `keep(timestamp, row_index)` holds.
    pub fn retain_rows(&self, mut keep: impl FnMut(Timestamp, usize) -> bool) -> TimeSeries {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&r| keep(self.index[r], r))
            .collect();
        TimeSeries {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|c| rows.iter().map(|&r| c[r]).collect())
                .collect(),
        }
    }

    /// Copy without the named column (a no-op if it is absent).
    pub fn without_column(&self, name: &str) -> TimeSeries {
        let mut out = self.clone();
        if let Some(i) = out.columns.iter().position(|c| c == name) {
            out.columns.remove(i);
            out.data.remove(i);
        }
        out
    }

    /// Append a derived column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> SyncplotResult<Self> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(SyncplotError::data(format!(
                "column '{name}' has {} values but the index has {}",
                values.len(),
                self.len()
            )));
        }
        if self.columns.contains(&name) {
            return Err(SyncplotError::data(format!("duplicate column '{name}'")));
        }
        self.columns.push(name);
        self.data.push(values);
        Ok(self)
    }

    /// Minimum and maximum finite value over `names`.
    ///
    /// Returns `None` when the columns hold no finite value.
    pub fn value_range(&self, names: &[String]) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for name in names {
            for &v in self.column(name).into_iter().flatten() {
                if !v.is_finite() {
                    continue;
                }
                range = Some(match range {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                });
            }
        }
        range
    }

    /// Row to display for `ts`.
    ///
    /// At or beyond the last timestamp this is the last row; an exact match
    /// is that row; otherwise it is the first row whose timestamp is greater
    /// than `ts`. Returns `None` for an empty series.
    pub fn nearest_index(&self, ts: Timestamp) -> Option<usize> {
        let last = *self.index.last()?;
        if ts >= last {
            return Some(self.index.len() - 1);
        }
        Some(self.index.partition_point(|&t| t < ts))
    }
}
