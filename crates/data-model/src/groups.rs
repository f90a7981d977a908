//! Column selection and plot-group resolution.
//!
//! A pattern is either a substring (every column containing it) or an
//! explicit list of column names (all of which must exist).

use serde::{Deserialize, Serialize};
use syncplot_common::{SyncplotError, SyncplotResult};

/// Selection of columns from a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelection {
    /// Every column whose name contains the string.
    Substring(String),
    /// Exactly these columns, in this order.
    Exact(Vec<String>),
}

impl ColumnSelection {
    /// Resolve against the available column names.
    ///
    /// A substring may match nothing (yielding an empty list); an exact list
    /// fails with a data error naming every missing column.
    pub fn resolve(&self, available: &[String]) -> SyncplotResult<Vec<String>> {
        match self {
            ColumnSelection::Substring(pattern) => Ok(available
                .iter()
                .filter(|c| c.contains(pattern.as_str()))
                .cloned()
                .collect()),
            ColumnSelection::Exact(names) => {
                let missing: Vec<&str> = names
                    .iter()
                    .filter(|n| !available.contains(*n))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    Ok(names.clone())
                } else {
                    Err(SyncplotError::data(format!(
                        "Unknown columns: {}",
                        missing.join(", ")
                    )))
                }
            }
        }
    }
}

/// A user-supplied grouping pattern for plot axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupPattern {
    /// All columns containing the substring; the substring is the group name.
    Substring(String),
    /// Explicit columns; the group name is the column names joined.
    Columns(Vec<String>),
    /// Explicit columns with a caller-supplied label.
    Labeled { label: String, columns: Vec<String> },
}

impl GroupPattern {
    /// Display name of the group this pattern produces.
    pub fn label(&self) -> String {
        match self {
            GroupPattern::Substring(s) => s.clone(),
            GroupPattern::Columns(names) => names.join(", "),
            GroupPattern::Labeled { label, .. } => label.clone(),
        }
    }

    fn selection(&self) -> ColumnSelection {
        match self {
            GroupPattern::Substring(s) => ColumnSelection::Substring(s.clone()),
            GroupPattern::Columns(names) | GroupPattern::Labeled { columns: names, .. } => {
                ColumnSelection::Exact(names.clone())
            }
        }
    }
}

/// Columns plotted together on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphGroup {
    pub name: String,
    pub columns: Vec<String>,
}

/// Partition `columns` into plot groups.
///
/// Without patterns every column becomes its own group named after it.
/// With patterns, groups follow pattern order; a substring that matches
/// nothing yields an empty group, and an explicit list naming an unknown
/// column is a data error.
pub fn resolve_groups(
    columns: &[String],
    patterns: Option<&[GroupPattern]>,
) -> SyncplotResult<Vec<GraphGroup>> {
    let Some(patterns) = patterns else {
        return Ok(columns
            .iter()
            .map(|c| GraphGroup {
                name: c.clone(),
                columns: vec![c.clone()],
            })
            .collect());
    };

    patterns
        .iter()
        .map(|pattern| {
            Ok(GraphGroup {
                name: pattern.label(),
                columns: pattern.selection().resolve(columns)?,
            })
        })
        .collect()
}
