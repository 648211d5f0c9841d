use serde::Serialize;

use crate::error::{AnalysisError, Result};

/// Named columns over rows of floats, ready for export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AnalysisError::invalid(format!(
                "row of width {} does not fit {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build a table from equal-or-unequal length columns, padding with NaN.
    pub fn from_ragged_columns(columns: Vec<(String, Vec<f64>)>) -> Self {
        let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let rows = (0..height)
            .map(|row| {
                columns
                    .iter()
                    .map(|(_, values)| values.get(row).copied().unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();
        Self {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
        }
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
