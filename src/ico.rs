//! Icosahedral short-range order from Voronoi indices.

use std::path::Path;

use anyhow::Context;

use crate::error::{AnalysisError, Result};

/// Edge count of the faces that make up an icosahedron.
pub const DEFAULT_EDGES: usize = 5;
/// Face count of a full ⟨0,0,12,0⟩ icosahedron.
pub const DEFAULT_FACES: u32 = 12;

/// Fraction of atoms whose Voronoi cell has at least `faces` faces with
/// `edges` edges.
///
/// Entry `j` of a row counts the faces with `j + 1` edges. Rows shorter
/// than `edges` count as zero in the missing entries.
pub fn icosahedral_fraction(indices: &[Vec<u32>], edges: usize, faces: u32) -> Result<f64> {
    if edges == 0 {
        return Err(AnalysisError::invalid("edge count must be at least 1"));
    }
    if indices.is_empty() {
        return Err(AnalysisError::degenerate("no Voronoi indices supplied"));
    }

    let matching = indices
        .iter()
        .filter(|row| row.get(edges - 1).copied().unwrap_or(0) >= faces)
        .count();
    Ok(matching as f64 / indices.len() as f64)
}

/// Read headerless rows of Voronoi indices. Blank cells count as zero.
pub fn load_voronoi_csv(path: impl AsRef<Path>) -> anyhow::Result<Vec<Vec<u32>>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open Voronoi table {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed row {} in {}", line + 1, path.display()))?;
        let row = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    Ok(0)
                } else {
                    cell.parse::<u32>()
                }
            })
            .collect::<std::result::Result<Vec<u32>, _>>()
            .with_context(|| {
                format!("Non-integer Voronoi index on row {} of {}", line + 1, path.display())
            })?;
        rows.push(row);
    }
    Ok(rows)
}
