//! MSD against time over the whole hold window, measured from its first frame.

use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::job::FrameWindow;
use crate::mto::column_labels;
use crate::provider::DisplacementProvider;
use crate::table::Table;

/// One row per window frame: a column per label (aggregate first), then `time`.
///
/// Times are relative to the first frame, whose row is all zeros.
pub fn msd_curve<P>(provider: &P, window: &FrameWindow, species_labels: &[String]) -> Result<Table>
where
    P: DisplacementProvider + ?Sized,
{
    if window.frames.len() != window.times.len() {
        return Err(AnalysisError::invalid(
            "frame window has mismatched frames and times",
        ));
    }
    let (Some(&reference), Some(&start)) = (window.frames.first(), window.times.first()) else {
        return Err(AnalysisError::invalid("MSD curve of an empty frame window"));
    };

    let labels = column_labels(species_labels);
    let mut table = Table::new(labels.iter().cloned().chain(["time".to_string()]));
    for (&frame, &time) in window.frames.iter().zip(&window.times) {
        let msd = provider.msd(reference, frame)?;
        let mut row = labels
            .iter()
            .map(|label| msd.require(label))
            .collect::<Result<Vec<f64>>>()?;
        row.push(time - start);
        table.push_row(row)?;
    }

    debug!(rows = table.len(), "msd curve computed");
    Ok(table)
}
