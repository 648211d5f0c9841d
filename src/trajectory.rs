//! In-memory trajectory of unwrapped particle coordinates.
//!
//! Frames are indexed from zero in recording order. Coordinates must already
//! be unwrapped across periodic boundaries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, anyhow};
use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};
use crate::provider::{ALL_LABEL, DisplacementProvider, SpeciesMsd};

pub type Position = Vector3<f64>;

#[derive(Debug, Clone)]
pub struct Trajectory {
    steps: Vec<u64>,
    species: Vec<String>,
    frames: Vec<Vec<Position>>,
}

impl Trajectory {
    pub fn new(steps: Vec<u64>, species: Vec<String>, frames: Vec<Vec<Position>>) -> Result<Self> {
        if steps.len() != frames.len() {
            return Err(AnalysisError::invalid(format!(
                "{} timesteps supplied for {} frames",
                steps.len(),
                frames.len()
            )));
        }
        if species.is_empty() {
            return Err(AnalysisError::invalid("trajectory has no particles"));
        }
        if let Some(pair) = steps.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(AnalysisError::invalid(format!(
                "timesteps must increase strictly, got {} after {}",
                pair[1], pair[0]
            )));
        }
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != species.len())
        {
            return Err(AnalysisError::invalid(format!(
                "frame {index} holds {} positions, expected {}",
                frame.len(),
                species.len()
            )));
        }
        Ok(Self {
            steps,
            species,
            frames,
        })
    }

    pub fn steps(&self) -> &[u64] {
        &self.steps
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn particle_count(&self) -> usize {
        self.species.len()
    }

    /// Distinct species labels in order of first appearance.
    pub fn species_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in &self.species {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    fn frame(&self, index: usize) -> Result<&[Position]> {
        self.frames.get(index).map(Vec::as_slice).ok_or_else(|| {
            AnalysisError::provider(format!(
                "frame {index} requested from a trajectory of {} frames",
                self.frames.len()
            ))
        })
    }
}

impl DisplacementProvider for Trajectory {
    fn msd(&self, reference_frame: usize, target_frame: usize) -> Result<SpeciesMsd> {
        let reference = self.frame(reference_frame)?;
        let target = self.frame(target_frame)?;

        let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut all = 0.0;
        for ((start, end), label) in reference.iter().zip(target).zip(&self.species) {
            let squared = (end - start).norm_squared();
            all += squared;
            let entry = totals.entry(label.as_str()).or_insert((0.0, 0));
            entry.0 += squared;
            entry.1 += 1;
        }

        let mut msd: SpeciesMsd = totals
            .into_iter()
            .map(|(label, (sum, count))| (label, sum / count as f64))
            .collect();
        msd.insert(ALL_LABEL, all / self.species.len() as f64);
        Ok(msd)
    }
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    step: u64,
    id: u64,
    species: String,
    x: f64,
    y: f64,
    z: f64,
}

/// Load a `step,id,species,x,y,z` table of unwrapped coordinates.
///
/// Rows may come in any particle order within a step; steps must be
/// contiguous and every step must list the same particles.
pub fn load_positions_csv(path: impl AsRef<Path>) -> anyhow::Result<Trajectory> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open positions table {}", path.display()))?;

    let mut steps: Vec<u64> = Vec::new();
    let mut blocks: Vec<Vec<PositionRow>> = Vec::new();
    for (line, record) in reader.deserialize::<PositionRow>().enumerate() {
        let row = record
            .with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        if steps.last() != Some(&row.step) {
            if steps.contains(&row.step) {
                return Err(anyhow!(
                    "Step {} appears in more than one block of {}",
                    row.step,
                    path.display()
                ));
            }
            steps.push(row.step);
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(row);
        }
    }

    let mut species: Option<Vec<(u64, String)>> = None;
    let mut frames = Vec::with_capacity(blocks.len());
    for (mut block, step) in blocks.into_iter().zip(&steps) {
        block.sort_by_key(|row| row.id);
        let identity: Vec<(u64, String)> = block
            .iter()
            .map(|row| (row.id, row.species.clone()))
            .collect();
        if let Some(expected) = &species {
            if *expected != identity {
                return Err(anyhow!(
                    "Step {} lists different particles than the first step in {}",
                    step,
                    path.display()
                ));
            }
        } else {
            species = Some(identity);
        }
        frames.push(
            block
                .iter()
                .map(|row| Position::new(row.x, row.y, row.z))
                .collect(),
        );
    }

    let species = species
        .ok_or_else(|| anyhow!("Positions table {} has no rows", path.display()))?
        .into_iter()
        .map(|(_, label)| label)
        .collect();

    Trajectory::new(steps, species, frames)
        .with_context(|| format!("Inconsistent trajectory in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn two_species() -> Trajectory {
        let origin = vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(1.0, 0.0, 0.0),
            Position::new(0.0, 1.0, 0.0),
        ];
        let moved = vec![
            Position::new(1.0, 0.0, 0.0),
            Position::new(1.0, 2.0, 0.0),
            Position::new(0.0, 1.0, 3.0),
        ];
        Trajectory::new(
            vec![0, 100],
            vec!["Cu".into(), "Zr".into(), "Zr".into()],
            vec![origin, moved],
        )
        .unwrap()
    }

    #[test]
    fn msd_is_averaged_per_species_and_overall() {
        let trajectory = two_species();
        let msd = trajectory.msd(0, 1).unwrap();
        assert_relative_eq!(msd.require("Cu").unwrap(), 1.0);
        assert_relative_eq!(msd.require("Zr").unwrap(), 6.5);
        assert_relative_eq!(msd.require(ALL_LABEL).unwrap(), 14.0 / 3.0);
        assert_eq!(trajectory.msd(1, 1).unwrap().require(ALL_LABEL).unwrap(), 0.0);
    }

    #[test]
    fn out_of_range_frame_is_a_provider_error() {
        let trajectory = two_species();
        assert!(matches!(
            trajectory.msd(0, 2),
            Err(AnalysisError::Provider(_))
        ));
    }

    #[test]
    fn ragged_frames_are_rejected() {
        let result = Trajectory::new(
            vec![0, 1],
            vec!["Cu".into()],
            vec![vec![Position::zeros()], vec![]],
        );
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
    }

    #[test]
    fn species_labels_keep_first_appearance_order() {
        assert_eq!(two_species().species_labels(), vec!["Cu", "Zr"]);
    }

    #[test]
    fn loads_positions_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step,id,species,x,y,z").unwrap();
        writeln!(file, "0,2,Zr,1.0,0.0,0.0").unwrap();
        writeln!(file, "0,1,Cu,0.0,0.0,0.0").unwrap();
        writeln!(file, "10,1,Cu,0.5,0.0,0.0").unwrap();
        writeln!(file, "10,2,Zr,1.0,0.0,2.0").unwrap();
        file.flush().unwrap();

        let trajectory = load_positions_csv(file.path()).unwrap();
        assert_eq!(trajectory.steps(), &[0, 10]);
        assert_eq!(trajectory.particle_count(), 2);
        let msd = trajectory.msd(0, 1).unwrap();
        assert_relative_eq!(msd.require("Cu").unwrap(), 0.25);
        assert_relative_eq!(msd.require("Zr").unwrap(), 4.0);
    }

    #[test]
    fn unordered_steps_are_rejected() {
        let frame = vec![Position::zeros()];
        let result = Trajectory::new(
            vec![0, 600, 500, 700],
            vec!["Cu".into()],
            vec![frame.clone(), frame.clone(), frame.clone(), frame],
        );
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step,id,species,x,y,z").unwrap();
        for step in [0, 600, 500, 700] {
            writeln!(file, "{step},1,Cu,0,0,0").unwrap();
        }
        file.flush().unwrap();
        assert!(load_positions_csv(file.path()).is_err());
    }

    #[test]
    fn rejects_particle_mismatch_between_steps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step,id,species,x,y,z").unwrap();
        writeln!(file, "0,1,Cu,0,0,0").unwrap();
        writeln!(file, "10,2,Cu,0,0,0").unwrap();
        file.flush().unwrap();
        assert!(load_positions_csv(file.path()).is_err());
    }
}
