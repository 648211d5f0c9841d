use std::collections::BTreeMap;

use crate::error::{AnalysisError, Result};

/// Label of the aggregate column covering every particle.
pub const ALL_LABEL: &str = "all";

/// Mean-squared displacement per species label between two frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesMsd {
    values: BTreeMap<String, f64>,
}

impl SpeciesMsd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, msd: f64) {
        self.values.insert(label.into(), msd);
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.values.get(label).copied()
    }

    /// Value for `label`, or a provider error naming the missing label.
    pub fn require(&self, label: &str) -> Result<f64> {
        self.get(label).ok_or_else(|| {
            AnalysisError::provider(format!("no MSD reported for species '{label}'"))
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for SpeciesMsd {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Source of per-species MSD between a reference frame and a target frame.
///
/// Calls may block. Implementations report failures as
/// [`AnalysisError::Provider`].
pub trait DisplacementProvider {
    fn msd(&self, reference_frame: usize, target_frame: usize) -> Result<SpeciesMsd>;
}

impl<P: DisplacementProvider + ?Sized> DisplacementProvider for &P {
    fn msd(&self, reference_frame: usize, target_frame: usize) -> Result<SpeciesMsd> {
        (**self).msd(reference_frame, target_frame)
    }
}
