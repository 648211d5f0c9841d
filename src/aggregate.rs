//! Merge per-job APD values with crystallization flags and average them per
//! system, composition and hold length.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AnalysisError, Result};
use crate::series::{mean, standard_error};

/// One analysed job and its APD value, if the job produced one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApdRecord {
    pub system: String,
    pub composition: String,
    pub steps: u64,
    pub job: String,
    pub apd: Option<f64>,
}

/// Row of the external crystallization table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrystallizationRecord {
    pub alloy: String,
    #[serde(rename = "Comp")]
    pub comp: f64,
    #[serde(rename = "Thold")]
    pub thold: u64,
    #[serde(rename = "Job")]
    pub job: String,
    #[serde(rename = "Run Crystallized", deserialize_with = "deserialize_flag")]
    pub crystallized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedApd {
    pub system: String,
    pub composition: String,
    pub steps: u64,
    pub job: String,
    pub apd: Option<f64>,
    pub crystallized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApdSummary {
    pub system: String,
    pub composition: String,
    pub steps: u64,
    pub mean: f64,
    pub sem: f64,
    pub count: usize,
}

type JobKey = (String, String, u64, String);

/// Composition label used by the job tree: `("Cu-Zr", 0.5)` becomes `"Zr0.50"`.
pub fn format_composition(alloy: &str, comp: f64) -> Result<String> {
    let element = alloy
        .split('-')
        .nth(1)
        .filter(|element| !element.is_empty())
        .ok_or_else(|| {
            AnalysisError::invalid(format!("alloy '{alloy}' is not of the form A-B"))
        })?;
    Ok(format!("{element}{comp:.2}"))
}

/// Inner join on system, composition, steps and job, sorted by those keys.
pub fn merge_crystallization(
    apd: &[ApdRecord],
    crystallization: &[CrystallizationRecord],
) -> Result<Vec<JoinedApd>> {
    let mut flags: BTreeMap<JobKey, Vec<bool>> = BTreeMap::new();
    for record in crystallization {
        let key = (
            record.alloy.clone(),
            format_composition(&record.alloy, record.comp)?,
            record.thold,
            record.job.clone(),
        );
        flags.entry(key).or_default().push(record.crystallized);
    }

    let mut joined = Vec::with_capacity(apd.len());
    for record in apd {
        let key = (
            record.system.clone(),
            record.composition.clone(),
            record.steps,
            record.job.clone(),
        );
        let Some(matches) = flags.get(&key) else {
            continue;
        };
        for &crystallized in matches {
            joined.push(JoinedApd {
                system: record.system.clone(),
                composition: record.composition.clone(),
                steps: record.steps,
                job: record.job.clone(),
                apd: record.apd,
                crystallized,
            });
        }
    }

    joined.sort_by(|a, b| {
        (&a.system, &a.composition, a.steps, &a.job).cmp(&(
            &b.system,
            &b.composition,
            b.steps,
            &b.job,
        ))
    });
    Ok(joined)
}

/// Mean and standard error of APD over the jobs that stayed amorphous.
///
/// Missing values are skipped. Groups left with no values get a NaN mean;
/// groups with fewer than two get a NaN standard error.
pub fn summarize_apd(joined: &[JoinedApd]) -> Vec<ApdSummary> {
    let mut groups: BTreeMap<(&str, &str, u64), Vec<f64>> = BTreeMap::new();
    for record in joined.iter().filter(|r| !r.crystallized) {
        let values = groups
            .entry((record.system.as_str(), record.composition.as_str(), record.steps))
            .or_default();
        if let Some(apd) = record.apd.filter(|v| v.is_finite()) {
            values.push(apd);
        }
    }

    groups
        .into_iter()
        .map(|((system, composition, steps), values)| ApdSummary {
            system: system.to_string(),
            composition: composition.to_string(),
            steps,
            mean: mean(&values).unwrap_or(f64::NAN),
            sem: standard_error(&values).unwrap_or(f64::NAN),
            count: values.len(),
        })
        .collect()
}

pub fn load_apd_csv(path: impl AsRef<Path>) -> anyhow::Result<Vec<ApdRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open APD table {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(line, record)| {
            record.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))
        })
        .collect()
}

pub fn load_crystallization_csv(
    path: impl AsRef<Path>,
) -> anyhow::Result<Vec<CrystallizationRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open crystallization table {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(line, record)| {
            record.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))
        })
        .collect()
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean flag, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn apd(job: &str, steps: u64, value: Option<f64>) -> ApdRecord {
        ApdRecord {
            system: "Cu-Zr".into(),
            composition: "Zr0.50".into(),
            steps,
            job: job.into(),
            apd: value,
        }
    }

    fn cx(job: &str, thold: u64, crystallized: bool) -> CrystallizationRecord {
        CrystallizationRecord {
            alloy: "Cu-Zr".into(),
            comp: 0.5,
            thold,
            job: job.into(),
            crystallized,
        }
    }

    #[test]
    fn composition_uses_second_element() {
        assert_eq!(format_composition("Cu-Zr", 0.5).unwrap(), "Zr0.50");
        assert_eq!(format_composition("Al-Sm", 0.1).unwrap(), "Sm0.10");
        assert!(format_composition("CuZr", 0.5).is_err());
    }

    #[test]
    fn join_keeps_matching_jobs_sorted() {
        let records = vec![
            apd("job2", 100, Some(2.0)),
            apd("job1", 100, Some(1.0)),
            apd("job9", 100, None),
        ];
        let flags = vec![
            cx("job1", 100, false),
            cx("job2", 100, true),
            cx("job3", 100, false),
        ];

        let joined = merge_crystallization(&records, &flags).unwrap();
        let jobs: Vec<&str> = joined.iter().map(|j| j.job.as_str()).collect();
        assert_eq!(jobs, vec!["job1", "job2"]);
        assert!(joined[1].crystallized);
    }

    #[test]
    fn summary_drops_crystallized_and_missing() {
        let records = vec![
            apd("job1", 100, Some(1.0)),
            apd("job2", 100, Some(3.0)),
            apd("job3", 100, Some(50.0)),
            apd("job4", 100, None),
            apd("job1", 200, Some(4.0)),
        ];
        let flags = vec![
            cx("job1", 100, false),
            cx("job2", 100, false),
            cx("job3", 100, true),
            cx("job4", 100, false),
            cx("job1", 200, false),
        ];

        let summary = summarize_apd(&merge_crystallization(&records, &flags).unwrap());
        assert_eq!(summary.len(), 2);

        assert_eq!(summary[0].steps, 100);
        assert_eq!(summary[0].count, 2);
        assert_relative_eq!(summary[0].mean, 2.0);
        assert_relative_eq!(summary[0].sem, 1.0);

        assert_eq!(summary[1].count, 1);
        assert_relative_eq!(summary[1].mean, 4.0);
        assert!(summary[1].sem.is_nan());
    }

    #[test]
    fn loads_both_tables() {
        let mut apd_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(apd_file, "system,composition,steps,job,apd").unwrap();
        writeln!(apd_file, "Cu-Zr,Zr0.50,100,job1,0.25").unwrap();
        writeln!(apd_file, "Cu-Zr,Zr0.50,100,job2,").unwrap();
        apd_file.flush().unwrap();

        let mut cx_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(cx_file, "alloy,Comp,Thold,Job,Run Crystallized").unwrap();
        writeln!(cx_file, "Cu-Zr,0.5,100,job1,False").unwrap();
        writeln!(cx_file, "Cu-Zr,0.5,100,job2,True").unwrap();
        cx_file.flush().unwrap();

        let records = load_apd_csv(apd_file.path()).unwrap();
        assert_eq!(records[1].apd, None);
        let flags = load_crystallization_csv(cx_file.path()).unwrap();
        assert!(!flags[0].crystallized && flags[1].crystallized);

        let joined = merge_crystallization(&records, &flags).unwrap();
        assert_eq!(joined.len(), 2);
    }
}
