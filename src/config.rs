use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::ico::{DEFAULT_EDGES, DEFAULT_FACES};
use crate::job::JobParameters;

#[derive(Debug, Deserialize)]
struct ConfigRoot {
    job: JobParameters,
    #[serde(default)]
    analysis: AnalysisSection,
    input: InputSection,
    #[serde(default)]
    ico: IcoSection,
    output: OutputSection,
}

#[derive(Debug, Deserialize)]
struct BatchConfigRoot {
    #[serde(default)]
    analysis: Option<AnalysisSection>,
    #[serde(default)]
    ico: Option<IcoSection>,
    jobs: Vec<BatchJobSection>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct AnalysisSection {
    #[serde(default = "default_significance_level")]
    significance_level: f64,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            significance_level: default_significance_level(),
        }
    }
}

fn default_significance_level() -> f64 {
    0.05
}

#[derive(Debug, Deserialize)]
struct InputSection {
    positions: PathBuf,
    #[serde(default)]
    voronoi: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct IcoSection {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default = "default_edges")]
    edges: usize,
    #[serde(default = "default_faces")]
    faces: u32,
}

impl Default for IcoSection {
    fn default() -> Self {
        Self {
            enabled: None,
            edges: default_edges(),
            faces: default_faces(),
        }
    }
}

fn default_edges() -> usize {
    DEFAULT_EDGES
}

fn default_faces() -> u32 {
    DEFAULT_FACES
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    directory: PathBuf,
    #[serde(default = "default_raw_csv")]
    raw_csv: PathBuf,
    #[serde(default = "default_settled_csv")]
    settled_csv: PathBuf,
    #[serde(default = "default_summary_csv")]
    summary_csv: PathBuf,
    #[serde(default = "default_summary_json")]
    summary_json: PathBuf,
    #[serde(default = "default_msd_csv")]
    msd_csv: PathBuf,
    #[serde(default)]
    toggles: OutputTogglesSection,
}

fn default_raw_csv() -> PathBuf {
    PathBuf::from("diffusion_mto.csv")
}

fn default_settled_csv() -> PathBuf {
    PathBuf::from("diffusion_mto_settled.csv")
}

fn default_summary_csv() -> PathBuf {
    PathBuf::from("diffusion_settled.csv")
}

fn default_summary_json() -> PathBuf {
    PathBuf::from("diffusion.json")
}

fn default_msd_csv() -> PathBuf {
    PathBuf::from("msd.csv")
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct OutputTogglesSection {
    #[serde(default = "default_true")]
    csv: bool,
    #[serde(default = "default_true")]
    json: bool,
    #[serde(default = "default_true")]
    msd: bool,
}

impl Default for OutputTogglesSection {
    fn default() -> Self {
        Self {
            csv: true,
            json: true,
            msd: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BatchJobSection {
    name: String,
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
    pub significance_level: f64,
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.significance_level > 0.0 && self.significance_level < 1.0,
            "significance_level must lie in (0, 1), got {}",
            self.significance_level
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputPaths {
    pub positions: PathBuf,
    pub voronoi: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcoSettings {
    pub enabled: bool,
    pub edges: usize,
    pub faces: u32,
}

impl IcoSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.edges >= 1, "ico edges must be at least 1");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputToggles {
    pub csv: bool,
    pub json: bool,
    /// MSD curve over the whole hold window.
    pub msd: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub directory: PathBuf,
    pub raw_csv: PathBuf,
    pub settled_csv: PathBuf,
    pub summary_csv: PathBuf,
    pub summary_json: PathBuf,
    pub msd_csv: PathBuf,
    pub toggles: OutputToggles,
}

/// One job's analysis configuration. Relative paths are already resolved
/// against the directory of the configuration file.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    pub source: PathBuf,
    pub job: JobParameters,
    pub analysis: AnalysisSettings,
    pub input: InputPaths,
    pub ico: IcoSettings,
    pub output: OutputPaths,
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<()> {
        self.job.validate().context("invalid [job] section")?;
        self.analysis.validate()?;
        self.ico.validate()?;
        if self.ico.enabled {
            ensure!(
                self.input.voronoi.is_some(),
                "[ico] is enabled but [input] names no voronoi table"
            );
        }
        Ok(())
    }

    /// Human friendly description of key configuration choices.
    pub fn summary_lines(&self) -> Vec<String> {
        let hold = format!(
            "hold: phase {} starts at step {} (timestep {} ps)",
            self.job.hold_phase,
            self.job.hold_start(),
            self.job.timestep
        );
        let species = format!("species: {}", self.job.elements.join(", "));
        let alpha = format!(
            "settling significance level: {}",
            self.analysis.significance_level
        );
        let ico = if self.ico.enabled {
            format!(
                "icosahedral fraction: <{} faces with {} edges>",
                self.ico.faces, self.ico.edges
            )
        } else {
            "icosahedral fraction: disabled".to_string()
        };
        let output = format!("output: {}", self.output.directory.display());
        vec![hold, species, alpha, ico, output]
    }
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub name: String,
    pub config: PathBuf,
}

/// Batch-wide `[ico]` section. `enabled` only overrides a job when set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcoOverride {
    pub enabled: Option<bool>,
    pub edges: usize,
    pub faces: u32,
}

#[derive(Debug, Clone)]
pub struct BatchParams {
    pub analysis: Option<AnalysisSettings>,
    pub ico: Option<IcoOverride>,
    pub jobs: Vec<BatchJob>,
}

impl BatchParams {
    /// Apply the batch-wide sections on top of a job's own configuration.
    pub fn apply_to(&self, params: &mut AnalysisParams) -> Result<()> {
        if let Some(analysis) = self.analysis {
            params.analysis = analysis;
        }
        if let Some(ico) = self.ico {
            params.ico.edges = ico.edges;
            params.ico.faces = ico.faces;
            if let Some(enabled) = ico.enabled {
                params.ico.enabled = enabled;
            }
        }
        params.validate()
    }
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<AnalysisParams> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let parsed: ConfigRoot =
        toml::from_str(&raw).context("Failed to parse analysis configuration")?;

    let base = config_directory(path);
    let has_voronoi = parsed.input.voronoi.is_some();
    let params = AnalysisParams {
        source: path.to_path_buf(),
        job: parsed.job,
        analysis: analysis_settings(parsed.analysis),
        input: InputPaths {
            positions: resolve_relative(&base, &parsed.input.positions),
            voronoi: parsed
                .input
                .voronoi
                .as_deref()
                .map(|voronoi| resolve_relative(&base, voronoi)),
        },
        ico: ico_settings(parsed.ico, has_voronoi),
        output: OutputPaths {
            directory: resolve_relative(&base, &parsed.output.directory),
            raw_csv: parsed.output.raw_csv,
            settled_csv: parsed.output.settled_csv,
            summary_csv: parsed.output.summary_csv,
            summary_json: parsed.output.summary_json,
            msd_csv: parsed.output.msd_csv,
            toggles: OutputToggles {
                csv: parsed.output.toggles.csv,
                json: parsed.output.toggles.json,
                msd: parsed.output.toggles.msd,
            },
        },
    };

    params
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(params)
}

pub fn load_batch_from_file(path: impl AsRef<Path>) -> Result<BatchParams> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let parsed: BatchConfigRoot =
        toml::from_str(&raw).context("Failed to parse batch configuration")?;
    ensure!(!parsed.jobs.is_empty(), "Batch configuration lists no jobs");

    let analysis = parsed.analysis.map(analysis_settings);
    if let Some(settings) = &analysis {
        settings.validate()?;
    }
    let ico = parsed.ico.map(|section| IcoOverride {
        enabled: section.enabled,
        edges: section.edges,
        faces: section.faces,
    });
    if let Some(settings) = &ico {
        ensure!(settings.edges >= 1, "ico edges must be at least 1");
    }

    let base = config_directory(path);
    Ok(BatchParams {
        analysis,
        ico,
        jobs: parsed
            .jobs
            .into_iter()
            .map(|job| BatchJob {
                name: job.name,
                config: resolve_relative(&base, &job.config),
            })
            .collect(),
    })
}

fn analysis_settings(section: AnalysisSection) -> AnalysisSettings {
    AnalysisSettings {
        significance_level: section.significance_level,
    }
}

/// An unset `enabled` follows whether a Voronoi table is configured.
fn ico_settings(section: IcoSection, has_voronoi: bool) -> IcoSettings {
    IcoSettings {
        enabled: section.enabled.unwrap_or(has_voronoi),
        edges: section.edges,
        faces: section.faces,
    }
}

fn config_directory(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_relative(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [job]
        timestep = 0.001
        runsteps = [100, 100, 100, 100, 100, 1000]
        elements = ["Cu", "Zr"]

        [input]
        positions = "positions.csv"
        voronoi = "voronoi.csv"

        [output]
        directory = "out"
    "#;

    fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "job.toml", MINIMAL);
        let params = load_from_file(&path).unwrap();

        assert_eq!(params.analysis.significance_level, 0.05);
        assert_eq!(params.ico.edges, 5);
        assert_eq!(params.ico.faces, 12);
        assert!(params.ico.enabled);
        assert_eq!(params.input.positions, dir.path().join("positions.csv"));
        assert_eq!(params.output.directory, dir.path().join("out"));
        assert_eq!(params.output.raw_csv, PathBuf::from("diffusion_mto.csv"));
        assert!(params.output.toggles.csv && params.output.toggles.json);
        assert!(params.output.toggles.msd);
        assert_eq!(params.output.msd_csv, PathBuf::from("msd.csv"));
        assert_eq!(params.job.hold_start(), 500);
    }

    #[test]
    fn rejects_bad_significance_level() {
        let dir = tempfile::tempdir().unwrap();
        let contents = format!("{MINIMAL}\n[analysis]\nsignificance_level = 1.5\n");
        let path = write_config(dir.path(), "job.toml", &contents);
        assert!(load_from_file(&path).is_err());
    }

    #[test]
    fn ico_follows_voronoi_input_unless_set() {
        let dir = tempfile::tempdir().unwrap();
        let contents = MINIMAL.replace("voronoi = \"voronoi.csv\"", "");
        let path = write_config(dir.path(), "job.toml", &contents);
        let params = load_from_file(&path).unwrap();
        assert!(params.input.voronoi.is_none());
        assert!(!params.ico.enabled);

        let forced = format!("{contents}\n[ico]\nenabled = true\n");
        let path = write_config(dir.path(), "job.toml", &forced);
        assert!(load_from_file(&path).is_err());

        let disabled = format!("{MINIMAL}\n[ico]\nenabled = false\n");
        let path = write_config(dir.path(), "job.toml", &disabled);
        let params = load_from_file(&path).unwrap();
        assert!(params.input.voronoi.is_some());
        assert!(!params.ico.enabled);
    }

    #[test]
    fn batch_overrides_apply_to_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let job = write_config(dir.path(), "job.toml", MINIMAL);
        let batch = write_config(
            dir.path(),
            "batch.toml",
            r#"
            [analysis]
            significance_level = 0.1

            [ico]
            faces = 10

            [[jobs]]
            name = "job1"
            config = "job.toml"
            "#,
        );

        let batch = load_batch_from_file(&batch).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.jobs[0].config, job);
        assert_eq!(batch.ico.and_then(|ico| ico.enabled), None);

        let mut params = load_from_file(&batch.jobs[0].config).unwrap();
        batch.apply_to(&mut params).unwrap();
        assert_eq!(params.analysis.significance_level, 0.1);
        assert_eq!(params.ico.faces, 10);
        assert!(params.ico.enabled);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "batch.toml", "jobs = []\n");
        assert!(load_batch_from_file(&path).is_err());
    }
}
