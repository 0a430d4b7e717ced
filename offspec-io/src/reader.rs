//! JSON readers for measurements and reduction lists.
//!
//! A measurement file carries one cross-section of one run: the detector
//! histogram as a flat row-major `[x, y, tof]` array, its time-of-flight
//! edges and the calibration and region of interest used to reduce it.

use crate::{Error, Result};
use ndarray::{Array1, Array3};
use offspec_algorithms::{Normalization, RebinConfig, RebinMode};
use offspec_core::{BeamSettings, Calibration, CrossSection, Measurement, RegionOfInterest, Run};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// On-disk description of a single measured cross-section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFile {
    pub run_number: u32,
    pub cross_section: String,
    /// Histogram dimensions `[n_x, n_y, n_tof]`.
    pub shape: [usize; 3],
    /// Row-major counts, `n_x * n_y * n_tof` values.
    pub counts: Vec<f64>,
    pub tof_edges: Vec<f64>,
    pub calibration: Calibration,
    #[serde(default)]
    pub roi: RegionOfInterest,
    #[serde(default)]
    pub beam: Option<BeamSettings>,
    /// Background per time bin; zero when absent.
    #[serde(default)]
    pub background: Option<Vec<f64>>,
}

impl MeasurementFile {
    /// Parse a measurement file from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or is not valid JSON.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Parse a measurement from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid measurement description.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert into a validated cross-section.
    ///
    /// # Errors
    /// Returns `InvalidFormat` if the array lengths disagree with `shape`,
    /// and a core error if the calibration or region of interest is invalid.
    pub fn into_cross_section(self) -> Result<CrossSection> {
        let [n_x, n_y, n_tof] = self.shape;
        let expected = n_x
            .checked_mul(n_y)
            .and_then(|n| n.checked_mul(n_tof))
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "run {}: shape {:?} is too large",
                    self.run_number, self.shape
                ))
            })?;
        if self.counts.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "run {}: {} counts for shape {:?} ({expected} expected)",
                self.run_number,
                self.counts.len(),
                self.shape
            )));
        }
        if self.tof_edges.len() != n_tof + 1 {
            return Err(Error::InvalidFormat(format!(
                "run {}: {} time-of-flight edges for {n_tof} time bins",
                self.run_number,
                self.tof_edges.len()
            )));
        }

        let counts = Array3::from_shape_vec((n_x, n_y, n_tof), self.counts)
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;
        let mut measurement = Measurement::new(
            self.run_number,
            self.cross_section,
            counts,
            Array1::from(self.tof_edges),
            self.calibration,
            self.roi,
        )?;
        if let Some(beam) = self.beam {
            measurement = measurement.with_beam_settings(beam);
        }

        let cross_section = CrossSection::new(measurement);
        match self.background {
            Some(background) => Ok(cross_section.with_background(Array1::from(background))?),
            None => Ok(cross_section),
        }
    }
}

/// Read a measurement file into a cross-section.
///
/// # Errors
/// See [`MeasurementFile::open`] and [`MeasurementFile::into_cross_section`].
pub fn read_measurement<P: AsRef<Path>>(path: P) -> Result<CrossSection> {
    let path = path.as_ref();
    let cross_section = MeasurementFile::open(path)?.into_cross_section()?;
    log::debug!(
        "loaded run {} [{}] from {}",
        cross_section.measurement().run_number(),
        cross_section.measurement().cross_section(),
        path.display()
    );
    Ok(cross_section)
}

fn default_bins() -> usize {
    offspec_algorithms::rebin::DEFAULT_BINS
}

/// Description of a reduction: the runs to combine and how to rebin them.
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReductionFile {
    /// Measurement files, in reduction-list order.
    pub measurements: Vec<PathBuf>,
    /// Cross-section label to reduce.
    pub cross_section: String,
    #[serde(default)]
    pub direct_beam: Option<PathBuf>,
    /// y values at which to extract cuts.
    #[serde(default)]
    pub cut_values: Vec<f64>,
    #[serde(default = "default_bins")]
    pub n_bins_x: usize,
    #[serde(default = "default_bins")]
    pub n_bins_y: usize,
    /// Use the simple mean instead of the weighted mean.
    #[serde(default)]
    pub simple: bool,
    /// Output file name template.
    #[serde(default)]
    pub output_template: Option<String>,
}

impl ReductionFile {
    /// Parse a reduction file, resolving its relative paths.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reduction: Self = serde_json::from_reader(BufReader::new(file))?;
        if let Some(base) = path.parent() {
            reduction.resolve_paths(base);
        }
        Ok(reduction)
    }

    /// Parse a reduction from a JSON string. Paths are kept as written.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid reduction description.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in self
            .measurements
            .iter_mut()
            .chain(self.direct_beam.as_mut())
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Rebinning configuration requested by this reduction.
    #[must_use]
    pub fn rebin_config(&self) -> RebinConfig {
        let mode = if self.simple {
            RebinMode::Simple
        } else {
            RebinMode::Weighted
        };
        RebinConfig::default()
            .with_bins(self.n_bins_x, self.n_bins_y)
            .with_mode(mode)
    }

    /// Load every measurement into runs. Files sharing a run number are
    /// grouped into one run; run order follows first appearance.
    ///
    /// # Errors
    /// Returns the first error raised while reading a measurement.
    pub fn load_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = Vec::new();
        for path in &self.measurements {
            let cross_section = read_measurement(path)?;
            let number = cross_section.measurement().run_number();
            match runs.iter_mut().find(|run| run.number == number) {
                Some(run) => run.insert(cross_section),
                None => {
                    let mut run = Run::new(number);
                    run.insert(cross_section);
                    runs.push(run);
                }
            }
        }
        Ok(runs)
    }

    /// Load the direct beam, if any, as a normalization curve.
    ///
    /// # Errors
    /// Returns an error if the direct-beam file cannot be read.
    pub fn load_direct_beam(&self) -> Result<Option<(CrossSection, Normalization)>> {
        let Some(path) = &self.direct_beam else {
            return Ok(None);
        };
        let direct_beam = read_measurement(path)?;
        let norm = Normalization::from_direct_beam(direct_beam.measurement());
        Ok(Some((direct_beam, norm)))
    }
}
