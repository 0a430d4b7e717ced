//! Measurement data model.
//!
//! A [`Measurement`] is one polarization cross-section of one run: the raw
//! `[x, y, tof]` histogram with its calibration and region of interest.
//! A [`CrossSection`] pairs a measurement with its background curve and the
//! cached off-specular result, and a [`Run`] groups the cross-sections of a
//! run number.

use crate::calibration::{BeamSettings, Calibration, RegionOfInterest};
use crate::error::{ConfigError, Error, Result};
use crate::kinematics::validate_tof_edges;
use crate::offspec::OffSpecResult;
use ndarray::{Array1, Array3};
use std::collections::BTreeMap;

/// One cross-section of one run, validated on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    run_number: u32,
    cross_section: String,
    counts: Array3<f64>,
    tof_edges: Array1<f64>,
    calibration: Calibration,
    roi: RegionOfInterest,
    beam: Option<BeamSettings>,
}

impl Measurement {
    /// Create a measurement.
    ///
    /// # Arguments
    /// * `run_number` - Run the data was taken in
    /// * `cross_section` - Polarization state label (e.g. `Off_Off`)
    /// * `counts` - Raw histogram indexed by `[x_pixel, y_pixel, tof_bin]`
    /// * `tof_edges` - Time-of-flight bin edges (µs), one more than the bins
    /// * `calibration` - Distances, angles, active areas and proton charge
    /// * `roi` - Region of interest and reduction options
    ///
    /// # Errors
    /// Returns a geometry error for invalid edges or distances and a
    /// configuration error for windows that do not fit the histogram.
    pub fn new(
        run_number: u32,
        cross_section: impl Into<String>,
        counts: Array3<f64>,
        tof_edges: Array1<f64>,
        calibration: Calibration,
        roi: RegionOfInterest,
    ) -> Result<Self> {
        let measurement = Self {
            run_number,
            cross_section: cross_section.into(),
            counts,
            tof_edges,
            calibration,
            roi,
            beam: None,
        };
        measurement.validate()?;
        Ok(measurement)
    }

    fn validate(&self) -> Result<()> {
        validate_tof_edges(self.tof_edges.view())?;
        let (n_x, n_y, n_tof) = self.counts.dim();
        if n_tof + 1 != self.tof_edges.len() {
            return Err(ConfigError::TofAxisMismatch {
                bins: n_tof,
                edges: self.tof_edges.len(),
            }
            .into());
        }
        self.calibration.validate(n_x, n_y)?;
        self.roi.validate(n_x, n_y)?;
        Ok(())
    }

    /// Attach the beam-defining settings of the run.
    #[must_use]
    pub fn with_beam_settings(mut self, beam: BeamSettings) -> Self {
        self.beam = Some(beam);
        self
    }

    /// Replace the region of interest, revalidating the measurement.
    ///
    /// # Errors
    /// Returns a configuration error if the new windows do not fit.
    pub fn with_roi(mut self, roi: RegionOfInterest) -> Result<Self> {
        self.roi = roi;
        self.validate()?;
        Ok(self)
    }

    /// Replace the calibration, revalidating the measurement.
    ///
    /// # Errors
    /// Returns an error if the new calibration is invalid for this histogram.
    pub fn with_calibration(mut self, calibration: Calibration) -> Result<Self> {
        self.calibration = calibration;
        self.validate()?;
        Ok(self)
    }

    #[must_use]
    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    #[must_use]
    pub fn cross_section(&self) -> &str {
        &self.cross_section
    }

    /// Raw histogram `[x, y, tof]`.
    #[must_use]
    pub fn counts(&self) -> &Array3<f64> {
        &self.counts
    }

    /// Time-of-flight bin edges (µs).
    #[must_use]
    pub fn tof_edges(&self) -> &Array1<f64> {
        &self.tof_edges
    }

    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[must_use]
    pub fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    #[must_use]
    pub fn beam_settings(&self) -> Option<&BeamSettings> {
        self.beam.as_ref()
    }

    /// Number of time-of-flight bins.
    #[must_use]
    pub fn tof_bins(&self) -> usize {
        self.tof_edges.len() - 1
    }

    /// Detector size in pixels, `(n_x, n_y)`.
    #[must_use]
    pub fn detector_shape(&self) -> (usize, usize) {
        let (n_x, n_y, _) = self.counts.dim();
        (n_x, n_y)
    }

    /// Whether `other` uses exactly the same time-of-flight binning.
    #[must_use]
    pub fn same_binning(&self, other: &Array1<f64>) -> bool {
        self.tof_edges == *other
    }
}

/// A measurement with its background curve and cached off-specular result.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossSection {
    measurement: Measurement,
    background: Array1<f64>,
    off_spec: Option<OffSpecResult>,
}

impl CrossSection {
    /// Wrap a measurement with a zero background.
    #[must_use]
    pub fn new(measurement: Measurement) -> Self {
        let background = Array1::zeros(measurement.tof_bins());
        Self {
            measurement,
            background,
            off_spec: None,
        }
    }

    /// Set the background-vs-time-of-flight curve (counts per pixel, before
    /// exposure normalization).
    ///
    /// # Errors
    /// Returns a configuration error if the curve length differs from the
    /// number of time bins.
    pub fn with_background(mut self, background: Array1<f64>) -> Result<Self> {
        if background.len() != self.measurement.tof_bins() {
            return Err(ConfigError::BackgroundLength {
                expected: self.measurement.tof_bins(),
                actual: background.len(),
            }
            .into());
        }
        self.background = background;
        self.off_spec = None;
        Ok(self)
    }

    #[must_use]
    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    #[must_use]
    pub fn background(&self) -> &Array1<f64> {
        &self.background
    }

    /// Latest off-specular result, if extracted.
    #[must_use]
    pub fn off_spec(&self) -> Option<&OffSpecResult> {
        self.off_spec.as_ref()
    }

    /// Replace the cached off-specular result.
    pub fn set_off_spec(&mut self, result: OffSpecResult) {
        self.off_spec = Some(result);
    }
}

/// All cross-sections of one run, keyed by polarization state label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Run {
    pub number: u32,
    pub cross_sections: BTreeMap<String, CrossSection>,
}

impl Run {
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            cross_sections: BTreeMap::new(),
        }
    }

    /// Add a cross-section under its measurement's label, replacing any
    /// previous entry.
    pub fn insert(&mut self, cross_section: CrossSection) {
        let label = cross_section.measurement().cross_section().to_string();
        self.cross_sections.insert(label, cross_section);
    }

    /// Look up a cross-section by label.
    ///
    /// # Errors
    /// Returns [`Error::MissingCrossSection`] if the run has no such label.
    pub fn cross_section(&self, label: &str) -> Result<&CrossSection> {
        self.cross_sections
            .get(label)
            .ok_or_else(|| Error::MissingCrossSection {
                run: self.number,
                label: label.to_string(),
            })
    }

    /// Mutable lookup of a cross-section by label.
    ///
    /// # Errors
    /// Returns [`Error::MissingCrossSection`] if the run has no such label.
    pub fn cross_section_mut(&mut self, label: &str) -> Result<&mut CrossSection> {
        let run = self.number;
        self.cross_sections
            .get_mut(label)
            .ok_or_else(|| Error::MissingCrossSection {
                run,
                label: label.to_string(),
            })
    }

    /// Extracted off-specular result of a cross-section.
    ///
    /// # Errors
    /// Returns an error if the label is missing or not extracted yet.
    pub fn off_spec(&self, label: &str) -> Result<&OffSpecResult> {
        self.cross_section(label)?
            .off_spec()
            .ok_or_else(|| Error::NotExtracted {
                run: self.number,
                label: label.to_string(),
            })
    }
}
