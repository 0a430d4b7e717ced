//! Calibration and region-of-interest configuration.
//!
//! These structs replace loosely-typed attribute bags: they are plain values,
//! validated once when a [`Measurement`](crate::Measurement) is built, and
//! never mutated during a reduction.

use crate::error::{ConfigError, GeometryError, Result};
use crate::instrument::check_window;
use serde::{Deserialize, Serialize};

/// Calibration scalars of one measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Sample to detector distance (m).
    pub dist_sam_det: f64,
    /// Moderator to detector distance (m).
    pub dist_mod_det: f64,
    /// Pixel hit by the direct beam at `dangle == dangle0`.
    pub direct_pixel: f64,
    /// Detector arm angle reading (degrees).
    pub dangle: f64,
    /// Detector arm angle of the direct beam (degrees).
    pub dangle0: f64,
    /// Pixel pitch along x (m).
    pub pixel_width: f64,
    /// Usable pixel range along x, `[start, end)`.
    pub active_area_x: (usize, usize),
    /// Usable pixel range along y, `[start, end)`.
    pub active_area_y: (usize, usize),
    /// Accumulated proton charge used for exposure normalization.
    pub proton_charge: f64,
}

impl Calibration {
    /// Validate the calibration against a detector of `n_x` by `n_y` pixels.
    ///
    /// # Errors
    /// Non-positive distances or an empty active area yield a
    /// [`GeometryError`]; everything else a [`ConfigError`].
    pub fn validate(&self, n_x: usize, n_y: usize) -> Result<()> {
        for (name, value) in [
            ("dist_sam_det", self.dist_sam_det),
            ("dist_mod_det", self.dist_mod_det),
            ("pixel_width", self.pixel_width),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::NonPositiveDistance { name, value }.into());
            }
        }
        for (name, value) in [
            ("direct_pixel", self.direct_pixel),
            ("dangle", self.dangle),
            ("dangle0", self.dangle0),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value }.into());
            }
        }
        if self.proton_charge <= 0.0 || !self.proton_charge.is_finite() {
            return Err(ConfigError::NonPositiveProtonCharge(self.proton_charge).into());
        }

        let (start, end) = self.active_area_x;
        if start >= end {
            return Err(GeometryError::EmptyActiveArea { start, end }.into());
        }
        check_window("active_area_x", self.active_area_x, n_x)?;
        check_window("active_area_y", self.active_area_y, n_y)?;
        Ok(())
    }

    /// Angle subtended by one pixel, in radians.
    #[must_use]
    pub fn rad_per_pixel(&self) -> f64 {
        self.pixel_width / self.dist_sam_det
    }

    /// Detector arm offset from the direct beam position, in radians.
    #[must_use]
    pub fn delta_dangle(&self) -> f64 {
        (self.dangle - self.dangle0).to_radians()
    }

    /// Scattering angle 2θ of the specular reflection centered on
    /// `peak_position`, in radians.
    #[must_use]
    pub fn two_theta(&self, peak_position: f64) -> f64 {
        self.delta_dangle() + (self.direct_pixel - peak_position) * self.rad_per_pixel()
    }
}

/// Coordinate pair used as the axes of the rebinned off-specular map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffSpecAxes {
    /// Qx along x, Qz along y.
    QxVsQz,
    /// ki_z along x, kf_z along y.
    KizVsKfz,
    /// ki_z - kf_z along x, Qz along y.
    #[default]
    DeltaKVsQz,
}

impl OffSpecAxes {
    /// Label of the horizontal axis.
    #[must_use]
    pub fn x_label(self) -> &'static str {
        match self {
            Self::QxVsQz => "Qx",
            Self::KizVsKfz => "ki_z",
            Self::DeltaKVsQz => "ki_z-kf_z",
        }
    }

    /// Label of the vertical axis.
    #[must_use]
    pub fn y_label(self) -> &'static str {
        match self {
            Self::QxVsQz | Self::DeltaKVsQz => "Qz",
            Self::KizVsKfz => "kf_z",
        }
    }
}

/// Region of interest and reduction options of one measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    /// Specular peak center along x (pixels).
    pub peak_position: f64,
    /// Peak window along x, `[min, max)`; used when this measurement is a
    /// direct beam.
    pub peak_roi: (usize, usize),
    /// Low-resolution window along y, `[min, max)`.
    pub low_res_roi: (usize, usize),
    /// Multiplicative scale applied after exposure normalization.
    pub scaling_factor: f64,
    /// Leading time bins dropped when merging runs.
    pub cut_first_n_points: usize,
    /// Trailing time bins dropped when merging runs.
    pub cut_last_n_points: usize,
    /// Axes of the rebinned off-specular map.
    pub axes: OffSpecAxes,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            peak_position: 145.0,
            peak_roi: (130, 160),
            low_res_roi: (100, 160),
            scaling_factor: 1.0,
            cut_first_n_points: 1,
            cut_last_n_points: 1,
            axes: OffSpecAxes::default(),
        }
    }
}

impl RegionOfInterest {
    /// Set the specular peak position.
    #[must_use]
    pub fn with_peak_position(mut self, peak_position: f64) -> Self {
        self.peak_position = peak_position;
        self
    }

    /// Set the peak window along x.
    #[must_use]
    pub fn with_peak_roi(mut self, min: usize, max: usize) -> Self {
        self.peak_roi = (min, max);
        self
    }

    /// Set the low-resolution window along y.
    #[must_use]
    pub fn with_low_res_roi(mut self, min: usize, max: usize) -> Self {
        self.low_res_roi = (min, max);
        self
    }

    /// Set the scaling factor.
    #[must_use]
    pub fn with_scaling_factor(mut self, scaling_factor: f64) -> Self {
        self.scaling_factor = scaling_factor;
        self
    }

    /// Set the number of leading and trailing time bins to discard.
    #[must_use]
    pub fn with_cuts(mut self, first: usize, last: usize) -> Self {
        self.cut_first_n_points = first;
        self.cut_last_n_points = last;
        self
    }

    /// Set the axes of the rebinned map.
    #[must_use]
    pub fn with_axes(mut self, axes: OffSpecAxes) -> Self {
        self.axes = axes;
        self
    }

    /// Width of the low-resolution window in pixels.
    #[must_use]
    pub fn low_res_width(&self) -> usize {
        self.low_res_roi.1.saturating_sub(self.low_res_roi.0)
    }

    /// Validate the windows against a detector of `n_x` by `n_y` pixels.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for empty, inverted or out-of-range windows
    /// and non-finite scalars.
    pub fn validate(&self, n_x: usize, n_y: usize) -> std::result::Result<(), ConfigError> {
        if !self.scaling_factor.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "scaling_factor",
                value: self.scaling_factor,
            });
        }
        if !self.peak_position.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "peak_position",
                value: self.peak_position,
            });
        }
        check_window("low_res_roi", self.low_res_roi, n_y)?;
        check_window("peak_roi", self.peak_roi, n_x)?;
        Ok(())
    }
}

/// Beam-defining settings recorded with a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamSettings {
    /// Requested wavelength band center (Å).
    pub lambda_center: f64,
    /// Openings of slits 1 to 3 (mm).
    pub slit_widths: [f64; 3],
}
