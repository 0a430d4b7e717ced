//! Instrument descriptor for the magnetism reflectometer.
//!
//! Holds the detector constants the reduction consumes. The REF_M values are
//! the defaults; a JSON file may override any subset of them.

use crate::calibration::{BeamSettings, Calibration};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Static detector description of a reflectometer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentDescriptor {
    /// Instrument name (e.g. `REF_M`).
    pub name: String,
    /// Number of pixels along the scattering (x) direction.
    pub n_x_pixel: usize,
    /// Number of pixels along the low-resolution (y) direction.
    pub n_y_pixel: usize,
    /// Pixel pitch in meters.
    pub pixel_width: f64,
    /// Usable detector range along x, `[start, end)`.
    pub active_area_x: (usize, usize),
    /// Usable detector range along y, `[start, end)`.
    pub active_area_y: (usize, usize),
    /// HuberX position above which the sample is considered out of the beam.
    pub huber_x_cut: f64,
    /// Pixel offset used when guessing a peak range.
    pub peak_range_offset: usize,
    /// Tolerance used when matching direct beams to scattering runs.
    pub tolerance: f64,
}

impl Default for InstrumentDescriptor {
    fn default() -> Self {
        Self::ref_m_defaults()
    }
}

impl InstrumentDescriptor {
    /// SNS magnetism reflectometer (BL-4A) defaults.
    #[must_use]
    pub fn ref_m_defaults() -> Self {
        Self {
            name: "REF_M".to_string(),
            n_x_pixel: 304,
            n_y_pixel: 256,
            pixel_width: 0.0007,
            active_area_x: (8, 295),
            active_area_y: (8, 246),
            huber_x_cut: 6.5,
            peak_range_offset: 50,
            tolerance: 0.05,
        }
    }

    /// Load a descriptor from a JSON file. Missing fields keep REF_M defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let descriptor: Self = serde_json::from_reader(reader)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load a descriptor from a JSON string. Missing fields keep REF_M defaults.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check that the active areas fit on the detector and the pitch is usable.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first inconsistency.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.pixel_width.is_finite() || self.pixel_width <= 0.0 {
            return Err(ConfigError::NonFinite {
                name: "pixel_width",
                value: self.pixel_width,
            });
        }
        check_window("active_area_x", self.active_area_x, self.n_x_pixel)?;
        check_window("active_area_y", self.active_area_y, self.n_y_pixel)?;
        Ok(())
    }

    /// Horizontal detector size in meters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn det_size_x(&self) -> f64 {
        self.n_x_pixel as f64 * self.pixel_width
    }

    /// Vertical detector size in meters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn det_size_y(&self) -> f64 {
        self.n_y_pixel as f64 * self.pixel_width
    }

    /// Angle subtended by one pixel at the given sample-detector distance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rad_per_pixel(&self, dist_sam_det: f64) -> f64 {
        self.det_size_x() / dist_sam_det / self.n_x_pixel as f64
    }

    /// Build a calibration using this instrument's pixel pitch and active areas.
    #[must_use]
    pub fn calibration(
        &self,
        dist_sam_det: f64,
        dist_mod_det: f64,
        direct_pixel: f64,
        dangle: f64,
        dangle0: f64,
        proton_charge: f64,
    ) -> Calibration {
        Calibration {
            dist_sam_det,
            dist_mod_det,
            direct_pixel,
            dangle,
            dangle0,
            pixel_width: self.pixel_width,
            active_area_x: self.active_area_x,
            active_area_y: self.active_area_y,
            proton_charge,
        }
    }

    /// Whether a direct beam was taken with the same wavelength band and
    /// (unless `skip_slits`) the same slit openings as a scattering run.
    #[must_use]
    pub fn direct_beam_match(
        &self,
        scattering: &BeamSettings,
        direct_beam: &BeamSettings,
        skip_slits: bool,
    ) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < self.tolerance;

        close(scattering.lambda_center, direct_beam.lambda_center)
            && (skip_slits
                || scattering
                    .slit_widths
                    .iter()
                    .zip(&direct_beam.slit_widths)
                    .all(|(&a, &b)| close(a, b)))
    }
}

/// Validate a `[min, max)` pixel window against a detector dimension.
pub(crate) fn check_window(
    name: &'static str,
    (min, max): (usize, usize),
    size: usize,
) -> std::result::Result<(), ConfigError> {
    if min >= max {
        return Err(ConfigError::EmptyWindow { name, min, max });
    }
    if max > size {
        return Err(ConfigError::WindowOutOfBounds {
            name,
            min,
            max,
            size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ref_m_defaults() {
        let instrument = InstrumentDescriptor::ref_m_defaults();
        assert_eq!(instrument.name, "REF_M");
        assert_eq!(instrument.n_x_pixel, 304);
        assert_eq!(instrument.active_area_x, (8, 295));
        assert!(instrument.validate().is_ok());
        assert_relative_eq!(instrument.det_size_x(), 0.2128, epsilon = 1e-12);
    }

    #[test]
    fn test_rad_per_pixel_is_pitch_over_distance() {
        let instrument = InstrumentDescriptor::ref_m_defaults();
        assert_relative_eq!(
            instrument.rad_per_pixel(2.5),
            0.0007 / 2.5,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_json_partial_override() {
        let json = r#"{ "name": "TEST", "pixel_width": 0.001 }"#;
        let instrument = InstrumentDescriptor::from_json(json).expect("Should parse");

        assert_eq!(instrument.name, "TEST");
        assert_eq!(instrument.pixel_width, 0.001); // Changed
        assert_eq!(instrument.n_y_pixel, 256); // Default
        assert_eq!(instrument.tolerance, 0.05); // Default
    }

    #[test]
    fn test_json_invalid_active_area() {
        let json = r#"{ "n_x_pixel": 100, "active_area_x": [8, 295] }"#;
        let err = InstrumentDescriptor::from_json(json).unwrap_err().to_string();
        assert!(err.contains("exceeds detector size"), "{err}");
    }

    #[test]
    fn test_direct_beam_match() {
        let instrument = InstrumentDescriptor::ref_m_defaults();
        let scattering = BeamSettings {
            lambda_center: 4.25,
            slit_widths: [0.5, 0.4, 1.0],
        };
        let mut direct = BeamSettings {
            lambda_center: 4.27,
            slit_widths: [0.52, 0.4, 1.0],
        };
        assert!(instrument.direct_beam_match(&scattering, &direct, false));

        direct.slit_widths[2] = 2.0;
        assert!(!instrument.direct_beam_match(&scattering, &direct, false));
        assert!(instrument.direct_beam_match(&scattering, &direct, true));

        direct.lambda_center = 5.0;
        assert!(!instrument.direct_beam_match(&scattering, &direct, true));
    }
}
