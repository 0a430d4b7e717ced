//! Scattering geometry and wavevector kinematics.
#![allow(clippy::cast_precision_loss, clippy::doc_markdown)]
//!
//! Converts detector pixel and time-of-flight positions into scattering
//! angles and wavevector components. The incident angle is the same for all
//! pixels (half the specular scattering angle) while the exit angle varies
//! with the pixel position along x.

use crate::calibration::Calibration;
use crate::error::GeometryError;
use ndarray::{Array1, Array2, ArrayView1};
use std::f64::consts::PI;

/// Planck constant over neutron mass, h/mₙ (m²/s).
pub const H_OVER_M_NEUTRON: f64 = 3.956034e-7;

/// Per-pixel, per-time-bin kinematics of one measurement.
///
/// All 2D arrays have shape `[n_active_x_pixels, n_tof_bins]`.
#[derive(Clone, Debug, PartialEq)]
pub struct KinematicMap {
    /// Momentum transfer perpendicular to the surface (1/Å).
    pub qz: Array2<f64>,
    /// Momentum transfer in the scattering plane along the surface (1/Å).
    pub qx: Array2<f64>,
    /// Perpendicular component of the incident wavevector (1/Å).
    pub ki_z: Array2<f64>,
    /// Perpendicular component of the exit wavevector (1/Å).
    pub kf_z: Array2<f64>,
    /// Incident angle per active pixel (rad). Uniform across pixels.
    pub incident_angle: Array1<f64>,
    /// Exit angle per active pixel (rad).
    pub exit_angle: Array1<f64>,
    /// Wavelength at the center of each time bin (Å).
    pub wavelength: Array1<f64>,
    /// Wavelength resolution of each time bin (Å).
    pub d_wavelength: Array1<f64>,
}

impl KinematicMap {
    /// Compute the kinematics for the active x range of a calibration.
    ///
    /// # Arguments
    /// * `calibration` - Distances, angles and active area of the measurement
    /// * `peak_position` - Specular peak pixel along x
    /// * `tof_edges` - Time-of-flight bin edges in microseconds
    ///
    /// # Errors
    /// Returns a [`GeometryError`] if the edges are not strictly increasing
    /// and positive, a distance is not positive, or the active area is empty.
    pub fn compute(
        calibration: &Calibration,
        peak_position: f64,
        tof_edges: ArrayView1<'_, f64>,
    ) -> Result<Self, GeometryError> {
        validate_tof_edges(tof_edges)?;
        for (name, value) in [
            ("dist_sam_det", calibration.dist_sam_det),
            ("dist_mod_det", calibration.dist_mod_det),
            ("pixel_width", calibration.pixel_width),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::NonPositiveDistance { name, value });
            }
        }
        let (start, end) = calibration.active_area_x;
        if start >= end {
            return Err(GeometryError::EmptyActiveArea { start, end });
        }

        let rad_per_pixel = calibration.rad_per_pixel();
        let delta_dangle = calibration.delta_dangle();
        let tth_spec = calibration.two_theta(peak_position);

        let exit_angle: Array1<f64> = (start..end)
            .map(|pixel| {
                let xtth = calibration.direct_pixel - pixel as f64;
                delta_dangle + xtth * rad_per_pixel - tth_spec / 2.0
            })
            .collect();
        let incident_angle = Array1::from_elem(exit_angle.len(), tth_spec / 2.0);

        let lambda_edges = tof_to_wavelength(tof_edges, calibration.dist_mod_det);
        let n_bins = lambda_edges.len() - 1;
        let wavelength: Array1<f64> = (0..n_bins)
            .map(|t| (lambda_edges[t] + lambda_edges[t + 1]) / 2.0)
            .collect();
        // Uniform distribution over the bin: width / sqrt(12).
        let d_wavelength: Array1<f64> = (0..n_bins)
            .map(|t| (lambda_edges[t] - lambda_edges[t + 1]).abs() / 12f64.sqrt())
            .collect();
        let k = wavelength.mapv(|wl| 2.0 * PI / wl);

        let shape = (exit_angle.len(), n_bins);
        let qz = Array2::from_shape_fn(shape, |(i, t)| {
            k[t] * (exit_angle[i].sin() + incident_angle[i].sin())
        });
        let qx = Array2::from_shape_fn(shape, |(i, t)| {
            k[t] * (exit_angle[i].cos() - incident_angle[i].cos())
        });
        let ki_z = Array2::from_shape_fn(shape, |(i, t)| k[t] * incident_angle[i].sin());
        let kf_z = Array2::from_shape_fn(shape, |(i, t)| k[t] * exit_angle[i].sin());

        Ok(Self {
            qz,
            qx,
            ki_z,
            kf_z,
            incident_angle,
            exit_angle,
            wavelength,
            d_wavelength,
        })
    }

    /// Shape of the 2D arrays, `(n_active_x_pixels, n_tof_bins)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.qz.dim()
    }

    /// Incident angle broadcast over `[pixel, time-bin]`.
    #[must_use]
    pub fn incident_angle_map(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.shape(), |(i, _)| self.incident_angle[i])
    }

    /// Exit angle broadcast over `[pixel, time-bin]`.
    #[must_use]
    pub fn exit_angle_map(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.shape(), |(i, _)| self.exit_angle[i])
    }

    /// Wavelength resolution broadcast over `[pixel, time-bin]`.
    #[must_use]
    pub fn d_wavelength_map(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.shape(), |(_, t)| self.d_wavelength[t])
    }
}

/// Convert time-of-flight values (µs) over a flight path (m) to wavelength (Å).
#[must_use]
pub fn tof_to_wavelength(tof: ArrayView1<'_, f64>, dist_mod_det: f64) -> Array1<f64> {
    tof.mapv(|t| {
        let velocity = dist_mod_det / t * 1e6;
        H_OVER_M_NEUTRON / velocity * 1e10
    })
}

/// Check that time-of-flight edges are positive and strictly increasing.
///
/// # Errors
/// Returns the first offending edge as a [`GeometryError`].
pub fn validate_tof_edges(edges: ArrayView1<'_, f64>) -> Result<(), GeometryError> {
    if edges.len() < 2 {
        return Err(GeometryError::TooFewTofEdges(edges.len()));
    }
    for (index, &value) in edges.iter().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(GeometryError::NonPositiveTof { index, value });
        }
    }
    for (index, pair) in edges.windows(2).into_iter().enumerate() {
        if pair[1] <= pair[0] {
            return Err(GeometryError::NonMonotonicTof {
                index: index + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(())
}
