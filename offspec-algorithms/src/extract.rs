//! Off-specular extraction from a raw `[x, y, tof]` histogram.
#![allow(clippy::cast_precision_loss, clippy::doc_markdown)]
//!
//! 1. Sum counts over the low-resolution (y) window inside the active x range
//! 2. Normalize by proton charge, scaling factor and y window width
//! 3. Subtract the background curve, scaled the same way
//! 4. Propagate counting errors in quadrature
//! 5. Optionally divide by a direct-beam curve with matching binning;
//!    bins where the curve is not positive are zeroed

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use offspec_core::{
    ConfigError, CrossSection, KinematicMap, Measurement, OffSpecResult, Result,
};
use thiserror::Error;

/// Per-time-bin direct-beam normalization curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalization {
    run_number: Option<u32>,
    tof_edges: Array1<f64>,
    values: Array1<f64>,
    errors: Array1<f64>,
}

impl Normalization {
    /// Build a normalization from a precomputed curve.
    ///
    /// # Errors
    /// Returns a configuration error if `values` or `errors` do not have one
    /// entry per time bin.
    pub fn new(tof_edges: Array1<f64>, values: Array1<f64>, errors: Array1<f64>) -> Result<Self> {
        let expected = tof_edges.len().saturating_sub(1);
        for actual in [values.len(), errors.len()] {
            if actual != expected {
                return Err(ConfigError::NormalizationLength { expected, actual }.into());
            }
        }
        Ok(Self {
            run_number: None,
            tof_edges,
            values,
            errors,
        })
    }

    /// Sum a direct-beam measurement over its peak and low-resolution
    /// windows, normalized per pixel and per unit proton charge.
    #[must_use]
    pub fn from_direct_beam(direct_beam: &Measurement) -> Self {
        let roi = direct_beam.roi();
        let (x_min, x_max) = roi.peak_roi;
        let (y_min, y_max) = roi.low_res_roi;

        let raw = direct_beam
            .counts()
            .slice(s![x_min..x_max, y_min..y_max, ..])
            .sum_axis(Axis(0))
            .sum_axis(Axis(0));
        let area = ((x_max - x_min) * (y_max - y_min)) as f64;
        let scale = area * direct_beam.calibration().proton_charge;

        Self {
            run_number: Some(direct_beam.run_number()),
            tof_edges: direct_beam.tof_edges().clone(),
            values: raw.mapv(|n| n / scale),
            errors: raw.mapv(|n| n.max(0.0).sqrt() / scale),
        }
    }

    /// Normalization value per time bin.
    #[must_use]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Normalization uncertainty per time bin.
    #[must_use]
    pub fn errors(&self) -> &Array1<f64> {
        &self.errors
    }

    /// Time-of-flight edges the curve was measured on.
    #[must_use]
    pub fn tof_edges(&self) -> &Array1<f64> {
        &self.tof_edges
    }

    /// Run number of the direct beam, if built from one.
    #[must_use]
    pub fn run_number(&self) -> Option<u32> {
        self.run_number
    }

    /// Number of time bins.
    #[must_use]
    pub fn tof_bins(&self) -> usize {
        self.values.len()
    }
}

/// A direct beam whose time-of-flight binning differs from the scattering
/// measurement. Reported, not raised: extraction continues unnormalized.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "run {run}: direct beam {} has {direct_beam_bins} time bins with different edges than the {bins} bins of the data; skipping normalization",
    .direct_beam_run.map_or_else(|| "curve".to_string(), |r| r.to_string())
)]
pub struct NormalizationMismatch {
    /// Run being extracted.
    pub run: u32,
    /// Time bins of the run.
    pub bins: usize,
    /// Direct-beam run, `None` for a precomputed curve.
    pub direct_beam_run: Option<u32>,
    /// Time bins of the direct beam.
    pub direct_beam_bins: usize,
}

/// Outcome of the direct-beam normalization step.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationStatus {
    /// No direct beam was supplied.
    NotRequested,
    /// Normalized by the direct beam.
    Applied {
        /// Time bins with a non-positive direct beam, zeroed in the result.
        unmeasurable_bins: usize,
    },
    /// Binning mismatch; the result is not normalized.
    Skipped(NormalizationMismatch),
}

impl NormalizationStatus {
    /// Whether the result was divided by a direct beam.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Extract the off-specular arrays of one measurement.
///
/// # Arguments
/// * `measurement` - Validated measurement
/// * `background` - Background counts per pixel and time bin, before scaling
/// * `direct_beam` - Optional normalization curve
///
/// # Errors
/// Returns a geometry error if the kinematics cannot be computed and a
/// configuration error if the background length or windows are invalid.
pub fn extract_off_specular(
    measurement: &Measurement,
    background: ArrayView1<'_, f64>,
    direct_beam: Option<&Normalization>,
) -> Result<(OffSpecResult, NormalizationStatus)> {
    let n_tof = measurement.tof_bins();
    if background.len() != n_tof {
        return Err(ConfigError::BackgroundLength {
            expected: n_tof,
            actual: background.len(),
        }
        .into());
    }

    let calibration = measurement.calibration();
    let roi = measurement.roi();
    let (x_min, x_max) = calibration.active_area_x;
    let (y_min, y_max) = roi.low_res_roi;
    if y_min >= y_max {
        return Err(ConfigError::EmptyWindow {
            name: "low_res_roi",
            min: y_min,
            max: y_max,
        }
        .into());
    }

    let kinematics = KinematicMap::compute(
        calibration,
        roi.peak_position,
        measurement.tof_edges().view(),
    )?;

    let scale = roi.scaling_factor / calibration.proton_charge;
    let width = (y_max - y_min) as f64;
    let bck = background.mapv(|b| b * scale);

    let raw = measurement
        .counts()
        .slice(s![x_min..x_max, y_min..y_max, ..])
        .sum_axis(Axis(1));

    let mut s = Array2::from_shape_fn(raw.dim(), |(i, t)| raw[[i, t]] / width * scale - bck[t]);
    let mut ds = Array2::from_shape_fn(raw.dim(), |(i, t)| {
        let d_intensity = raw[[i, t]].max(0.0).sqrt() / width * scale;
        d_intensity.hypot(bck[t])
    });

    let status = match direct_beam {
        None => NormalizationStatus::NotRequested,
        Some(norm) if !measurement.same_binning(norm.tof_edges()) => {
            let mismatch = NormalizationMismatch {
                run: measurement.run_number(),
                bins: n_tof,
                direct_beam_run: norm.run_number(),
                direct_beam_bins: norm.tof_bins(),
            };
            log::error!("{mismatch}");
            NormalizationStatus::Skipped(mismatch)
        }
        Some(norm) => {
            let unmeasurable_bins = normalize(&mut s, &mut ds, norm);
            NormalizationStatus::Applied { unmeasurable_bins }
        }
    };

    log::debug!(
        "run {} [{}]: extracted {} x {} off-specular points ({:?})",
        measurement.run_number(),
        measurement.cross_section(),
        s.nrows(),
        s.ncols(),
        status
    );

    let result = OffSpecResult {
        qx: kinematics.qx,
        qz: kinematics.qz,
        ki_z: kinematics.ki_z,
        kf_z: kinematics.kf_z,
        s,
        ds,
        d_wavelength: kinematics.d_wavelength,
    };
    Ok((result, status))
}

/// Extract a cross-section and replace its cached result.
///
/// # Errors
/// See [`extract_off_specular`]. On error the cached result is unchanged.
pub fn extract(
    cross_section: &mut CrossSection,
    direct_beam: Option<&Normalization>,
) -> Result<NormalizationStatus> {
    let (result, status) = extract_off_specular(
        cross_section.measurement(),
        cross_section.background().view(),
        direct_beam,
    )?;
    cross_section.set_off_spec(result);
    Ok(status)
}

/// Divide by the direct beam in place. Returns the number of zeroed bins.
fn normalize(s: &mut Array2<f64>, ds: &mut Array2<f64>, norm: &Normalization) -> usize {
    let mut unmeasurable = 0;
    for (t, (&n, &dn)) in norm.values().iter().zip(norm.errors()).enumerate() {
        let mut s_col = s.column_mut(t);
        let mut ds_col = ds.column_mut(t);
        if n > 0.0 {
            for (si, dsi) in s_col.iter_mut().zip(ds_col.iter_mut()) {
                *dsi = (*dsi / n).hypot(*si / (n * n) * dn);
                *si /= n;
            }
        } else {
            s_col.fill(0.0);
            ds_col.fill(0.0);
            unmeasurable += 1;
        }
    }
    unmeasurable
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};
    use offspec_core::{Calibration, Error, RegionOfInterest};

    const EDGES: [f64; 4] = [10_000.0, 11_000.0, 12_000.0, 13_000.0];

    fn calibration(proton_charge: f64) -> Calibration {
        Calibration {
            dist_sam_det: 2.5,
            dist_mod_det: 16.5,
            direct_pixel: 3.0,
            dangle: 1.0,
            dangle0: 0.0,
            pixel_width: 0.0007,
            active_area_x: (0, 4),
            active_area_y: (0, 2),
            proton_charge,
        }
    }

    fn roi() -> RegionOfInterest {
        RegionOfInterest::default()
            .with_peak_position(1.0)
            .with_peak_roi(0, 1)
            .with_low_res_roi(0, 1)
            .with_scaling_factor(1.0)
            .with_cuts(0, 0)
    }

    /// 4 x 3 active pixels by time bins, all 100 counts, proton charge 2.
    fn measurement() -> Measurement {
        Measurement::new(
            1000,
            "Off_Off",
            Array3::from_elem((4, 2, 3), 100.0),
            Array1::from(EDGES.to_vec()),
            calibration(2.0),
            roi(),
        )
        .unwrap()
    }

    #[test]
    fn test_unit_normalization_end_to_end() {
        let norm = Normalization::new(
            Array1::from(EDGES.to_vec()),
            array![1.0, 1.0, 1.0],
            array![0.0, 0.0, 0.0],
        )
        .unwrap();
        let (result, status) =
            extract_off_specular(&measurement(), array![0.0, 0.0, 0.0].view(), Some(&norm))
                .unwrap();

        assert_eq!(status, NormalizationStatus::Applied { unmeasurable_bins: 0 });
        assert_eq!(result.shape(), (4, 3));
        // 100 / 2.0 / (1 - 0) / 1.0
        assert!(result.s.iter().all(|&v| v == 50.0));
        // sqrt(100) / 2.0 / (1 - 0) / 1.0
        assert!(result.ds.iter().all(|&v| v == 5.0));
        assert_eq!(result.qz.dim(), (4, 3));
        assert_eq!(result.d_wavelength.len(), 3);
    }

    #[test]
    fn test_direct_beam_measurement_normalization() {
        // Peak window 1 x 1 pixel, 2 counts per bin, proton charge 2 -> curve of 1.0
        let direct = Measurement::new(
            2000,
            "Off_Off",
            Array3::from_elem((4, 2, 3), 2.0),
            Array1::from(EDGES.to_vec()),
            calibration(2.0),
            roi(),
        )
        .unwrap();
        let norm = Normalization::from_direct_beam(&direct);
        assert_eq!(norm.values(), &array![1.0, 1.0, 1.0]);
        assert_relative_eq!(norm.errors()[0], 2f64.sqrt() / 2.0);

        let (result, status) =
            extract_off_specular(&measurement(), array![0.0, 0.0, 0.0].view(), Some(&norm))
                .unwrap();
        assert!(status.is_normalized());
        assert_relative_eq!(result.s[[0, 0]], 50.0);
        let expected = (5.0_f64.powi(2) + (50.0 * 2f64.sqrt() / 2.0).powi(2)).sqrt();
        assert_relative_eq!(result.ds[[2, 1]], expected, max_relative = 1e-12);
    }

    #[test]
    fn test_quadrature_propagation() {
        let mut s = array![[8.0]];
        let mut ds = array![[0.6]];
        let norm = Normalization::new(array![1.0, 2.0], array![4.0], array![0.5]).unwrap();

        assert_eq!(normalize(&mut s, &mut ds, &norm), 0);
        assert_relative_eq!(s[[0, 0]], 2.0);
        let expected_sq = (0.6_f64 / 4.0).powi(2) + (8.0 * 0.5 / 16.0_f64).powi(2);
        assert_relative_eq!(ds[[0, 0]].powi(2), expected_sq, max_relative = 1e-12);
    }

    #[test]
    fn test_non_positive_normalization_zeroes_bins() {
        let norm = Normalization::new(
            Array1::from(EDGES.to_vec()),
            array![1.0, 0.0, -3.0],
            array![0.1, 0.1, 0.1],
        )
        .unwrap();
        let (result, status) =
            extract_off_specular(&measurement(), array![0.0, 0.0, 0.0].view(), Some(&norm))
                .unwrap();

        assert_eq!(status, NormalizationStatus::Applied { unmeasurable_bins: 2 });
        for t in 1..3 {
            assert!(result.s.column(t).iter().all(|&v| v == 0.0));
            assert!(result.ds.column(t).iter().all(|&v| v == 0.0));
        }
        assert!(result.s.column(0).iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_binning_mismatch_skips_normalization() {
        let norm = Normalization::new(
            array![10_000.0, 11_000.0, 12_000.0, 14_000.0],
            array![10.0, 10.0, 10.0],
            array![0.0, 0.0, 0.0],
        )
        .unwrap();
        let (result, status) =
            extract_off_specular(&measurement(), array![0.0, 0.0, 0.0].view(), Some(&norm))
                .unwrap();

        match status {
            NormalizationStatus::Skipped(mismatch) => {
                assert_eq!(mismatch.run, 1000);
                assert_eq!(mismatch.direct_beam_bins, 3);
                assert!(mismatch.to_string().contains("skipping normalization"));
            }
            other => panic!("expected skipped normalization, got {other:?}"),
        }
        assert!(result.s.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_background_subtraction_and_error() {
        // Background of 20 counts -> 10 after dividing by the proton charge
        let (result, _) =
            extract_off_specular(&measurement(), array![20.0, 0.0, 0.0].view(), None).unwrap();
        assert_relative_eq!(result.s[[0, 0]], 40.0);
        assert_relative_eq!(result.ds[[0, 0]], (25.0_f64 + 100.0).sqrt());
        assert_relative_eq!(result.s[[0, 1]], 50.0);
        assert!(result.ds.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_scaling_and_window_width() {
        let m = measurement()
            .with_roi(roi().with_low_res_roi(0, 2).with_scaling_factor(3.0))
            .unwrap();
        let (result, _) = extract_off_specular(&m, array![0.0, 0.0, 0.0].view(), None).unwrap();
        // 200 counts over 2 rows -> 100, times 3 / 2.0
        assert_relative_eq!(result.s[[3, 2]], 150.0);
        assert_relative_eq!(result.ds[[3, 2]], 200f64.sqrt() / 2.0 * 1.5);
    }

    #[test]
    fn test_background_length_mismatch() {
        let err = extract_off_specular(&measurement(), array![0.0, 0.0].view(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::BackgroundLength {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_extract_replaces_cached_result() {
        let mut cs = CrossSection::new(measurement());
        assert!(cs.off_spec().is_none());

        extract(&mut cs, None).unwrap();
        assert_eq!(cs.off_spec().unwrap().s[[0, 0]], 50.0);

        let mut cs = cs.with_background(array![100.0, 100.0, 100.0]).unwrap();
        assert!(cs.off_spec().is_none());
        extract(&mut cs, None).unwrap();
        assert_eq!(cs.off_spec().unwrap().s[[0, 0]], 0.0);
    }
}
