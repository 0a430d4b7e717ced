//! Merge the off-specular results of a reduction list into one point cloud.

use offspec_core::{MergedPointCloud, Result, Run};

/// Concatenate the extracted cross-section `label` of every run.
///
/// Each run contributes the time bins
/// `[cut_first_n_points, n_total - cut_last_n_points)` of every pixel row,
/// pixel-major, in reduction-list order. No weighting is applied.
///
/// # Errors
/// Returns an error if a run lacks the cross-section or it was not extracted.
pub fn merge(runs: &[Run], label: &str) -> Result<MergedPointCloud> {
    let mut windows = Vec::with_capacity(runs.len());
    let mut capacity = 0;
    for run in runs {
        let roi = run.cross_section(label)?.measurement().roi();
        let off_spec = run.off_spec(label)?;
        let n_total = off_spec.tof_bins();
        let first = roi.cut_first_n_points;
        let last = n_total.saturating_sub(roi.cut_last_n_points);
        if first >= last {
            log::warn!(
                "run {} [{label}]: trimming {} + {} of {n_total} time bins leaves no point",
                run.number,
                roi.cut_first_n_points,
                roi.cut_last_n_points
            );
        } else {
            capacity += off_spec.shape().0 * (last - first);
        }
        windows.push((off_spec, first, last));
    }

    let mut cloud = MergedPointCloud::with_capacity(capacity);
    for (run, (off_spec, first, last)) in runs.iter().zip(windows) {
        let added = cloud.append_window(off_spec, first, last);
        log::debug!("run {} [{label}]: merged {added} points", run.number);
    }
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use ndarray::{Array1, Array2};
    use offspec_core::{
        Calibration, CrossSection, Error, Measurement, OffSpecResult, RegionOfInterest,
    };

    fn run(number: u32, n_x: usize, n_tof: usize, cuts: (usize, usize)) -> Run {
        let edges: Array1<f64> = (0..=n_tof).map(|t| 10_000.0 + 100.0 * t as f64).collect();
        let calibration = Calibration {
            dist_sam_det: 2.5,
            dist_mod_det: 16.5,
            direct_pixel: 3.0,
            dangle: 1.0,
            dangle0: 0.0,
            pixel_width: 0.0007,
            active_area_x: (0, n_x),
            active_area_y: (0, 1),
            proton_charge: 1.0,
        };
        let roi = RegionOfInterest::default()
            .with_peak_position(1.0)
            .with_peak_roi(0, 1)
            .with_low_res_roi(0, 1)
            .with_cuts(cuts.0, cuts.1);
        let measurement = Measurement::new(
            number,
            "On_On",
            ndarray::Array3::zeros((n_x, 1, n_tof)),
            edges,
            calibration,
            roi,
        )
        .unwrap();

        // Tag every point with its run number and flat index
        let tag = Array2::from_shape_fn((n_x, n_tof), |(i, t)| {
            f64::from(number) * 1000.0 + (i * n_tof + t) as f64
        });
        let mut cs = CrossSection::new(measurement);
        cs.set_off_spec(OffSpecResult {
            qx: tag.clone(),
            qz: tag.clone(),
            ki_z: tag.clone() * 2.0,
            kf_z: tag.clone(),
            s: tag.clone(),
            ds: tag,
            d_wavelength: Array1::zeros(n_tof),
        });
        let mut run = Run::new(number);
        run.insert(cs);
        run
    }

    #[test]
    fn test_merge_length_and_order() {
        let runs = vec![run(1, 3, 10, (2, 3)), run(2, 2, 6, (1, 0))];
        let cloud = merge(&runs, "On_On").unwrap();

        // 3 * (10 - 2 - 3) + 2 * (6 - 1 - 0)
        assert_eq!(cloud.len(), 25);
        assert_eq!(cloud.qx.len(), 25);
        assert_eq!(cloud.delta_k.len(), 25);

        // First run, first pixel row starts at bin 2
        assert_eq!(cloud.s[0], 1002.0);
        assert_eq!(cloud.s[4], 1006.0);
        // Second pixel row of the first run
        assert_eq!(cloud.s[5], 1012.0);
        // Second run follows the first
        assert_eq!(cloud.s[15], 2001.0);
        assert_eq!(cloud.delta_k[15], 2001.0);
    }

    #[test]
    fn test_excessive_trim_contributes_nothing() {
        let runs = vec![run(1, 3, 4, (3, 2)), run(2, 2, 4, (0, 0))];
        let cloud = merge(&runs, "On_On").unwrap();
        assert_eq!(cloud.len(), 8);
        assert_eq!(cloud.s[0], 2000.0);
    }

    #[test]
    fn test_missing_cross_section() {
        let runs = vec![run(1, 3, 4, (0, 0))];
        assert!(matches!(
            merge(&runs, "Off_Off"),
            Err(Error::MissingCrossSection { run: 1, .. })
        ));
    }

    #[test]
    fn test_empty_reduction_list() {
        assert!(merge(&[], "On_On").unwrap().is_empty());
    }
}
