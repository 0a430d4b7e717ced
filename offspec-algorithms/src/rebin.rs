//! Rebinning of merged off-specular points onto a regular 2D grid.
//!
//! Points with positive intensity are histogrammed over the selected pair
//! of coordinates. Edges span the observed range of the contributing points
//! uniformly; the last bin is closed on the right. Cells without points hold
//! NaN in both intensity and error.
#![allow(clippy::cast_precision_loss, clippy::doc_markdown, clippy::float_cmp)]

use ndarray::{Array1, Array2};
use offspec_core::{ConfigError, MergedPointCloud, OffSpecAxes, Result};

/// Default number of bins along each axis.
pub const DEFAULT_BINS: usize = 350;

/// Half width of the band around zero on the x axis kept by a cut.
pub const CUT_HALF_WIDTH: f64 = 0.01;

/// How the points falling into one cell are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RebinMode {
    /// Inverse-variance weighted mean; error `sqrt(1 / sum(1/dS^2))`.
    #[default]
    Weighted,
    /// Plain mean; error `sqrt(sum(dS^2)) / count`.
    Simple,
}

/// Rebinning grid configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RebinConfig {
    /// Bins along x.
    pub n_bins_x: usize,
    /// Bins along y.
    pub n_bins_y: usize,
    /// Cell combination mode.
    pub mode: RebinMode,
}

impl Default for RebinConfig {
    fn default() -> Self {
        Self {
            n_bins_x: DEFAULT_BINS,
            n_bins_y: DEFAULT_BINS,
            mode: RebinMode::default(),
        }
    }
}

impl RebinConfig {
    /// Set the grid resolution.
    #[must_use]
    pub fn with_bins(mut self, n_bins_x: usize, n_bins_y: usize) -> Self {
        self.n_bins_x = n_bins_x;
        self.n_bins_y = n_bins_y;
        self
    }

    /// Set the combination mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RebinMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Coordinates of the cloud along the chosen axes, `(x, y)`.
#[must_use]
pub fn select_axes(cloud: &MergedPointCloud, axes: OffSpecAxes) -> (&[f64], &[f64]) {
    match axes {
        OffSpecAxes::QxVsQz => (cloud.qx.as_slice(), cloud.qz.as_slice()),
        OffSpecAxes::KizVsKfz => (cloud.ki_z.as_slice(), cloud.kf_z.as_slice()),
        OffSpecAxes::DeltaKVsQz => (cloud.delta_k.as_slice(), cloud.qz.as_slice()),
    }
}

/// Off-specular intensity on a regular grid, indexed by `[y_bin, x_bin]`.
#[derive(Clone, Debug, PartialEq)]
pub struct RebinnedMap {
    /// Coordinates along x and y.
    pub axes: OffSpecAxes,
    /// Combined intensity per cell, NaN where empty.
    pub intensity: Array2<f64>,
    /// Uncertainty per cell, NaN where empty.
    pub error: Array2<f64>,
    /// Number of points in each cell.
    pub counts: Array2<usize>,
    /// `n_bins_x + 1` edges along x.
    pub x_edges: Array1<f64>,
    /// `n_bins_y + 1` edges along y.
    pub y_edges: Array1<f64>,
    /// Bin centers along x.
    pub x_centers: Array1<f64>,
    /// Bin centers along y.
    pub y_centers: Array1<f64>,
}

/// A 1D cut through the map at a fixed y value, restricted to
/// `|x| < CUT_HALF_WIDTH`.
#[derive(Clone, Debug, PartialEq)]
pub struct Cut {
    /// `"<run numbers> <y label>=<value>"`.
    pub label: String,
    /// Requested y value.
    pub value: f64,
    /// Row of the map the value falls into.
    pub row: usize,
    /// x bin centers inside the band.
    pub x: Vec<f64>,
    /// Intensity of the row inside the band.
    pub intensity: Vec<f64>,
    /// Uncertainty of the row inside the band.
    pub error: Vec<f64>,
}

/// Rebin the positive-intensity points of a cloud.
///
/// # Errors
/// Returns a configuration error if the grid has no bin along an axis.
pub fn rebin(
    cloud: &MergedPointCloud,
    axes: OffSpecAxes,
    config: &RebinConfig,
) -> Result<RebinnedMap> {
    let (n_x, n_y) = (config.n_bins_x, config.n_bins_y);
    if n_x == 0 || n_y == 0 {
        return Err(ConfigError::EmptyGrid {
            n_bins_x: n_x,
            n_bins_y: n_y,
        }
        .into());
    }

    let (x_values, y_values) = select_axes(cloud, axes);
    let contributing: Vec<usize> = (0..cloud.len()).filter(|&i| cloud.s[i] > 0.0).collect();

    let x_edges = uniform_edges(contributing.iter().map(|&i| x_values[i]), n_x);
    let y_edges = uniform_edges(contributing.iter().map(|&i| y_values[i]), n_y);

    let mut sum_a = Array2::<f64>::zeros((n_y, n_x));
    let mut sum_b = Array2::<f64>::zeros((n_y, n_x));
    let mut counts = Array2::<usize>::zeros((n_y, n_x));

    for &i in &contributing {
        let (Some(ix), Some(iy)) = (
            find_bin(x_values[i], &x_edges),
            find_bin(y_values[i], &y_edges),
        ) else {
            continue;
        };
        let (s, ds) = (cloud.s[i], cloud.ds[i]);
        match config.mode {
            RebinMode::Weighted => {
                let weight = 1.0 / (ds * ds);
                sum_a[[iy, ix]] += s * weight;
                sum_b[[iy, ix]] += weight;
            }
            RebinMode::Simple => {
                sum_a[[iy, ix]] += s;
                sum_b[[iy, ix]] += ds * ds;
            }
        }
        counts[[iy, ix]] += 1;
    }

    let mut intensity = Array2::from_elem((n_y, n_x), f64::NAN);
    let mut error = Array2::from_elem((n_y, n_x), f64::NAN);
    for ((cell, &count), (a, b)) in counts
        .indexed_iter()
        .zip(sum_a.iter().zip(sum_b.iter()))
    {
        if count == 0 {
            continue;
        }
        let (value, err) = match config.mode {
            RebinMode::Weighted => (a / b, (1.0 / b).sqrt()),
            // Summed variance over count, kept for compatibility with
            // existing reduced data; not the standard error of the mean.
            RebinMode::Simple => (a / count as f64, b.sqrt() / count as f64),
        };
        intensity[cell] = value;
        error[cell] = err;
    }

    log::debug!(
        "rebinned {} of {} points onto {n_x} x {n_y} ({} vs {})",
        contributing.len(),
        cloud.len(),
        axes.x_label(),
        axes.y_label()
    );

    Ok(RebinnedMap {
        axes,
        intensity,
        error,
        counts,
        x_centers: bin_centers(&x_edges),
        y_centers: bin_centers(&y_edges),
        x_edges,
        y_edges,
    })
}

impl RebinnedMap {
    /// Extract one cut per requested y value. Values that do not fall
    /// strictly inside a y bin produce no cut.
    #[must_use]
    pub fn extract_cuts(&self, values: &[f64], run_numbers: &[u32]) -> Vec<Cut> {
        let band: Vec<usize> = self
            .x_centers
            .iter()
            .enumerate()
            .filter(|(_, x)| x.abs() < CUT_HALF_WIDTH)
            .map(|(i, _)| i)
            .collect();

        values
            .iter()
            .filter_map(|&value| {
                let y_edges = self.y_edges.as_slice().unwrap_or_default();
                let Some(row) = closest_bin(value, y_edges) else {
                    log::warn!(
                        "{}={value} is outside the map or on a bin edge; no cut extracted",
                        self.axes.y_label()
                    );
                    return None;
                };
                Some(Cut {
                    label: format!("{run_numbers:?} {}={value:?}", self.axes.y_label()),
                    value,
                    row,
                    x: band.iter().map(|&i| self.x_centers[i]).collect(),
                    intensity: band.iter().map(|&i| self.intensity[[row, i]]).collect(),
                    error: band.iter().map(|&i| self.error[[row, i]]).collect(),
                })
            })
            .collect()
    }

    /// `(n_bins_y, n_bins_x)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.intensity.dim()
    }
}

/// Index `i` of the bin with `edges[i] < q < edges[i + 1]`, scanning in order.
/// A value on an edge or outside all edges has no bin.
#[must_use]
pub fn closest_bin(q: f64, edges: &[f64]) -> Option<usize> {
    edges.windows(2).position(|w| q > w[0] && q < w[1])
}

/// `n + 1` uniform edges over the range of `values`. An empty input spans
/// `[0, 1]`; a single repeated value is widened by 0.5 on each side.
fn uniform_edges(values: impl Iterator<Item = f64>, n: usize) -> Array1<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (min, max) = if min > max {
        (0.0, 1.0)
    } else if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };
    let step = (max - min) / n as f64;
    Array1::from_shape_fn(n + 1, |i| if i == n { max } else { min + i as f64 * step })
}

/// Bin holding `value`: `edges[i] <= value < edges[i + 1]`, with the last
/// edge included in the last bin.
fn find_bin(value: f64, edges: &Array1<f64>) -> Option<usize> {
    let n = edges.len() - 1;
    if value.is_nan() || value < edges[0] || value > edges[n] {
        return None;
    }
    let upper = edges.as_slice().map_or_else(
        || edges.iter().take_while(|&&e| e <= value).count(),
        |e| e.partition_point(|&edge| edge <= value),
    );
    Some(upper.saturating_sub(1).min(n - 1))
}

fn bin_centers(edges: &Array1<f64>) -> Array1<f64> {
    let half = (edges[1] - edges[0]) / 2.0;
    edges.slice(ndarray::s![..-1]).mapv(|e| e + half)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn cloud(points: &[(f64, f64, f64, f64)]) -> MergedPointCloud {
        let mut cloud = MergedPointCloud::with_capacity(points.len());
        for &(x, y, s, ds) in points {
            cloud.qx.push(x);
            cloud.qz.push(y);
            cloud.ki_z.push(x + 1.0);
            cloud.kf_z.push(y - 1.0);
            cloud.delta_k.push(x - y + 2.0);
            cloud.s.push(s);
            cloud.ds.push(ds);
        }
        cloud
    }

    #[test]
    fn test_closest_bin_strict_bracket() {
        let edges = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(closest_bin(0.5, &edges), Some(0));
        assert_eq!(closest_bin(2.9, &edges), Some(2));
        // On an edge: no match
        assert_eq!(closest_bin(1.0, &edges), None);
        assert_eq!(closest_bin(0.0, &edges), None);
        assert_eq!(closest_bin(3.0, &edges), None);
        // Outside
        assert_eq!(closest_bin(-0.1, &edges), None);
        assert_eq!(closest_bin(3.5, &edges), None);
        assert_eq!(closest_bin(0.5, &[]), None);
    }

    #[test]
    fn test_constant_points_reproduce_constant() {
        let points: Vec<_> = (0..40)
            .map(|i| (f64::from(i % 7), f64::from(i % 5) * 0.3, 4.0, 0.5))
            .collect();
        let cloud = cloud(&points);

        for mode in [RebinMode::Weighted, RebinMode::Simple] {
            let config = RebinConfig::default().with_bins(4, 3).with_mode(mode);
            let map = rebin(&cloud, OffSpecAxes::QxVsQz, &config).unwrap();
            assert_eq!(map.shape(), (3, 4));
            assert_eq!(map.counts.sum(), 40);

            for ((cell, &count), &value) in map.counts.indexed_iter().zip(&map.intensity) {
                if count == 0 {
                    assert!(value.is_nan());
                    assert!(map.error[cell].is_nan());
                    continue;
                }
                assert_relative_eq!(value, 4.0, max_relative = 1e-12);
                // Both modes reduce to dS / sqrt(count) for identical points
                assert_relative_eq!(
                    map.error[cell],
                    0.5 / (count as f64).sqrt(),
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_weighted_vs_simple_mean() {
        // Two points in a single cell
        let cloud = cloud(&[(0.0, 0.0, 1.0, 1.0), (0.0, 0.0, 4.0, 2.0)]);
        let config = RebinConfig::default().with_bins(1, 1);

        let weighted = rebin(&cloud, OffSpecAxes::QxVsQz, &config).unwrap();
        // (1/1 + 4/4) / (1 + 1/4)
        assert_relative_eq!(weighted.intensity[[0, 0]], 2.0 / 1.25);
        assert_relative_eq!(weighted.error[[0, 0]], (1.0_f64 / 1.25).sqrt());

        let simple = rebin(&cloud, OffSpecAxes::QxVsQz, &config.with_mode(RebinMode::Simple))
            .unwrap();
        assert_relative_eq!(simple.intensity[[0, 0]], 2.5);
        // Known idiosyncrasy: sqrt(sum dS^2) / count, not a standard error of the mean
        assert_relative_eq!(simple.error[[0, 0]], 5.0_f64.sqrt() / 2.0);
    }

    #[test]
    fn test_non_positive_points_excluded() {
        let cloud = cloud(&[
            (0.0, 0.0, 2.0, 1.0),
            (1.0, 1.0, 2.0, 1.0),
            (50.0, 50.0, 0.0, 0.0),
            (-50.0, -50.0, -1.0, 1.0),
        ]);
        let map = rebin(&cloud, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(2, 2))
            .unwrap();
        // Range comes from the positive points only
        assert_eq!(map.x_edges, array![0.0, 0.5, 1.0]);
        assert_eq!(map.counts.sum(), 2);
        assert_eq!(map.counts[[0, 0]], 1);
        assert_eq!(map.counts[[1, 1]], 1);
        assert!(map.intensity[[0, 1]].is_nan());
    }

    #[test]
    fn test_edges_and_centers() {
        let cloud = cloud(&[(0.0, 10.0, 1.0, 1.0), (4.0, 20.0, 1.0, 1.0)]);
        let map = rebin(&cloud, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(4, 2))
            .unwrap();
        assert_eq!(map.x_edges, array![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(map.x_centers, array![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(map.y_centers, array![12.5, 17.5]);
        // Upper edge belongs to the last bin
        assert_eq!(map.counts[[1, 3]], 1);
    }

    #[test]
    fn test_degenerate_and_empty_ranges() {
        let single = cloud(&[(2.0, 3.0, 1.0, 1.0)]);
        let map = rebin(&single, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(2, 2))
            .unwrap();
        assert_eq!(map.x_edges, array![1.5, 2.0, 2.5]);
        assert_eq!(map.counts.sum(), 1);

        let empty = cloud(&[(2.0, 3.0, 0.0, 1.0)]);
        let map = rebin(&empty, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(2, 2))
            .unwrap();
        assert_eq!(map.y_edges, array![0.0, 0.5, 1.0]);
        assert!(map.intensity.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_zero_bins_rejected() {
        let cloud = cloud(&[(0.0, 0.0, 1.0, 1.0)]);
        assert!(rebin(&cloud, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(0, 3))
            .is_err());
    }

    #[test]
    fn test_axis_selection_is_bitwise() {
        let cloud = cloud(&[(0.1, 0.2, 1.0, 1.0), (0.3, 0.7, 1.0, 1.0)]);
        let (x, y) = select_axes(&cloud, OffSpecAxes::KizVsKfz);
        assert_eq!(x, cloud.ki_z.as_slice());
        assert_eq!(y, cloud.kf_z.as_slice());
        let (x, y) = select_axes(&cloud, OffSpecAxes::DeltaKVsQz);
        assert_eq!(x, cloud.delta_k.as_slice());
        assert_eq!(y, cloud.qz.as_slice());
    }

    #[test]
    fn test_cut_band_and_label() {
        // x centers at -0.015, -0.005, 0.005, 0.015 over [-0.02, 0.02]
        let cloud = cloud(&[
            (-0.02, 0.0, 1.0, 1.0),
            (-0.004, 0.3, 2.0, 1.0),
            (0.004, 0.3, 3.0, 1.0),
            (0.02, 1.0, 4.0, 1.0),
        ]);
        let map = rebin(&cloud, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(4, 2))
            .unwrap();

        let cuts = map.extract_cuts(&[0.25, 0.5, 2.0], &[1234, 1235]);
        assert_eq!(cuts.len(), 1);
        let cut = &cuts[0];
        assert_eq!(cut.label, "[1234, 1235] Qz=0.25");
        assert_eq!(cut.row, 0);
        assert_eq!(cut.x.len(), 2);
        assert_relative_eq!(cut.x[0], -0.005, epsilon = 1e-12);
        assert_eq!(cut.intensity, vec![2.0, 3.0]);
        assert_eq!(cut.error, vec![1.0, 1.0]);
    }

    #[test]
    fn test_whole_cut_value_keeps_decimal_point() {
        // y edges at 0, 2, 4
        let cloud = cloud(&[(-0.005, 0.0, 1.0, 1.0), (0.005, 4.0, 1.0, 1.0)]);
        let map = rebin(&cloud, OffSpecAxes::QxVsQz, &RebinConfig::default().with_bins(2, 2))
            .unwrap();
        let cuts = map.extract_cuts(&[1.0], &[42]);
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].label, "[42] Qz=1.0");
    }
}
