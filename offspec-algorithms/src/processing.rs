//! High-level helpers that chain extraction, merging and rebinning over a
//! reduction list.

use crate::extract::{extract, Normalization, NormalizationStatus};
use crate::merge::merge;
use crate::rebin::{rebin, Cut, RebinConfig, RebinnedMap};
use offspec_core::{Result, Run};
use rayon::prelude::*;

/// Rebinned off-specular map of a reduction list with its cuts.
#[derive(Clone, Debug, PartialEq)]
pub struct OffSpecMap {
    /// Rebinned grid.
    pub map: RebinnedMap,
    /// Cuts at the requested y values that fall inside a bin.
    pub cuts: Vec<Cut>,
    /// Run numbers in reduction-list order.
    pub run_numbers: Vec<u32>,
    /// Cross-section label the map was built from.
    pub label: String,
}

impl OffSpecMap {
    /// Label of the horizontal axis.
    #[must_use]
    pub fn x_label(&self) -> &'static str {
        self.map.axes.x_label()
    }

    /// Label of the vertical axis.
    #[must_use]
    pub fn y_label(&self) -> &'static str {
        self.map.axes.y_label()
    }
}

/// Extract cross-section `label` of every run in parallel.
///
/// Runs are independent: a run that lacks the cross-section or fails to
/// extract gets an `Err` in its slot and every other run is still
/// extracted. Results come back in reduction-list order.
#[must_use]
pub fn extract_reduction_list(
    runs: &mut [Run],
    label: &str,
    direct_beam: Option<&Normalization>,
) -> Vec<Result<NormalizationStatus>> {
    runs.par_iter_mut()
        .map(|run| {
            let number = run.number;
            let status = extract(run.cross_section_mut(label)?, direct_beam).inspect_err(|e| {
                log::error!("run {number} [{label}]: extraction failed: {e}");
            })?;
            if let NormalizationStatus::Applied { unmeasurable_bins } = status {
                if unmeasurable_bins > 0 {
                    log::info!(
                        "run {number} [{label}]: {unmeasurable_bins} time bins without direct beam set to zero"
                    );
                }
            }
            Ok(status)
        })
        .collect()
}

/// Merge the extracted runs, rebin them and extract cuts at `cut_values`.
///
/// The axis pair comes from the region of interest of the first run.
/// Returns `Ok(None)` for an empty reduction list.
///
/// # Errors
/// Returns an error if a run was not extracted or the grid is empty.
pub fn rebin_extract(
    runs: &[Run],
    label: &str,
    cut_values: &[f64],
    config: &RebinConfig,
) -> Result<Option<OffSpecMap>> {
    let Some(first) = runs.first() else {
        log::warn!("empty reduction list; nothing to rebin");
        return Ok(None);
    };
    let axes = first.cross_section(label)?.measurement().roi().axes;

    let cloud = merge(runs, label)?;
    let map = rebin(&cloud, axes, config)?;
    let run_numbers: Vec<u32> = runs.iter().map(|run| run.number).collect();
    let cuts = map.extract_cuts(cut_values, &run_numbers);

    log::info!(
        "{label}: {} points from {} runs rebinned to {} x {}, {} cuts",
        cloud.len(),
        runs.len(),
        config.n_bins_x,
        config.n_bins_y,
        cuts.len()
    );

    Ok(Some(OffSpecMap {
        map,
        cuts,
        run_numbers,
        label: label.to_string(),
    }))
}
