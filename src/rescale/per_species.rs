//! Per-species rescaling of atomic energies.

use std::collections::HashMap;

use super::{materialize, min_value, RESCALE_THRESHOLD};
use crate::config::{CalibrationConfig, RescaleValue};
use crate::data::fields;
use crate::data::statistics::DatasetStatistics;
use crate::error::{Error, Result};
use crate::pipeline::{
    PerSpeciesScaleShift, StagePipeline, PER_SPECIES_RESCALE_STAGE, TOTAL_ENERGY_SUM_STAGE,
};
use crate::stats::compute_statistics;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Insert a per-species scale/shift stage into `pipeline`, immediately
/// before the `total_energy_sum` stage.
///
/// Default policy: scales are the dataset force RMS when forces are among
/// `train_on_keys` (noisy local signal is available), else the dataset
/// per-atom total-energy standard deviation; shifts are the dataset
/// per-atom total-energy mean.
///
/// Unit consistency: when both values are dataset-derived they share the
/// dataset's units automatically. When exactly one is dataset-derived, the
/// configuration must declare `per_species_rescale_arguments_in_dataset_units
/// = true` — mixing calibrated and uncalibrated magnitudes in one
/// multiply-add pair is forbidden.
///
/// With `initialize = false`, placeholder values (`1.0` / `0.0`) are
/// inserted; the persisted values arrive later through
/// [`PerSpeciesScaleShift::load_state`].
pub fn per_species_rescale<R, S, D>(
    pipeline: &mut StagePipeline<S>,
    config: &CalibrationConfig,
    dataset: &D,
    initialize: bool,
    device: &R::Device,
) -> Result<()>
where
    R: Runtime<DType = DType>,
    S: From<PerSpeciesScaleShift<R>>,
    D: DatasetStatistics<R> + ?Sized,
{
    let scales = config.per_species_rescale_scales.clone().unwrap_or_else(|| {
        if config.trains_on(fields::FORCE) {
            RescaleValue::statistic(format!("dataset_{}_rms", fields::FORCE))
        } else {
            RescaleValue::statistic(format!("dataset_per_atom_{}_std", fields::TOTAL_ENERGY))
        }
    });
    let shifts = config.per_species_rescale_shifts.clone().unwrap_or_else(|| {
        RescaleValue::statistic(format!("dataset_per_atom_{}_mean", fields::TOTAL_ENERGY))
    });

    let (scales_t, shifts_t, arguments_in_dataset_units) = if initialize {
        let derived = [&scales, &shifts]
            .into_iter()
            .filter(|v| v.is_dataset_derived())
            .count();
        let arguments_in_dataset_units = match derived {
            2 => Some(true),
            1 => {
                if config.per_species_rescale_arguments_in_dataset_units != Some(true) {
                    return Err(Error::InvalidConfigValue {
                        key: "per_species_rescale_arguments_in_dataset_units",
                        reason: "one of per_species_rescale_scales/shifts is dataset-derived \
                                 while the other is explicit; give the explicit value in \
                                 dataset units and set this option to true"
                            .to_string(),
                    });
                }
                Some(true)
            }
            _ => config.per_species_rescale_arguments_in_dataset_units,
        };

        let names: Vec<String> = [&scales, &shifts]
            .into_iter()
            .filter_map(|v| v.statistic_name().map(String::from))
            .collect();
        let stats = compute_statistics(
            dataset,
            &names,
            config.dataset_statistics_stride,
            &config.per_species_rescale_kwargs,
        )?;
        let resolved: HashMap<&str, Tensor<R>> =
            names.iter().map(|n| n.as_str()).zip(stats).collect();

        let scales_t = materialize(&scales, &resolved, device)?;
        let shifts_t = materialize(&shifts, &resolved, device)?;

        if let Some(tensor) = &scales_t {
            let min = min_value(tensor);
            if min < RESCALE_THRESHOLD {
                return Err(Error::DegenerateScale {
                    key: "per_species_rescale_scales",
                    min,
                    hint: "set per_species_rescale_scales = 1 to disable per-species scaling",
                });
            }
        }

        (scales_t, shifts_t, arguments_in_dataset_units)
    } else {
        // placeholders; correctly scaled values come from the persisted
        // state, so the unit declaration carried here is irrelevant
        (
            Some(Tensor::from_slice(&[1.0f32], &[1], device)),
            Some(Tensor::from_slice(&[0.0f32], &[1], device)),
            Some(false),
        )
    };

    tracing::debug!(
        scales = ?scales_t.as_ref().map(|t| t.to_vec::<f32>()),
        shifts = ?shifts_t.as_ref().map(|t| t.to_vec::<f32>()),
        "per-species rescale values"
    );

    pipeline.insert_before(
        TOTAL_ENERGY_SUM_STAGE,
        PER_SPECIES_RESCALE_STAGE,
        PerSpeciesScaleShift {
            field: fields::PER_ATOM_ENERGY.to_string(),
            out_field: fields::PER_ATOM_ENERGY.to_string(),
            scales: scales_t,
            shifts: shifts_t,
            arguments_in_dataset_units,
        }
        .into(),
    )
}
