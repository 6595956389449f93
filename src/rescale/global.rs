//! Global rescaling of energy(-based) output quantities.

use std::collections::HashMap;

use super::{materialize, min_value, RESCALE_THRESHOLD};
use crate::config::{CalibrationConfig, RescaleValue};
use crate::data::fields;
use crate::data::statistics::DatasetStatistics;
use crate::error::{Error, Result};
use crate::pipeline::{GraphModel, RescaleOutput, RescaleSpec};
use crate::stats::compute_statistics;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Wrap `model` with a global scale/shift on its energy-based outputs.
///
/// Default policy: the scale is the dataset force RMS when the model
/// produces forces, else the dataset total-energy standard deviation; the
/// shift is absent — shifting the total energy would break extensivity, so
/// a shift must be asked for explicitly (and is warned about).
///
/// With `initialize = false` no statistics are computed: placeholder values
/// (`1.0` / `0.0`) stand in until the persisted values are restored through
/// [`RescaleOutput::load_state`], so only the shape of the specification is
/// established here.
pub fn rescale_energy_outputs<R, M, D>(
    model: M,
    config: &CalibrationConfig,
    dataset: &D,
    initialize: bool,
    device: &R::Device,
) -> Result<RescaleOutput<R, M>>
where
    R: Runtime<DType = DType>,
    M: GraphModel,
    D: DatasetStatistics<R> + ?Sized,
{
    let scale = config.global_rescale_scale.clone().unwrap_or_else(|| {
        if model.produces(fields::FORCE) {
            RescaleValue::statistic(format!("dataset_{}_rms", fields::FORCE))
        } else {
            RescaleValue::statistic(format!("dataset_{}_std", fields::TOTAL_ENERGY))
        }
    });
    let shift = config
        .global_rescale_shift
        .clone()
        .unwrap_or(RescaleValue::Absent);

    if !shift.is_absent() {
        tracing::warn!(
            shift = ?shift,
            "global shift is set; the energy model will no longer be extensive"
        );
    }

    let (scale_t, shift_t) = if initialize {
        let names: Vec<String> = [&scale, &shift]
            .into_iter()
            .filter_map(|v| v.statistic_name().map(String::from))
            .collect();
        let stats = compute_statistics(
            dataset,
            &names,
            config.dataset_statistics_stride,
            &HashMap::new(),
        )?;
        let resolved: HashMap<&str, Tensor<R>> =
            names.iter().map(|n| n.as_str()).zip(stats).collect();

        let scale_t = materialize(&scale, &resolved, device)?;
        let shift_t = materialize(&shift, &resolved, device)?;

        if let Some(tensor) = &scale_t {
            let min = min_value(tensor);
            if min < RESCALE_THRESHOLD {
                return Err(Error::DegenerateScale {
                    key: "global_rescale_scale",
                    min,
                    hint: "set global_rescale_scale to Absent to disable global scaling",
                });
            }
        }

        tracing::debug!(
            scale = ?scale_t.as_ref().map(|t| t.to_vec::<f32>()),
            shift = ?shift_t.as_ref().map(|t| t.to_vec::<f32>()),
            "initial global rescale values"
        );
        (scale_t, shift_t)
    } else {
        // placeholders; the persisted values arrive through load_state
        let scale_t = (!scale.is_absent())
            .then(|| Tensor::from_slice(&[1.0f32], &[1], device));
        let shift_t = (!shift.is_absent())
            .then(|| Tensor::from_slice(&[0.0f32], &[1], device));
        (scale_t, shift_t)
    };

    let scale_fields: Vec<String> = [
        fields::TOTAL_ENERGY,
        fields::PER_ATOM_ENERGY,
        fields::FORCE,
        fields::STRESS,
    ]
    .into_iter()
    .filter(|f| model.produces(f))
    .map(String::from)
    .collect();
    let shift_fields: Vec<String> = [fields::TOTAL_ENERGY]
        .into_iter()
        .filter(|f| model.produces(f))
        .map(String::from)
        .collect();

    Ok(RescaleOutput::new(
        model,
        RescaleSpec {
            scale_fields,
            shift_fields,
            scale_trainable: config.global_rescale_scale_trainable,
            shift_trainable: config.global_rescale_shift_trainable,
        },
        scale_t,
        shift_t,
    ))
}
