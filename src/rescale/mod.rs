//! Rescale configurators: decide scale/shift values for a prediction
//! pipeline from configuration and training-set statistics.

pub mod global;
pub mod per_species;

pub use global::rescale_energy_outputs;
pub use per_species::per_species_rescale;

use std::collections::HashMap;

use crate::config::RescaleValue;
use crate::error::{Error, Result};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Resolved scales below this threshold indicate degenerate training-set
/// variation and fail configuration.
pub const RESCALE_THRESHOLD: f64 = 1e-6;

/// Resolve a configured value to a tensor.
///
/// Dataset-derived values are looked up in `resolved` (statistic name →
/// computed tensor); explicit values are materialized on `device`.
fn materialize<R>(
    value: &RescaleValue,
    resolved: &HashMap<&str, Tensor<R>>,
    device: &R::Device,
) -> Result<Option<Tensor<R>>>
where
    R: Runtime<DType = DType>,
{
    match value {
        RescaleValue::Absent => Ok(None),
        RescaleValue::Explicit(v) => Ok(Some(v.to_tensor(device))),
        RescaleValue::DatasetDerived(name) => {
            let tensor = resolved
                .get(name.as_str())
                .ok_or_else(|| Error::StatisticsBackend {
                    reason: format!("statistic '{name}' was not resolved"),
                })?;
            tracing::debug!(statistic = %name, "resolved dataset statistic");
            Ok(Some(tensor.clone()))
        }
    }
}

/// Elementwise minimum of a resolved value.
fn min_value<R>(tensor: &Tensor<R>) -> f64
where
    R: Runtime<DType = DType>,
{
    tensor
        .to_vec::<f32>()
        .iter()
        .fold(f64::INFINITY, |min, &v| min.min(v as f64))
}
