//! Calibration configuration and the tagged rescale-value type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::stats::StatParams;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// A literal scale or shift value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplicitValue {
    /// One value for every species / every output.
    Scalar(f64),
    /// One value per species.
    PerSpecies(Vec<f64>),
}

impl ExplicitValue {
    /// Materialize as an F32 tensor on `device`.
    pub fn to_tensor<R: Runtime<DType = DType>>(&self, device: &R::Device) -> Tensor<R> {
        match self {
            ExplicitValue::Scalar(v) => Tensor::from_slice(&[*v as f32], &[1], device),
            ExplicitValue::PerSpecies(values) => {
                let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                Tensor::from_slice(&data, &[data.len()], device)
            }
        }
    }
}

/// A configured scale or shift: a literal value, a dataset statistic to
/// resolve at initialization, or explicitly disabled.
///
/// Configurators resolve every variant to an optional tensor before handing
/// it to the pipeline, so no type-sniffing survives past setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RescaleValue {
    /// A literal value, in the units the configuration declares.
    Explicit(ExplicitValue),
    /// A symbolic statistic identifier, e.g. `dataset_forces_rms`.
    DatasetDerived(String),
    /// No scaling / shifting.
    Absent,
}

impl RescaleValue {
    /// Shorthand for an explicit scalar.
    pub fn scalar(v: f64) -> Self {
        RescaleValue::Explicit(ExplicitValue::Scalar(v))
    }

    /// Shorthand for a dataset statistic.
    pub fn statistic(name: impl Into<String>) -> Self {
        RescaleValue::DatasetDerived(name.into())
    }

    /// The statistic identifier, if dataset-derived.
    pub fn statistic_name(&self) -> Option<&str> {
        match self {
            RescaleValue::DatasetDerived(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this value is disabled.
    pub fn is_absent(&self) -> bool {
        matches!(self, RescaleValue::Absent)
    }

    /// Whether this value is resolved from training-set statistics.
    pub fn is_dataset_derived(&self) -> bool {
        matches!(self, RescaleValue::DatasetDerived(_))
    }
}

/// Configuration consumed by the rescale configurators.
///
/// `None` on the rescale fields means "not configured": the configurator
/// applies its default policy, which depends on the model's outputs and on
/// `train_on_keys`. [`RescaleValue::Absent`] disables the value outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Global output scale, or `None` for the default policy.
    pub global_rescale_scale: Option<RescaleValue>,
    /// Global total-energy shift, or `None` for no shift (extensivity).
    pub global_rescale_shift: Option<RescaleValue>,
    pub global_rescale_scale_trainable: bool,
    pub global_rescale_shift_trainable: bool,
    /// Per-species scales, or `None` for the default policy.
    pub per_species_rescale_scales: Option<RescaleValue>,
    /// Per-species shifts, or `None` for the default policy.
    pub per_species_rescale_shifts: Option<RescaleValue>,
    /// Declaration that explicitly supplied per-species values are in
    /// dataset units. Required when exactly one of scales/shifts is
    /// dataset-derived.
    pub per_species_rescale_arguments_in_dataset_units: Option<bool>,
    /// Per-field auxiliary parameters for per-species statistics.
    pub per_species_rescale_kwargs: HashMap<String, StatParams>,
    /// Keep every `stride`-th frame when computing dataset statistics.
    pub dataset_statistics_stride: usize,
    /// Quantity keys the training loop optimizes on.
    pub train_on_keys: Vec<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            global_rescale_scale: None,
            global_rescale_shift: None,
            global_rescale_scale_trainable: false,
            global_rescale_shift_trainable: false,
            per_species_rescale_scales: None,
            per_species_rescale_shifts: None,
            per_species_rescale_arguments_in_dataset_units: None,
            per_species_rescale_kwargs: HashMap::new(),
            dataset_statistics_stride: 1,
            train_on_keys: Vec::new(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_global_scale(mut self, value: RescaleValue) -> Self {
        self.global_rescale_scale = Some(value);
        self
    }

    pub fn with_global_shift(mut self, value: RescaleValue) -> Self {
        self.global_rescale_shift = Some(value);
        self
    }

    pub fn with_per_species_scales(mut self, value: RescaleValue) -> Self {
        self.per_species_rescale_scales = Some(value);
        self
    }

    pub fn with_per_species_shifts(mut self, value: RescaleValue) -> Self {
        self.per_species_rescale_shifts = Some(value);
        self
    }

    pub fn with_arguments_in_dataset_units(mut self, declared: bool) -> Self {
        self.per_species_rescale_arguments_in_dataset_units = Some(declared);
        self
    }

    pub fn with_statistics_stride(mut self, stride: usize) -> Self {
        self.dataset_statistics_stride = stride;
        self
    }

    pub fn with_train_on_keys(mut self, keys: Vec<String>) -> Self {
        self.train_on_keys = keys;
        self
    }

    /// Whether the training loop optimizes on `key`.
    pub fn trains_on(&self, key: &str) -> bool {
        self.train_on_keys.iter().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CalibrationConfig::default();
        assert!(config.global_rescale_scale.is_none());
        assert!(config.global_rescale_shift.is_none());
        assert_eq!(config.dataset_statistics_stride, 1);
        assert!(!config.trains_on("forces"));
    }

    #[test]
    fn test_builder() {
        let config = CalibrationConfig::default()
            .with_global_scale(RescaleValue::scalar(2.0))
            .with_train_on_keys(vec!["forces".to_string()])
            .with_statistics_stride(4);
        assert_eq!(
            config.global_rescale_scale,
            Some(RescaleValue::Explicit(ExplicitValue::Scalar(2.0)))
        );
        assert!(config.trains_on("forces"));
        assert_eq!(config.dataset_statistics_stride, 4);
    }

    #[test]
    fn test_rescale_value_accessors() {
        assert!(RescaleValue::Absent.is_absent());
        assert!(RescaleValue::statistic("dataset_forces_rms").is_dataset_derived());
        assert_eq!(
            RescaleValue::statistic("dataset_forces_rms").statistic_name(),
            Some("dataset_forces_rms")
        );
        assert_eq!(RescaleValue::scalar(1.0).statistic_name(), None);
    }
}
