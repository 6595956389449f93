//! Prediction-pipeline contracts: output-field sets, the ordered stage
//! builder, and the scale/shift stage parameter types.
//!
//! Stage *execution* belongs to the model system that owns the pipeline;
//! this crate owns stage order and the calibration parameters. Once a
//! configurator hands scale/shift tensors to a stage, the stage owns them —
//! configurators retain no references after returning.

use std::collections::HashMap;

use crate::error::{Error, Result};
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Stage name the per-species configurator inserts before.
pub const TOTAL_ENERGY_SUM_STAGE: &str = "total_energy_sum";

/// Stage name under which the per-species scale/shift is inserted.
pub const PER_SPECIES_RESCALE_STAGE: &str = "per_species_rescale";

/// A model exposing the set of quantity fields it produces.
pub trait GraphModel {
    /// Quantity keys this model writes into a batch.
    fn output_fields(&self) -> &[String];

    /// Whether the model produces `field`.
    fn produces(&self, field: &str) -> bool {
        self.output_fields().iter().any(|f| f == field)
    }
}

/// Ordered, named stages with name-indexed insertion.
///
/// Stage names are unique; lookups go through a name → position index that
/// is rebuilt on insertion, so anchor resolution never depends on scanning
/// for a name that might collide.
pub struct StagePipeline<S> {
    stages: Vec<(String, S)>,
    index: HashMap<String, usize>,
    output_fields: Vec<String>,
}

impl<S> StagePipeline<S> {
    /// Create an empty pipeline producing `output_fields`.
    pub fn new(output_fields: Vec<String>) -> Self {
        Self {
            stages: Vec::new(),
            index: HashMap::new(),
            output_fields,
        }
    }

    /// Append a named stage.
    pub fn push(&mut self, name: impl Into<String>, stage: S) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateStage { name });
        }
        self.index.insert(name.clone(), self.stages.len());
        self.stages.push((name, stage));
        Ok(())
    }

    /// Insert a named stage immediately before the stage named `anchor`.
    pub fn insert_before(&mut self, anchor: &str, name: impl Into<String>, stage: S) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateStage { name });
        }
        let at = *self.index.get(anchor).ok_or_else(|| Error::MissingStage {
            anchor: anchor.to_string(),
        })?;
        self.stages.insert(at, (name, stage));
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.index = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }

    /// Position of the stage named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// The stage named `name`.
    pub fn get(&self, name: &str) -> Option<&S> {
        self.index_of(name).map(|i| &self.stages[i].1)
    }

    /// Mutable access to the stage named `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut S> {
        let i = self.index_of(name)?;
        Some(&mut self.stages[i].1)
    }

    /// Stage names in pipeline order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|(name, _)| name.as_str())
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<S> GraphModel for StagePipeline<S> {
    fn output_fields(&self) -> &[String] {
        &self.output_fields
    }
}

/// Which fields a global rescale applies to, and whether its parameters
/// train.
///
/// Invariant: only fields the wrapped model actually produces are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescaleSpec {
    /// Fields multiplied by the scale.
    pub scale_fields: Vec<String>,
    /// Fields offset by the shift.
    pub shift_fields: Vec<String>,
    pub scale_trainable: bool,
    pub shift_trainable: bool,
}

/// A model wrapped with a global scale/shift on selected output fields.
///
/// The wrapper owns the resolved values; the model system that executes the
/// pipeline performs the actual multiply-add. `state`/`load_state` let the
/// checkpointing subsystem persist and restore the values — a wrapper built
/// with `initialize = false` carries placeholder values until
/// [`load_state`](RescaleOutput::load_state) is called.
#[derive(Debug)]
pub struct RescaleOutput<R: Runtime, M> {
    model: M,
    spec: RescaleSpec,
    scale: Option<Tensor<R>>,
    shift: Option<Tensor<R>>,
}

impl<R: Runtime, M: GraphModel> RescaleOutput<R, M> {
    /// Wrap `model` with the given spec and resolved values.
    pub fn new(
        model: M,
        spec: RescaleSpec,
        scale: Option<Tensor<R>>,
        shift: Option<Tensor<R>>,
    ) -> Self {
        Self {
            model,
            spec,
            scale,
            shift,
        }
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Unwrap, dropping the rescale stage.
    pub fn into_inner(self) -> M {
        self.model
    }

    pub fn spec(&self) -> &RescaleSpec {
        &self.spec
    }

    /// The resolved scale, if scaling is active.
    pub fn scale(&self) -> Option<&Tensor<R>> {
        self.scale.as_ref()
    }

    /// The resolved shift, if shifting is active.
    pub fn shift(&self) -> Option<&Tensor<R>> {
        self.shift.as_ref()
    }

    /// Export the rescale parameters as a name → tensor map.
    pub fn state(&self) -> HashMap<String, Tensor<R>> {
        let mut state = HashMap::new();
        if let Some(scale) = &self.scale {
            state.insert("scale".to_string(), scale.clone());
        }
        if let Some(shift) = &self.shift {
            state.insert("shift".to_string(), shift.clone());
        }
        state
    }

    /// Restore rescale parameters from a name → tensor map.
    ///
    /// Every active slot must be present in `state`; inactive slots are
    /// left alone.
    pub fn load_state(&mut self, state: &HashMap<String, Tensor<R>>) -> Result<()> {
        if self.scale.is_some() {
            let scale = state.get("scale").ok_or_else(|| Error::MissingField {
                field: "scale".to_string(),
            })?;
            self.scale = Some(scale.clone());
        }
        if self.shift.is_some() {
            let shift = state.get("shift").ok_or_else(|| Error::MissingField {
                field: "shift".to_string(),
            })?;
            self.shift = Some(shift.clone());
        }
        Ok(())
    }
}

impl<R: Runtime, M: GraphModel> GraphModel for RescaleOutput<R, M> {
    fn output_fields(&self) -> &[String] {
        self.model.output_fields()
    }
}

/// Parameters of a per-species scale/shift stage.
///
/// Reads `field`, writes `out_field`; each atom's value is scaled and
/// shifted by its species' entry. `arguments_in_dataset_units` records
/// whether the values are expressed in dataset units (`None` when the
/// configuration never declared it and nothing was dataset-derived).
pub struct PerSpeciesScaleShift<R: Runtime> {
    pub field: String,
    pub out_field: String,
    /// Per-species scales, `[n_species]` or scalar `[1]`; `None` disables.
    pub scales: Option<Tensor<R>>,
    /// Per-species shifts, `[n_species]` or scalar `[1]`; `None` disables.
    pub shifts: Option<Tensor<R>>,
    pub arguments_in_dataset_units: Option<bool>,
}

impl<R: Runtime> PerSpeciesScaleShift<R> {
    /// Export the stage parameters as a name → tensor map.
    pub fn state(&self) -> HashMap<String, Tensor<R>> {
        let mut state = HashMap::new();
        if let Some(scales) = &self.scales {
            state.insert("scales".to_string(), scales.clone());
        }
        if let Some(shifts) = &self.shifts {
            state.insert("shifts".to_string(), shifts.clone());
        }
        state
    }

    /// Restore stage parameters from a name → tensor map.
    pub fn load_state(&mut self, state: &HashMap<String, Tensor<R>>) -> Result<()> {
        if self.scales.is_some() {
            let scales = state.get("scales").ok_or_else(|| Error::MissingField {
                field: "scales".to_string(),
            })?;
            self.scales = Some(scales.clone());
        }
        if self.shifts.is_some() {
            let shifts = state.get("shifts").ok_or_else(|| Error::MissingField {
                field: "shifts".to_string(),
            })?;
            self.shifts = Some(shifts.clone());
        }
        Ok(())
    }
}
