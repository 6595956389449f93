//! End-to-end calibration tests: default policy resolution, the
//! initialize=false round trip, and loss evaluation on a configured batch.

use std::cell::Cell;
use std::collections::HashMap;

use calibr::data::fields;
use calibr::{
    find_loss_function, per_species_rescale, rescale_energy_outputs, CalibrationConfig,
    DatasetStatistics, GraphBatch, GraphModel, PerSpeciesScaleShift, Reduction, RescaleValue,
    StagePipeline, StatRequest, StatResult,
};
use numr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
use numr::tensor::Tensor;

fn cpu_setup() -> (CpuClient, CpuDevice) {
    let device = CpuDevice::new();
    let client = CpuClient::new(device.clone());
    (client, device)
}

/// Canned backend that also counts how many requests one call carries.
struct CountingStats {
    entries: HashMap<(String, String), (Vec<f32>, Option<Vec<f32>>)>,
    device: CpuDevice,
    last_request_count: Cell<usize>,
}

impl CountingStats {
    fn new(device: CpuDevice) -> Self {
        Self {
            entries: HashMap::new(),
            device,
            last_request_count: Cell::new(0),
        }
    }

    fn with(mut self, field: &str, mode: &str, value: &[f32], spread: Option<&[f32]>) -> Self {
        self.entries.insert(
            (field.to_string(), mode.to_string()),
            (value.to_vec(), spread.map(|s| s.to_vec())),
        );
        self
    }
}

impl DatasetStatistics<CpuRuntime> for CountingStats {
    fn statistics(
        &self,
        requests: &[StatRequest],
        _stride: usize,
    ) -> calibr::Result<Vec<StatResult<CpuRuntime>>> {
        self.last_request_count.set(requests.len());
        requests
            .iter()
            .map(|r| {
                let (value, spread) = self
                    .entries
                    .get(&(r.field.clone(), r.mode()))
                    .unwrap_or_else(|| panic!("no entry for '{}' mode '{}'", r.field, r.mode()));
                Ok(StatResult {
                    value: Tensor::from_slice(value, &[value.len()], &self.device),
                    spread: spread
                        .as_ref()
                        .map(|s| Tensor::from_slice(s, &[s.len()], &self.device)),
                })
            })
            .collect()
    }
}

struct ForceModel {
    outputs: Vec<String>,
}

impl ForceModel {
    fn new() -> Self {
        Self {
            outputs: vec![
                fields::TOTAL_ENERGY.to_string(),
                fields::FORCE.to_string(),
            ],
        }
    }
}

impl GraphModel for ForceModel {
    fn output_fields(&self) -> &[String] {
        &self.outputs
    }
}

#[test]
fn test_force_model_defaults_to_force_rms() {
    let (_, device) = cpu_setup();
    let dataset = CountingStats::new(device.clone()).with(fields::FORCE, "rms", &[1.25], None);

    let config = CalibrationConfig::default();
    let wrapped =
        rescale_energy_outputs(ForceModel::new(), &config, &dataset, true, &device).unwrap();

    // the omitted scale resolved to the force RMS, not the energy std
    assert_eq!(wrapped.scale().unwrap().to_vec::<f32>(), vec![1.25]);
    assert!(wrapped.shift().is_none());
    assert!(wrapped.produces(fields::FORCE));
}

#[test]
fn test_mean_and_std_share_one_backend_request() {
    let (_, device) = cpu_setup();
    let dataset = CountingStats::new(device.clone()).with(
        fields::TOTAL_ENERGY,
        "mean_std",
        &[-7.5],
        Some(&[0.9]),
    );

    let config = CalibrationConfig::default()
        .with_global_scale(RescaleValue::statistic("dataset_total_energy_std"))
        .with_global_shift(RescaleValue::statistic("dataset_total_energy_mean"));
    let model = StagePipeline::<()>::new(vec![fields::TOTAL_ENERGY.to_string()]);
    let wrapped = rescale_energy_outputs(model, &config, &dataset, true, &device).unwrap();

    assert_eq!(dataset.last_request_count.get(), 1);
    assert_eq!(wrapped.scale().unwrap().to_vec::<f32>(), vec![0.9]);
    assert_eq!(wrapped.shift().unwrap().to_vec::<f32>(), vec![-7.5]);
}

#[test]
fn test_global_round_trip_restores_fitted_values() {
    let (_, device) = cpu_setup();
    let dataset = CountingStats::new(device.clone()).with(fields::FORCE, "rms", &[1.25], None);
    let config = CalibrationConfig::default();

    let fitted =
        rescale_energy_outputs(ForceModel::new(), &config, &dataset, true, &device).unwrap();
    let persisted = fitted.state();

    // a fresh non-initialized run carries placeholders with the same shape
    let empty = CountingStats::new(device.clone());
    let mut restored =
        rescale_energy_outputs(ForceModel::new(), &config, &empty, false, &device).unwrap();
    assert_eq!(restored.scale().unwrap().to_vec::<f32>(), vec![1.0]);
    assert_eq!(restored.spec(), fitted.spec());

    restored.load_state(&persisted).unwrap();
    assert_eq!(
        restored.scale().unwrap().to_vec::<f32>(),
        fitted.scale().unwrap().to_vec::<f32>()
    );
}

enum Stage {
    Compute,
    Rescale(PerSpeciesScaleShift<CpuRuntime>),
}

impl From<PerSpeciesScaleShift<CpuRuntime>> for Stage {
    fn from(stage: PerSpeciesScaleShift<CpuRuntime>) -> Self {
        Stage::Rescale(stage)
    }
}

fn energy_pipeline() -> StagePipeline<Stage> {
    let mut p = StagePipeline::new(vec![fields::TOTAL_ENERGY.to_string()]);
    p.push("species_embedding", Stage::Compute).unwrap();
    p.push("interaction", Stage::Compute).unwrap();
    p.push("total_energy_sum", Stage::Compute).unwrap();
    p
}

#[test]
fn test_per_species_round_trip_restores_fitted_values() {
    let (_, device) = cpu_setup();
    let dataset = CountingStats::new(device.clone()).with(
        fields::TOTAL_ENERGY,
        "per_atom_mean_std",
        &[-3.0, -5.0],
        Some(&[0.4, 0.6]),
    );
    let config = CalibrationConfig::default();

    let mut fitted = energy_pipeline();
    per_species_rescale(&mut fitted, &config, &dataset, true, &device).unwrap();
    let persisted = match fitted.get("per_species_rescale").unwrap() {
        Stage::Rescale(stage) => stage.state(),
        Stage::Compute => unreachable!(),
    };

    let empty = CountingStats::new(device.clone());
    let mut restored = energy_pipeline();
    per_species_rescale(&mut restored, &config, &empty, false, &device).unwrap();

    // inserted in the same position, placeholder values until load_state
    assert_eq!(restored.index_of("per_species_rescale"), Some(2));
    assert_eq!(restored.index_of("total_energy_sum"), Some(3));

    let stage = match restored.get_mut("per_species_rescale").unwrap() {
        Stage::Rescale(stage) => stage,
        Stage::Compute => unreachable!(),
    };
    assert_eq!(stage.scales.as_ref().unwrap().to_vec::<f32>(), vec![1.0]);
    stage.load_state(&persisted).unwrap();
    assert_eq!(
        stage.scales.as_ref().unwrap().to_vec::<f32>(),
        vec![0.4, 0.6]
    );
    assert_eq!(
        stage.shifts.as_ref().unwrap().to_vec::<f32>(),
        vec![-3.0, -5.0]
    );
}

#[test]
fn test_configured_losses_over_one_batch() {
    let (client, device) = cpu_setup();

    // two graphs: atoms [0, 1] and [1, 1, 1] by species
    let mut pred = GraphBatch::<CpuRuntime>::new();
    pred.insert(
        fields::TOTAL_ENERGY,
        Tensor::from_slice(&[1.0f32, 2.0], &[2], &device),
    );
    pred.insert(
        fields::FORCE,
        Tensor::from_slice(&[1.0f32, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0], &[5, 2], &device),
    );
    pred.insert(
        fields::ATOM_TYPE,
        Tensor::from_slice(&[0i64, 1, 1, 1, 1], &[5], &device),
    );

    let mut reference = GraphBatch::<CpuRuntime>::new();
    reference.insert(
        fields::TOTAL_ENERGY,
        Tensor::from_slice(&[0.0f32, 0.0], &[2], &device),
    );
    reference.insert(
        fields::FORCE,
        Tensor::from_slice(&[0.0f32; 10], &[5, 2], &device),
    );
    reference.insert(
        fields::BATCH,
        Tensor::from_slice(&[0i64, 0, 1, 1, 1], &[5], &device),
    );

    // PerAtomMSE on total energy: 1/2^2 and 4/3^2, mean
    let energy_loss = find_loss_function("PerAtomMSELoss", false).unwrap();
    let e = energy_loss
        .evaluate(&client, &pred, &reference, fields::TOTAL_ENERGY, Reduction::Mean)
        .unwrap()
        .to_vec::<f32>()[0];
    let expected = (1.0 / 4.0 + 4.0 / 9.0) / 2.0;
    assert!((e - expected).abs() < 1e-6, "got {e}, expected {expected}");

    // PerSpeciesMAE on forces: species 0 mean 0.5, species 1 mean 0.25
    let force_loss = find_loss_function("PerSpeciesMAELoss", false).unwrap();
    let f = force_loss
        .evaluate(&client, &pred, &reference, fields::FORCE, Reduction::Mean)
        .unwrap()
        .to_vec::<f32>()[0];
    assert!((f - 0.375).abs() < 1e-6, "got {f}");
}
