//! # calibr
//!
//! **Training-set calibration for graph property prediction, built on numr.**
//!
//! calibr sits between a dataset and a prediction pipeline: it derives
//! scale/shift constants from training-set statistics so raw network outputs
//! map into physically calibrated units, and it evaluates training losses
//! with NaN masking and per-atom / per-species aggregation over batches of
//! variable-size graphs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    calibr ◄── YOU ARE HERE               │
//! │  (statistic resolution, rescale config, loss reductions) │
//! └──────────────────────────┬──────────────────────────────┘
//! │                      numr                                │
//! │     (tensors, ops, runtime, autograd, linalg, FFT)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design
//!
//! - **Tagged configuration**: scale/shift values are an explicit variant
//!   (`Explicit` / `DatasetDerived` / `Absent`), resolved to tensors before
//!   the pipeline ever sees them
//! - **One statistics call**: symbolic statistic names are deduplicated and
//!   routed to the dataset backend in a single request batch
//! - **Named stages**: pipeline mutation goes through an ordered stage
//!   builder with name-indexed `insert_before`
//! - **Closed loss family**: aggregation kind × elementwise function, parsed
//!   once at configuration time

pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub mod pipeline;
pub mod reduce;
pub mod rescale;
pub mod stats;

// Re-export the primary calibr types
pub use config::{CalibrationConfig, ExplicitValue, RescaleValue};
pub use data::{DatasetStatistics, GraphBatch, StatResult};
pub use error::{Error, Result};
pub use loss::{find_loss_function, Aggregation, Elementwise, Loss, LossSpec, Reduction};
pub use pipeline::{
    GraphModel, PerSpeciesScaleShift, RescaleOutput, RescaleSpec, StagePipeline,
};
pub use rescale::{per_species_rescale, rescale_energy_outputs, RESCALE_THRESHOLD};
pub use stats::{StatKind, StatRequest, StatScope};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::error::{Error as NumrError, Result as NumrResult};
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;
