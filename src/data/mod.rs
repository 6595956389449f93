//! Batch representation, quantity-key registry, and the dataset
//! statistics contract.

pub mod batch;
pub mod fields;
pub mod statistics;

pub use batch::GraphBatch;
pub use statistics::{DatasetStatistics, StatResult};
