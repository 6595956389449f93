//! Field map for one collated batch of atomic graphs.

use std::collections::HashMap;

use crate::data::fields;
use crate::error::{Error, Result};
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// One collated batch of atomic graphs: quantity key → tensor.
///
/// Node-level tensors have leading axis `n_atoms`, graph-level tensors have
/// leading axis `n_graphs`. The grouping fields ([`fields::BATCH`],
/// [`fields::ATOM_TYPE`]) are produced by the data pipeline, not owned here.
///
/// Tensors are expected to be CPU-resident during loss evaluation; GPU
/// transfer (if any) is handled by the caller after batching.
pub struct GraphBatch<R: Runtime> {
    values: HashMap<String, Tensor<R>>,
}

impl<R: Runtime> Default for GraphBatch<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> GraphBatch<R> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Insert a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Tensor<R>) {
        self.values.insert(key.into(), value);
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Tensor<R>> {
        self.values.get(key)
    }

    /// Whether the batch carries `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Look up a field, failing with [`Error::MissingField`] if absent.
    pub fn field(&self, key: &str) -> Result<&Tensor<R>> {
        self.values.get(key).ok_or_else(|| Error::MissingField {
            field: key.to_string(),
        })
    }

    /// The per-atom graph-assignment field (`batch`).
    pub fn batch_index(&self) -> Result<&Tensor<R>> {
        self.field(fields::BATCH)
    }

    /// The per-atom species-assignment field (`atom_types`).
    pub fn atom_types(&self) -> Result<&Tensor<R>> {
        self.field(fields::ATOM_TYPE)
    }

    /// Field names present in the batch.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

impl<R: Runtime> From<HashMap<String, Tensor<R>>> for GraphBatch<R> {
    fn from(values: HashMap<String, Tensor<R>>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numr::runtime::cpu::{CpuDevice, CpuRuntime};

    #[test]
    fn test_field_lookup() {
        let device = CpuDevice::new();
        let mut batch = GraphBatch::<CpuRuntime>::new();
        batch.insert(
            fields::TOTAL_ENERGY,
            Tensor::from_slice(&[1.0f32, 2.0], &[2], &device),
        );

        assert!(batch.contains(fields::TOTAL_ENERGY));
        assert_eq!(batch.field(fields::TOTAL_ENERGY).unwrap().shape(), &[2]);

        let err = batch.field(fields::FORCE).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}
