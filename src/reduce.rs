//! Group-reduce over label arrays.
//!
//! Aggregates values partitioned by an integer grouping label (species code,
//! graph index), one result per distinct label. Labels need not be contiguous
//! or zero-based; a label → dense-slot map is built once per batch and reused
//! for every reduction over the same labels. Runs on host slices — grouping
//! data is CPU-resident by the batching contract.

use std::collections::HashMap;

/// Label → dense-slot index map for one batch.
///
/// Slots are assigned in ascending label order, so aggregates line up with
/// [`labels`](GroupReduce::labels).
pub struct GroupReduce {
    slots: HashMap<i64, usize>,
    labels: Vec<i64>,
}

impl GroupReduce {
    /// Build the dense remap from a batch's label array.
    pub fn new(labels: &[i64]) -> Self {
        let mut distinct: Vec<i64> = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let slots = distinct
            .iter()
            .enumerate()
            .map(|(slot, &label)| (label, slot))
            .collect();

        Self {
            slots,
            labels: distinct,
        }
    }

    /// Number of distinct labels observed.
    pub fn num_groups(&self) -> usize {
        self.labels.len()
    }

    /// Distinct labels, ascending; parallel to every aggregate this map
    /// produces.
    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Dense slot of `label`, if it was observed.
    pub fn slot(&self, label: i64) -> Option<usize> {
        self.slots.get(&label).copied()
    }

    /// Per-group sum of `values` grouped by `labels`.
    ///
    /// `values` and `labels` are parallel arrays; labels not present at
    /// construction are ignored.
    pub fn sum(&self, values: &[f32], labels: &[i64]) -> Vec<f32> {
        debug_assert_eq!(values.len(), labels.len());
        let mut out = vec![0.0f32; self.labels.len()];
        for (&v, &label) in values.iter().zip(labels) {
            if let Some(slot) = self.slot(label) {
                out[slot] += v;
            }
        }
        out
    }

    /// Per-group count of entries grouped by `labels`.
    pub fn count(&self, labels: &[i64]) -> Vec<usize> {
        let mut out = vec![0usize; self.labels.len()];
        for &label in labels {
            if let Some(slot) = self.slot(label) {
                out[slot] += 1;
            }
        }
        out
    }

    /// Per-group arithmetic mean of `values` grouped by `labels`.
    ///
    /// Groups observed at construction always have at least one entry, so
    /// no division by zero occurs over the construction labels.
    pub fn mean(&self, values: &[f32], labels: &[i64]) -> Vec<f32> {
        let sums = self.sum(values, labels);
        let counts = self.count(labels);
        sums.into_iter()
            .zip(counts)
            .map(|(s, n)| if n > 0 { s / n as f32 } else { 0.0 })
            .collect()
    }
}
