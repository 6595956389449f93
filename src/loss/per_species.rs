//! Loss on node-level quantities, averaged with equal weight per species.

use super::{contains_nan, mask_invalid, promote, trailing_dims};
use super::{Elementwise, LossClient, Reduction};
use crate::data::GraphBatch;
use crate::error::{Error, Result};
use crate::reduce::GroupReduce;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Species-balanced loss on a node-level quantity.
///
/// Per-atom losses are grouped by species label and averaged within each
/// group, then the group aggregates are combined with equal weight per
/// species — the result is the mean of per-species means, not the
/// population-weighted mean over atoms. Only [`Reduction::Mean`] is
/// supported.
///
/// With NaN masking, each species' sum is divided by its count of valid
/// entries; species with no valid entries drop out of both the numerator
/// and the species-count denominator.
pub(crate) fn evaluate<R, C>(
    client: &C,
    elementwise: Elementwise,
    ignore_nan: bool,
    pred: &GraphBatch<R>,
    reference: &GraphBatch<R>,
    key: &str,
    reduction: Reduction,
) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: LossClient<R>,
    R::Client: LossClient<R>,
{
    if reduction == Reduction::None {
        return Err(Error::UnsupportedLoss {
            reason: "per-species loss only supports mean reduction".to_string(),
        });
    }

    let reference_t = reference.field(key)?;
    let pred_t = promote(client, pred.field(key)?, reference_t.dtype())?;
    let ndim = pred_t.shape().len();
    let n_atoms = pred_t.shape()[0];

    let species = pred.atom_types()?.to_vec::<i64>();
    if species.len() != n_atoms {
        return Err(Error::InvalidArgument {
            arg: "atom_types",
            reason: format!("expected {n_atoms} labels, got {}", species.len()),
        });
    }
    let groups = GroupReduce::new(&species);

    if ignore_nan && contains_nan(client, reference_t)? {
        let (zeroed, mask) = mask_invalid(reference_t);
        let per_entry = elementwise.apply(client, &pred_t, &zeroed)?;
        let per_entry = client.mul(&per_entry, &mask)?;

        // collapse feature dims so each atom carries one loss and one
        // valid-entry count
        let (per_atom, valid) = if ndim > 1 {
            let dims = trailing_dims(ndim);
            (
                client.sum(&per_entry, &dims, false)?,
                client.sum(&mask, &dims, false)?,
            )
        } else {
            (per_entry, mask)
        };

        let loss_sums = groups.sum(&per_atom.to_vec::<f32>(), &species);
        let valid_sums = groups.sum(&valid.to_vec::<f32>(), &species);

        let mut total = 0.0f32;
        let mut species_count = 0usize;
        for (&loss, &valid) in loss_sums.iter().zip(&valid_sums) {
            if valid > 0.0 {
                total += loss / valid;
                species_count += 1;
            }
        }
        // a batch with no valid reference entries contributes nothing
        let result = if species_count > 0 {
            total / species_count as f32
        } else {
            0.0
        };
        Ok(Tensor::from_slice(&[result], &[1], reference_t.device()))
    } else {
        let per_entry = elementwise.apply(client, &pred_t, reference_t)?;
        let per_atom = if ndim > 1 {
            client.mean(&per_entry, &trailing_dims(ndim), false)?
        } else {
            per_entry
        };

        let species_means = groups.mean(&per_atom.to_vec::<f32>(), &species);
        let result = species_means.iter().sum::<f32>() / species_means.len() as f32;
        Ok(Tensor::from_slice(&[result], &[1], reference_t.device()))
    }
}
