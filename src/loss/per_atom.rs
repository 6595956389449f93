//! Loss on graph-level quantities normalized by atom count.

use super::{all_dims, contains_nan, mask_invalid, masked_mean, promote};
use super::{Elementwise, LossClient, Reduction};
use crate::data::{fields, GraphBatch};
use crate::error::{Error, Result};
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Per-atom-normalized loss on a graph-level quantity.
///
/// Each graph's per-entry loss is divided by its atom count, broadcast over
/// trailing feature dims. Squared-error losses are divided by the atom
/// count a second time: squared error on a per-atom-averaged quantity
/// scales quadratically with the 1/N already folded into the prediction
/// upstream. The double division is tied to [`Elementwise::Mse`] only.
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
    if !fields::is_graph_field(key) {
        return Err(Error::NotGraphField {
            key: key.to_string(),
        });
    }

    let reference_t = reference.field(key)?;
    let pred_t = promote(client, pred.field(key)?, reference_t.dtype())?;

    // [n_graphs, 1, ...]: one atom count per graph, broadcast-ready
    let batch_index = reference.batch_index()?;
    let num_graphs = pred_t.shape()[0];
    let counts = client.bincount(batch_index, None, num_graphs)?;
    let counts = client.cast(&counts, pred_t.dtype())?;
    let mut count_shape = vec![1; pred_t.shape().len().max(1)];
    count_shape[0] = num_graphs;
    let n = counts.reshape(&count_shape)?;

    if ignore_nan && contains_nan(client, reference_t)? {
        let (zeroed, mask) = mask_invalid(reference_t);
        let loss = elementwise.apply(client, &pred_t, &zeroed)?;
        let loss = client.mul(&loss, &mask)?;
        let loss = client.div(&loss, &n)?;
        let loss = if elementwise.is_squared() {
            client.div(&loss, &n)?
        } else {
            loss
        };
        match reduction {
            Reduction::Mean => masked_mean(client, &loss, &mask),
            Reduction::None => Ok(loss),
        }
    } else {
        let loss = elementwise.apply(client, &pred_t, reference_t)?;
        let loss = client.div(&loss, &n)?;
        let loss = if elementwise.is_squared() {
            client.div(&loss, &n)?
        } else {
            loss
        };
        match reduction {
            Reduction::Mean => Ok(client.mean(&loss, &all_dims(loss.shape().len()), false)?),
            Reduction::None => Ok(loss),
        }
    }
}
