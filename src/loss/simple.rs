//! Plain elementwise loss.

use super::{all_dims, contains_nan, mask_invalid, masked_mean, promote};
use super::{Elementwise, LossClient, Reduction};
use crate::data::GraphBatch;
use crate::error::Result;
use numr::dtype::DType;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Elementwise loss on `key`, reduced to a mean or left per-entry.
///
/// With `ignore_nan`, NaN reference entries are zeroed before the
/// elementwise function, masked out of the per-entry loss, and excluded
/// from the mean's denominator.
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
    let reference_t = reference.field(key)?;
    let pred_t = promote(client, pred.field(key)?, reference_t.dtype())?;

    if ignore_nan && contains_nan(client, reference_t)? {
        let (zeroed, mask) = mask_invalid(reference_t);
        let loss = elementwise.apply(client, &pred_t, &zeroed)?;
        let loss = client.mul(&loss, &mask)?;
        match reduction {
            Reduction::Mean => masked_mean(client, &loss, &mask),
            Reduction::None => Ok(loss),
        }
    } else {
        let loss = elementwise.apply(client, &pred_t, reference_t)?;
        match reduction {
            Reduction::Mean => Ok(client.mean(&loss, &all_dims(loss.shape().len()), false)?),
            Reduction::None => Ok(loss),
        }
    }
}
