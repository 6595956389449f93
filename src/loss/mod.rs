//! Training-loss evaluators over prediction/reference batches.
//!
//! | Variant | Use case |
//! |---|---|
//! | [`Aggregation::Plain`] | Direct elementwise loss on any quantity |
//! | [`Aggregation::PerAtom`] | Graph-level quantities normalized by atom count |
//! | [`Aggregation::PerSpecies`] | Node-level quantities, equal weight per species |
//!
//! Every variant shares an elementwise core ([`Elementwise`]) and a NaN
//! policy: with `ignore_nan` set, NaN reference entries are masked out of
//! both the loss and the normalizing denominators, so missing labels never
//! pollute an aggregate.

pub mod per_atom;
pub mod per_species;
pub mod simple;

use crate::data::GraphBatch;
use crate::error::{Error, Result};
use numr::dtype::DType;
use numr::ops::{
    BinaryOps, IndexingOps, ReduceOps, ScalarOps, ShapeOps, TensorOps, TypeConversionOps, UnaryOps,
};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;

/// Trait alias for the client bounds required by loss evaluation.
pub trait LossClient<R: Runtime>:
    RuntimeClient<R>
    + TensorOps<R>
    + BinaryOps<R>
    + UnaryOps<R>
    + ReduceOps<R>
    + ScalarOps<R>
    + ShapeOps<R>
    + IndexingOps<R>
    + TypeConversionOps<R>
{
}

impl<R, C> LossClient<R> for C
where
    R: Runtime,
    C: RuntimeClient<R>
        + TensorOps<R>
        + BinaryOps<R>
        + UnaryOps<R>
        + ReduceOps<R>
        + ScalarOps<R>
        + ShapeOps<R>
        + IndexingOps<R>
        + TypeConversionOps<R>,
{
}

/// Elementwise loss: one value per prediction/reference pair, no reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elementwise {
    /// Squared error.
    Mse,
    /// Absolute error.
    Mae,
}

impl Elementwise {
    /// Parse an elementwise loss name: `MSELoss`/`mse` or
    /// `MAELoss`/`L1Loss`/`mae`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mseloss" | "mse" => Ok(Elementwise::Mse),
            "maeloss" | "l1loss" | "mae" | "l1" => Ok(Elementwise::Mae),
            _ => Err(Error::UnsupportedLoss {
                reason: format!("unknown elementwise loss '{name}'"),
            }),
        }
    }

    /// Whether this is a squared-error loss. Per-atom normalization divides
    /// squared errors by the atom count twice.
    pub fn is_squared(self) -> bool {
        matches!(self, Elementwise::Mse)
    }

    pub(crate) fn apply<R, C>(
        self,
        client: &C,
        pred: &Tensor<R>,
        reference: &Tensor<R>,
    ) -> Result<Tensor<R>>
    where
        R: Runtime<DType = DType>,
        C: LossClient<R>,
    {
        let diff = client.sub(pred, reference)?;
        let loss = match self {
            Elementwise::Mse => client.square(&diff)?,
            Elementwise::Mae => client.abs(&diff)?,
        };
        Ok(loss)
    }
}

/// How per-entry losses are aggregated over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// No normalization beyond the requested reduction.
    Plain,
    /// Divide each graph's loss by its atom count (graph-level fields only).
    PerAtom,
    /// Equal-weight mean over species groups (node-level fields).
    PerSpecies,
}

/// A fully parsed loss choice: aggregation kind plus elementwise function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossSpec {
    pub aggregation: Aggregation,
    pub elementwise: Elementwise,
}

impl LossSpec {
    pub fn new(aggregation: Aggregation, elementwise: Elementwise) -> Self {
        Self {
            aggregation,
            elementwise,
        }
    }

    /// Parse a symbolic loss name.
    ///
    /// A case-insensitive `PerSpecies`/`PerAtom` prefix selects the
    /// aggregation; the remainder names the elementwise function. No prefix
    /// means [`Aggregation::Plain`].
    pub fn parse(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        let (aggregation, rest) = if lower.starts_with("perspecies") {
            (Aggregation::PerSpecies, &name["perspecies".len()..])
        } else if lower.starts_with("peratom") {
            (Aggregation::PerAtom, &name["peratom".len()..])
        } else {
            (Aggregation::Plain, name)
        };
        Ok(Self {
            aggregation,
            elementwise: Elementwise::parse(rest)?,
        })
    }
}

/// Requested shape of a loss result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// A scalar mean.
    Mean,
    /// The unreduced per-entry loss.
    None,
}

/// A configured loss evaluator.
///
/// Constructed once at training setup; each call is a pure function of its
/// batch-scoped inputs with no state carried across invocations.
#[derive(Debug, Clone, Copy)]
pub struct Loss {
    spec: LossSpec,
    ignore_nan: bool,
}

impl Loss {
    pub fn new(spec: LossSpec, ignore_nan: bool) -> Self {
        Self { spec, ignore_nan }
    }

    pub fn spec(&self) -> &LossSpec {
        &self.spec
    }

    pub fn ignore_nan(&self) -> bool {
        self.ignore_nan
    }

    /// Evaluate the loss on `key` over one batch.
    ///
    /// Returns a scalar for [`Reduction::Mean`], else the per-entry loss.
    pub fn evaluate<R, C>(
        &self,
        client: &C,
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
        match self.spec.aggregation {
            Aggregation::Plain => simple::evaluate(
                client,
                self.spec.elementwise,
                self.ignore_nan,
                pred,
                reference,
                key,
                reduction,
            ),
            Aggregation::PerAtom => per_atom::evaluate(
                client,
                self.spec.elementwise,
                self.ignore_nan,
                pred,
                reference,
                key,
                reduction,
            ),
            Aggregation::PerSpecies => per_species::evaluate(
                client,
                self.spec.elementwise,
                self.ignore_nan,
                pred,
                reference,
                key,
                reduction,
            ),
        }
    }
}

/// Construct a loss evaluator from a symbolic name.
///
/// `"PerSpeciesMAELoss"` → per-species aggregation over absolute error;
/// `"MSELoss"` → plain squared error. Callers that already hold a
/// [`LossSpec`] construct [`Loss`] directly instead of parsing.
pub fn find_loss_function(name: &str, ignore_nan: bool) -> Result<Loss> {
    Ok(Loss::new(LossSpec::parse(name)?, ignore_nan))
}

/// All dimension indices for a tensor (for full reductions).
pub(crate) fn all_dims(ndim: usize) -> Vec<usize> {
    (0..ndim).collect()
}

/// All dimension indices past the leading (entry) axis.
pub(crate) fn trailing_dims(ndim: usize) -> Vec<usize> {
    (1..ndim).collect()
}

/// Check if a tensor contains NaN values on-device.
pub(crate) fn contains_nan<R, C>(client: &C, tensor: &Tensor<R>) -> Result<bool>
where
    R: Runtime<DType = DType>,
    C: UnaryOps<R> + ReduceOps<R>,
{
    let mask = client.isnan(tensor)?;
    let any = client.any(&mask, &[], false)?;
    Ok(any.item::<u8>()? != 0)
}

/// Split a reference tensor into a NaN-free copy and a 0/1 validity mask.
///
/// NaN entries become 0 in the copy and 0 in the mask, so a masked loss
/// carries no contribution from missing labels.
pub(crate) fn mask_invalid<R>(reference: &Tensor<R>) -> (Tensor<R>, Tensor<R>)
where
    R: Runtime<DType = DType>,
{
    let values = reference.to_vec::<f32>();
    let mut zeroed: Vec<f32> = Vec::with_capacity(values.len());
    let mut mask: Vec<f32> = Vec::with_capacity(values.len());
    for v in values {
        if v.is_nan() {
            zeroed.push(0.0);
            mask.push(0.0);
        } else {
            zeroed.push(v);
            mask.push(1.0);
        }
    }
    (
        Tensor::from_slice(&zeroed, reference.shape(), reference.device()),
        Tensor::from_slice(&mask, reference.shape(), reference.device()),
    )
}

/// Promote predictions to the reference dtype.
pub(crate) fn promote<R, C>(client: &C, pred: &Tensor<R>, dtype: DType) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: TypeConversionOps<R>,
{
    if pred.dtype() == dtype {
        Ok(pred.clone())
    } else {
        Ok(client.cast(pred, dtype)?)
    }
}

/// Sum of `loss` divided by the number of valid entries in `mask`.
pub(crate) fn masked_mean<R, C>(client: &C, loss: &Tensor<R>, mask: &Tensor<R>) -> Result<Tensor<R>>
where
    R: Runtime<DType = DType>,
    C: LossClient<R>,
{
    let dims = all_dims(loss.shape().len());
    let total = client.sum(loss, &dims, false)?;
    let valid = client.sum(mask, &all_dims(mask.shape().len()), false)?;
    Ok(client.div(&total, &valid)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_dispatch() {
        let loss = find_loss_function("PerSpeciesMAELoss", false).unwrap();
        assert_eq!(loss.spec().aggregation, Aggregation::PerSpecies);
        assert_eq!(loss.spec().elementwise, Elementwise::Mae);

        let loss = find_loss_function("MSELoss", false).unwrap();
        assert_eq!(loss.spec().aggregation, Aggregation::Plain);
        assert_eq!(loss.spec().elementwise, Elementwise::Mse);

        let loss = find_loss_function("PerAtomMSELoss", true).unwrap();
        assert_eq!(loss.spec().aggregation, Aggregation::PerAtom);
        assert!(loss.ignore_nan());
    }

    #[test]
    fn test_factory_is_case_insensitive() {
        let loss = find_loss_function("perspeciesmseloss", false).unwrap();
        assert_eq!(loss.spec().aggregation, Aggregation::PerSpecies);
        assert_eq!(loss.spec().elementwise, Elementwise::Mse);
    }

    #[test]
    fn test_factory_rejects_unknown_elementwise() {
        let err = find_loss_function("HuberLoss", false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLoss { .. }));

        let err = find_loss_function("PerSpeciesHuberLoss", false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLoss { .. }));
    }

    #[test]
    fn test_trailing_dims() {
        assert_eq!(trailing_dims(1), Vec::<usize>::new());
        assert_eq!(trailing_dims(3), vec![1, 2]);
    }
}
