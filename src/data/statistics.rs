//! Statistics backend contract for training datasets.

use crate::error::Result;
use crate::stats::StatRequest;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// One computed statistic.
///
/// `spread` is populated only for [`StatKind::MeanStd`] requests, where
/// `value` is the mean and `spread` the standard deviation.
///
/// [`StatKind::MeanStd`]: crate::stats::StatKind::MeanStd
pub struct StatResult<R: Runtime> {
    /// Primary value: mean, or root-mean-square for RMS requests.
    pub value: Tensor<R>,
    /// Standard deviation, for mean/std requests.
    pub spread: Option<Tensor<R>>,
}

/// Descriptive statistics over a training dataset.
///
/// Implemented by dataset providers. One call computes one result per
/// request, in request order; `stride` keeps every `stride`-th frame.
/// The call is synchronous and failures propagate as hard errors — no
/// retry semantics are owned by callers in this crate.
pub trait DatasetStatistics<R: Runtime> {
    /// Compute the requested statistics over the dataset.
    fn statistics(&self, requests: &[StatRequest], stride: usize) -> Result<Vec<StatResult<R>>>;
}
