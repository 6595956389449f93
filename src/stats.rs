//! Symbolic statistic identifiers and their resolution into backend requests.
//!
//! Configuration values may name a training-set statistic symbolically, e.g.
//! `dataset_forces_rms` or `dataset_per_atom_total_energy_mean`. The resolver
//! parses such identifiers into typed [`StatRequest`]s, merges duplicates
//! (a `mean` and a `std` of the same field share one mean/std request), and
//! records for each original identifier which request and which tuple slot it
//! maps back to. Parsing is pure; only [`compute_statistics`] touches the
//! dataset, with exactly one backend call.

use std::collections::HashMap;

use crate::data::statistics::DatasetStatistics;
use crate::error::{Error, Result};
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Auxiliary parameters forwarded verbatim to the statistics backend,
/// keyed by parameter name (e.g. per-field regression priors).
pub type StatParams = HashMap<String, serde_json::Value>;

/// Aggregation scope of a dataset statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatScope {
    /// Over raw per-frame values.
    Global,
    /// Over values normalized by atom count.
    PerAtom,
    /// Grouped by species label.
    PerSpecies,
}

impl StatScope {
    fn prefix(self) -> &'static str {
        match self {
            StatScope::Global => "",
            StatScope::PerAtom => "per_atom_",
            StatScope::PerSpecies => "per_species_",
        }
    }
}

/// Reduction kind of a dataset statistic.
///
/// `mean` and `std` identifiers normalize to one [`MeanStd`] request;
/// `rms` is always its own request.
///
/// [`MeanStd`]: StatKind::MeanStd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// Mean and standard deviation, computed together.
    MeanStd,
    /// Root mean square.
    Rms,
}

impl StatKind {
    fn suffix(self) -> &'static str {
        match self {
            StatKind::MeanStd => "mean_std",
            StatKind::Rms => "rms",
        }
    }
}

/// Which slot of a backend result tuple an identifier selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSlot {
    /// The mean or RMS value.
    Primary,
    /// The standard deviation of a mean/std request.
    Spread,
}

/// One deduplicated backend request.
#[derive(Debug, Clone)]
pub struct StatRequest {
    /// Dataset field to compute over.
    pub field: String,
    /// Aggregation scope.
    pub scope: StatScope,
    /// Reduction kind.
    pub kind: StatKind,
    /// Auxiliary parameters, forwarded verbatim. Only attached to
    /// per-species requests.
    pub params: StatParams,
}

impl StatRequest {
    /// The backend mode string, e.g. `per_species_mean_std`.
    pub fn mode(&self) -> String {
        format!("{}{}", self.scope.prefix(), self.kind.suffix())
    }
}

/// Maps one original identifier back onto the backend results.
#[derive(Debug, Clone, Copy)]
pub struct StatSelector {
    /// Index into the request list.
    pub request: usize,
    /// Tuple slot to extract from that request's result.
    pub slot: StatSlot,
}

/// Outcome of resolving a list of statistic identifiers.
#[derive(Debug, Clone)]
pub struct StatResolution {
    /// Deduplicated backend requests, in first-appearance order.
    pub requests: Vec<StatRequest>,
    /// One selector per original identifier, in input order.
    pub selectors: Vec<StatSelector>,
}

/// Parse one statistic identifier into `(field, scope, kind, slot)`.
///
/// Format: `dataset_[per_species_|per_atom_]<field>_<stat>` with
/// `<stat> ∈ {mean, std, rms}`. The `dataset_` prefix is optional.
fn parse_statistic_name(name: &str) -> Result<(String, StatScope, StatKind, StatSlot)> {
    let mut rest = name.strip_prefix("dataset_").unwrap_or(name);

    let scope = if let Some(r) = rest.strip_prefix("per_species_") {
        rest = r;
        StatScope::PerSpecies
    } else if let Some(r) = rest.strip_prefix("per_atom_") {
        rest = r;
        StatScope::PerAtom
    } else {
        StatScope::Global
    };

    let (field, stat) = rest.rsplit_once('_').ok_or_else(|| Error::InvalidStatistic {
        name: name.to_string(),
        reason: "expected '<field>_<stat>'".to_string(),
    })?;

    let (kind, slot) = match stat {
        "mean" => (StatKind::MeanStd, StatSlot::Primary),
        "std" => (StatKind::MeanStd, StatSlot::Spread),
        "rms" => (StatKind::Rms, StatSlot::Primary),
        other => {
            return Err(Error::InvalidStatistic {
                name: name.to_string(),
                reason: format!("unknown statistic kind '{other}' (expected mean, std, or rms)"),
            });
        }
    };

    Ok((field.to_string(), scope, kind, slot))
}

/// Resolve statistic identifiers into deduplicated backend requests.
///
/// Identifiers that normalize to the same `(field, scope, kind)` share one
/// request; each identifier records the request index and tuple slot it
/// reads back from. `kwargs` supplies per-field auxiliary parameters,
/// attached only to per-species requests.
pub fn resolve_statistic_names(
    names: &[String],
    kwargs: &HashMap<String, StatParams>,
) -> Result<StatResolution> {
    let mut requests: Vec<StatRequest> = Vec::new();
    let mut selectors = Vec::with_capacity(names.len());

    for name in names {
        let (field, scope, kind, slot) = parse_statistic_name(name)?;

        let request = match requests
            .iter()
            .position(|r| r.field == field && r.scope == scope && r.kind == kind)
        {
            Some(idx) => idx,
            None => {
                let params = if scope == StatScope::PerSpecies {
                    kwargs.get(&field).cloned().unwrap_or_default()
                } else {
                    StatParams::new()
                };
                requests.push(StatRequest {
                    field,
                    scope,
                    kind,
                    params,
                });
                requests.len() - 1
            }
        };

        selectors.push(StatSelector { request, slot });
    }

    Ok(StatResolution {
        requests,
        selectors,
    })
}

/// Compute the values named by `names` over the dataset.
///
/// Resolves the identifiers, performs exactly one backend call, and maps
/// the results back onto the original identifiers in input order.
pub fn compute_statistics<R, D>(
    dataset: &D,
    names: &[String],
    stride: usize,
    kwargs: &HashMap<String, StatParams>,
) -> Result<Vec<Tensor<R>>>
where
    R: Runtime,
    D: DatasetStatistics<R> + ?Sized,
{
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let resolution = resolve_statistic_names(names, kwargs)?;
    let results = dataset.statistics(&resolution.requests, stride)?;
    if results.len() != resolution.requests.len() {
        return Err(Error::StatisticsBackend {
            reason: format!(
                "expected {} results, backend returned {}",
                resolution.requests.len(),
                results.len()
            ),
        });
    }

    resolution
        .selectors
        .iter()
        .map(|sel| {
            let result = &results[sel.request];
            match sel.slot {
                StatSlot::Primary => Ok(result.value.clone()),
                StatSlot::Spread => result.spread.clone().ok_or_else(|| Error::StatisticsBackend {
                    reason: format!(
                        "no spread value for mean/std request on '{}'",
                        resolution.requests[sel.request].field
                    ),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mean_and_std_share_one_request() {
        let resolution = resolve_statistic_names(
            &names(&["dataset_total_energy_mean", "dataset_total_energy_std"]),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(resolution.requests.len(), 1);
        assert_eq!(resolution.requests[0].field, "total_energy");
        assert_eq!(resolution.requests[0].kind, StatKind::MeanStd);
        assert_eq!(resolution.requests[0].scope, StatScope::Global);

        assert_eq!(resolution.selectors[0].request, 0);
        assert_eq!(resolution.selectors[0].slot, StatSlot::Primary);
        assert_eq!(resolution.selectors[1].request, 0);
        assert_eq!(resolution.selectors[1].slot, StatSlot::Spread);
    }

    #[test]
    fn test_rms_is_its_own_request() {
        let resolution = resolve_statistic_names(
            &names(&["dataset_forces_rms", "dataset_forces_std"]),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(resolution.requests.len(), 2);
        assert_eq!(resolution.requests[0].kind, StatKind::Rms);
        assert_eq!(resolution.requests[1].kind, StatKind::MeanStd);
        assert_eq!(resolution.requests[0].mode(), "rms");
    }

    #[test]
    fn test_scope_prefixes() {
        let resolution = resolve_statistic_names(
            &names(&[
                "dataset_per_atom_total_energy_mean",
                "dataset_per_species_total_energy_std",
            ]),
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(resolution.requests.len(), 2);
        assert_eq!(resolution.requests[0].scope, StatScope::PerAtom);
        assert_eq!(resolution.requests[0].field, "total_energy");
        assert_eq!(resolution.requests[0].mode(), "per_atom_mean_std");
        assert_eq!(resolution.requests[1].scope, StatScope::PerSpecies);
        assert_eq!(resolution.requests[1].mode(), "per_species_mean_std");
    }

    #[test]
    fn test_unknown_suffix_fails() {
        let err =
            resolve_statistic_names(&names(&["dataset_forces_median"]), &HashMap::new())
                .unwrap_err();
        assert!(matches!(err, Error::InvalidStatistic { .. }));
    }

    #[test]
    fn test_kwargs_attach_to_per_species_only() {
        let mut kwargs = HashMap::new();
        let mut params = StatParams::new();
        params.insert("alpha".to_string(), serde_json::json!(0.1));
        kwargs.insert("total_energy".to_string(), params);

        let resolution = resolve_statistic_names(
            &names(&[
                "dataset_per_species_total_energy_mean",
                "dataset_total_energy_std",
            ]),
            &kwargs,
        )
        .unwrap();

        assert_eq!(resolution.requests[0].params.len(), 1);
        assert!(resolution.requests[1].params.is_empty());
    }

    #[test]
    fn test_field_with_underscores() {
        let (field, scope, kind, _) = parse_statistic_name("dataset_total_energy_rms").unwrap();
        assert_eq!(field, "total_energy");
        assert_eq!(scope, StatScope::Global);
        assert_eq!(kind, StatKind::Rms);
    }
}
