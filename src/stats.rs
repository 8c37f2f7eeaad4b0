//! Across-realization statistics.
//!
//! Each realization carries a probability weight; statistical curves are
//! combined per loss-bin ordinate, never by resampling the underlying
//! losses. The loss abscissae of a statistical curve are taken from the
//! first realization's curve, so all realizations of one asset must share
//! curve resolution (they do, it is a calculation-wide parameter).

use std::error::Error;
use std::fmt;

use serde::Serialize;

use crate::aggregation::RiskOutputs;
use crate::curves::{average_loss, loss_map_matrix, LossCurve};
use crate::types::LossType;

const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Realization weights must form a probability distribution.
    Weights(f64),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::Weights(sum) => {
                write!(f, "realization weights must sum to 1, got {sum}")
            }
        }
    }
}

impl Error for StatsError {}

/// Weighted mean of the PoE rows, one value per ordinate.
pub fn mean_curve(poes_by_rlz: &[&[f64]], weights: &[f64]) -> Vec<f64> {
    assert_eq!(poes_by_rlz.len(), weights.len(), "one weight per realization");
    let Some(first) = poes_by_rlz.first() else {
        return Vec::new();
    };
    let mut out = vec![0.0; first.len()];
    for (row, weight) in poes_by_rlz.iter().zip(weights) {
        assert_eq!(row.len(), first.len(), "curve ordinates must align");
        for (acc, poe) in out.iter_mut().zip(row.iter()) {
            *acc += weight * poe;
        }
    }
    out
}

/// Weighted quantile of the PoE rows, one value per ordinate.
///
/// Per ordinate: sort the realizations' values, accumulate their weights
/// and linearly interpolate the quantile level over the cumulative
/// weights. Levels at or below the first cumulative weight clamp to the
/// smallest value, levels at the top clamp to the largest.
pub fn weighted_quantile_curve(
    poes_by_rlz: &[&[f64]],
    weights: &[f64],
    quantile: f64,
) -> Vec<f64> {
    assert_eq!(poes_by_rlz.len(), weights.len(), "one weight per realization");
    let Some(first) = poes_by_rlz.first() else {
        return Vec::new();
    };
    (0..first.len())
        .map(|ordinate| {
            let mut pairs: Vec<(f64, f64)> = poes_by_rlz
                .iter()
                .zip(weights)
                .map(|(row, weight)| (row[ordinate], *weight))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            interpolate_cumulative(&pairs, quantile)
        })
        .collect()
}

/// Unweighted quantile: the weighted form with equal weights.
pub fn quantile_curve(poes_by_rlz: &[&[f64]], quantile: f64) -> Vec<f64> {
    if poes_by_rlz.is_empty() {
        return Vec::new();
    }
    let weights = vec![1.0 / poes_by_rlz.len() as f64; poes_by_rlz.len()];
    weighted_quantile_curve(poes_by_rlz, &weights, quantile)
}

fn interpolate_cumulative(sorted: &[(f64, f64)], quantile: f64) -> f64 {
    let mut cumulative = Vec::with_capacity(sorted.len());
    let mut running = 0.0;
    for (_, weight) in sorted {
        running += weight;
        cumulative.push(running);
    }
    let idx = cumulative.partition_point(|c| *c < quantile);
    if idx == 0 {
        return sorted[0].0;
    }
    if idx == sorted.len() {
        return sorted[sorted.len() - 1].0;
    }
    let (lo_value, hi_value) = (sorted[idx - 1].0, sorted[idx].0);
    let (lo_cum, hi_cum) = (cumulative[idx - 1], cumulative[idx]);
    if hi_cum <= lo_cum {
        return hi_value;
    }
    lo_value + (quantile - lo_cum) / (hi_cum - lo_cum) * (hi_value - lo_value)
}

/// Statistical curves and maps of one loss type.
#[derive(Debug, Clone, Serialize)]
pub struct LossTypeStats {
    pub loss_type: LossType,
    /// One curve per asset ordinal; None when the asset carries no curve.
    pub mean_curves: Vec<Option<LossCurve>>,
    /// Indexed `[quantile][asset]`.
    pub quantile_curves: Vec<Vec<Option<LossCurve>>>,
    /// (conditional PoE x asset) matrix from the mean curves.
    pub mean_maps: Vec<Vec<f64>>,
    /// One matrix per quantile.
    pub quantile_maps: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsOutputs {
    pub quantiles: Vec<f64>,
    pub conditional_poes: Vec<f64>,
    pub per_loss_type: Vec<LossTypeStats>,
}

/// Derive mean and quantile curves and maps from the per-realization
/// outputs.
pub fn compute_stats(
    outputs: &RiskOutputs,
    quantiles: &[f64],
) -> Result<StatsOutputs, StatsError> {
    let weights: Vec<f64> = outputs.realizations.iter().map(|r| r.weight).collect();
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(StatsError::Weights(total));
    }
    let num_realizations = outputs.realizations.len();

    let mut per_loss_type = Vec::with_capacity(outputs.loss_types.len());
    for (column, &loss_type) in outputs.loss_types.iter().enumerate() {
        let mut mean_curves: Vec<Option<LossCurve>> = Vec::with_capacity(outputs.num_assets);
        let mut quantile_curves: Vec<Vec<Option<LossCurve>>> =
            vec![Vec::with_capacity(outputs.num_assets); quantiles.len()];

        for asset in 0..outputs.num_assets {
            let curves: Vec<&LossCurve> = (0..num_realizations)
                .filter_map(|r| outputs.asset_curves.get(column, r)[asset].as_ref())
                .collect();
            if curves.len() < num_realizations {
                mean_curves.push(None);
                for slot in quantile_curves.iter_mut() {
                    slot.push(None);
                }
                continue;
            }
            let losses = curves[0].losses.clone();
            let rows: Vec<&[f64]> = curves.iter().map(|c| c.poes.as_slice()).collect();

            let mean_poes = mean_curve(&rows, &weights);
            mean_curves.push(Some(LossCurve {
                average_loss: average_loss(&losses, &mean_poes),
                losses: losses.clone(),
                poes: mean_poes,
            }));
            for (slot, &quantile) in quantile_curves.iter_mut().zip(quantiles) {
                let poes = weighted_quantile_curve(&rows, &weights, quantile);
                slot.push(Some(LossCurve {
                    average_loss: average_loss(&losses, &poes),
                    losses: losses.clone(),
                    poes,
                }));
            }
        }

        let mean_maps = maps_from(&outputs.conditional_poes, &mean_curves);
        let quantile_maps = quantile_curves
            .iter()
            .map(|curves| maps_from(&outputs.conditional_poes, curves))
            .collect();
        per_loss_type.push(LossTypeStats {
            loss_type,
            mean_curves,
            quantile_curves,
            mean_maps,
            quantile_maps,
        });
    }

    Ok(StatsOutputs {
        quantiles: quantiles.to_vec(),
        conditional_poes: outputs.conditional_poes.clone(),
        per_loss_type,
    })
}

fn maps_from(poes: &[f64], curves: &[Option<LossCurve>]) -> Vec<Vec<f64>> {
    let filled: Vec<LossCurve> = curves
        .iter()
        .map(|slot| slot.clone().unwrap_or_else(LossCurve::empty))
        .collect();
    loss_map_matrix(poes, &filled)
}
