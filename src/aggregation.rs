//! Merging worker partials into the calculation's output tables.
//!
//! Tables are pre-sized from the loss-type and realization counts known
//! before any chunk runs; a partial that refers to an undeclared loss
//! type, realization or asset is a programming error and panics. Merge
//! rules are associative and commutative, so chunks may arrive in any
//! order. Row maps are keyed by the full key tuple, which keeps grouping
//! and output order deterministic across differently sized chunks.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::curves::{loss_map_matrix, CurveError, LossCurve};
use crate::evaluator::{CurveParams, EventLoss, LossColumns, RiskPartial};
use crate::types::{EventId, LossType, Realization};

/// A fixed-shape (loss type x realization) table.
///
/// Indexing is by position in the declared loss-type list and by
/// realization ordinal; anything outside the declared shape panics.
#[derive(Debug, Clone)]
pub struct Cube<T> {
    num_loss_types: usize,
    num_realizations: usize,
    cells: Vec<T>,
}

impl<T: Clone> Cube<T> {
    pub fn new(num_loss_types: usize, num_realizations: usize, fill: T) -> Self {
        Cube {
            num_loss_types,
            num_realizations,
            cells: vec![fill; num_loss_types * num_realizations],
        }
    }
}

impl<T> Cube<T> {
    fn offset(&self, loss_type: usize, realization: usize) -> usize {
        assert!(
            loss_type < self.num_loss_types && realization < self.num_realizations,
            "cell ({loss_type}, {realization}) outside declared shape ({}, {})",
            self.num_loss_types,
            self.num_realizations,
        );
        loss_type * self.num_realizations + realization
    }

    pub fn get(&self, loss_type: usize, realization: usize) -> &T {
        &self.cells[self.offset(loss_type, realization)]
    }

    pub fn get_mut(&mut self, loss_type: usize, realization: usize) -> &mut T {
        let offset = self.offset(loss_type, realization);
        &mut self.cells[offset]
    }
}

/// One aggregate loss row: every asset's losses for one event summed.
#[derive(Debug, Clone, Serialize)]
pub struct AggLoss {
    pub realization: usize,
    pub event: EventId,
    pub columns: LossColumns,
}

/// Exceedance curve over per-event total losses, with the dispersion of
/// those totals.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateCurve {
    pub curve: LossCurve,
    pub stddev: f64,
}

/// Everything one calculation produces, before cross-realization
/// statistics.
#[derive(Debug, Clone)]
pub struct RiskOutputs {
    /// Column order of the loss-type axis of every cube.
    pub loss_types: Vec<LossType>,
    pub realizations: Vec<Realization>,
    pub num_assets: usize,
    /// Per (loss type, realization), one optional curve per asset ordinal.
    pub asset_curves: Cube<Vec<Option<LossCurve>>>,
    pub insured_curves: Cube<Vec<Option<LossCurve>>>,
    /// Sorted by (realization, event, asset).
    pub asset_losses: Vec<EventLoss>,
    /// Sorted by (realization, event).
    pub agg_losses: Vec<AggLoss>,
    pub agg_curves: Cube<AggregateCurve>,
    /// Per (loss type, realization), a (conditional PoE x asset) matrix.
    pub loss_maps: Cube<Vec<Vec<f64>>>,
    pub conditional_poes: Vec<f64>,
}

impl RiskOutputs {
    /// Position of a loss type on the cube axis.
    pub fn loss_type_column(&self, loss_type: LossType) -> Option<usize> {
        self.loss_types.iter().position(|lt| *lt == loss_type)
    }

    /// Event loss table for one loss type and realization: per event, the
    /// total ground-up loss across all assets, sorted by event id.
    pub fn event_loss_table(&self, loss_type: LossType, realization: usize) -> Vec<(EventId, f64)> {
        let index = loss_type.index();
        self.agg_losses
            .iter()
            .filter(|row| row.realization == realization)
            .map(|row| (row.event, row.columns.ground_up[index]))
            .collect()
    }
}

/// Accumulates worker partials into the output tables.
pub struct Aggregator {
    loss_types: Vec<LossType>,
    realizations: Vec<Realization>,
    num_assets: usize,
    num_events: usize,
    conditional_poes: Vec<f64>,
    params: CurveParams,
    asset_curves: Cube<Vec<Option<LossCurve>>>,
    insured_curves: Cube<Vec<Option<LossCurve>>>,
    asset_rows: BTreeMap<(usize, EventId, usize), LossColumns>,
    agg_rows: BTreeMap<(usize, EventId), LossColumns>,
}

impl Aggregator {
    pub fn new(
        loss_types: Vec<LossType>,
        realizations: Vec<Realization>,
        num_assets: usize,
        num_events: usize,
        conditional_poes: Vec<f64>,
        params: CurveParams,
    ) -> Self {
        let empty = vec![None; num_assets];
        let shape = (loss_types.len(), realizations.len());
        Aggregator {
            loss_types,
            realizations,
            num_assets,
            num_events,
            conditional_poes,
            params,
            asset_curves: Cube::new(shape.0, shape.1, empty.clone()),
            insured_curves: Cube::new(shape.0, shape.1, empty),
            asset_rows: BTreeMap::new(),
            agg_rows: BTreeMap::new(),
        }
    }

    /// Fold one worker partial into the tables. Associative and
    /// commutative with respect to other partials of the same run.
    pub fn add(&mut self, partial: RiskPartial) {
        for output in partial.asset_outputs {
            let column = self
                .loss_types
                .iter()
                .position(|lt| *lt == output.loss_type)
                .unwrap_or_else(|| {
                    panic!("loss type {} was not declared to the aggregator", output.loss_type)
                });
            let slot = &mut self.asset_curves.get_mut(column, output.realization)[output.asset];
            assert!(
                slot.is_none(),
                "asset {} got two {} curves for realization {}",
                output.asset,
                output.loss_type,
                output.realization,
            );
            *slot = Some(output.curve);
            if let Some(insured) = output.insured_curve {
                self.insured_curves.get_mut(column, output.realization)[output.asset] =
                    Some(insured);
            }
        }
        for row in partial.asset_losses {
            self.asset_rows
                .entry((row.realization, row.event, row.asset))
                .or_insert_with(LossColumns::zero)
                .add(&row.columns);
        }
        for ((realization, event), columns) in partial.agg_losses {
            self.agg_rows
                .entry((realization, event))
                .or_insert_with(LossColumns::zero)
                .add(&columns);
        }
    }

    /// Build the derived tables and hand everything over.
    pub fn finish(self) -> Result<RiskOutputs, CurveError> {
        let num_loss_types = self.loss_types.len();
        let num_realizations = self.realizations.len();

        let mut agg_curves: Vec<AggregateCurve> = Vec::new();
        for loss_type in &self.loss_types {
            for realization in 0..num_realizations {
                let mut totals = vec![0.0; self.num_events];
                for ((r, event), columns) in &self.agg_rows {
                    if *r != realization {
                        continue;
                    }
                    let slot = usize::try_from(event.0).unwrap_or(usize::MAX);
                    assert!(
                        slot < self.num_events,
                        "event {} outside the declared catalog of {} events",
                        event.0,
                        self.num_events,
                    );
                    totals[slot] = columns.ground_up[loss_type.index()];
                }
                let curve =
                    LossCurve::build(&totals, self.params.tses, self.params.time_span, self.params.resolution)?;
                agg_curves.push(AggregateCurve {
                    curve,
                    stddev: sample_stddev(&totals),
                });
            }
        }
        let agg_curves = Cube {
            num_loss_types,
            num_realizations,
            cells: agg_curves,
        };

        let mut loss_maps = Cube::new(num_loss_types, num_realizations, Vec::new());
        for column in 0..num_loss_types {
            for realization in 0..num_realizations {
                let curves: Vec<LossCurve> = self
                    .asset_curves
                    .get(column, realization)
                    .iter()
                    .map(|slot| slot.clone().unwrap_or_else(LossCurve::empty))
                    .collect();
                *loss_maps.get_mut(column, realization) =
                    loss_map_matrix(&self.conditional_poes, &curves);
            }
        }

        let asset_losses = self
            .asset_rows
            .into_iter()
            .map(|((realization, event, asset), columns)| EventLoss {
                realization,
                event,
                asset,
                columns,
            })
            .collect();
        let agg_losses = self
            .agg_rows
            .into_iter()
            .map(|((realization, event), columns)| AggLoss {
                realization,
                event,
                columns,
            })
            .collect();

        Ok(RiskOutputs {
            loss_types: self.loss_types,
            realizations: self.realizations,
            num_assets: self.num_assets,
            asset_curves: self.asset_curves,
            insured_curves: self.insured_curves,
            asset_losses,
            agg_losses,
            agg_curves,
            loss_maps,
            conditional_poes: self.conditional_poes,
        })
    }
}

/// Sample standard deviation (n - 1 denominator), 0 for fewer than two
/// values.
fn sample_stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}
