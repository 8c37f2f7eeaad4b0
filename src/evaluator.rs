//! The worker side of a risk calculation.
//!
//! A chunk of risk inputs comes in; per-asset loss curves and sparse
//! event-loss records come out. Everything here is pure computation over
//! borrowed, read-only inputs, so chunks can run on any thread.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RiskConfig;
use crate::curves::{CurveError, LossCurve};
use crate::hazard::{Event, GmfCatalog};
use crate::riskinput::RiskInput;
use crate::types::{EventId, LossType, N_LOSS_TYPES};
use crate::vulnerability::{insured_ratio, VulnerabilityModel};

/// Curve-building parameters shared by every worker of one calculation.
#[derive(Debug, Clone, Copy)]
pub struct CurveParams {
    /// Total stochastic event-set duration in years.
    pub tses: f64,
    /// Investigation window in years.
    pub time_span: f64,
    pub resolution: usize,
    /// Build insured curves and columns for assets carrying a policy.
    pub insured: bool,
}

impl CurveParams {
    pub fn new(config: &RiskConfig, catalog: &GmfCatalog) -> Self {
        CurveParams {
            tses: catalog.tses(),
            time_span: catalog.time_span(),
            resolution: config.curve_resolution,
            insured: config.insured_losses,
        }
    }
}

/// One fixed-width row of per-loss-type columns, ground-up losses first,
/// insured losses in a second block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossColumns {
    pub ground_up: [f64; N_LOSS_TYPES],
    pub insured: [f64; N_LOSS_TYPES],
}

impl LossColumns {
    pub fn zero() -> Self {
        LossColumns {
            ground_up: [0.0; N_LOSS_TYPES],
            insured: [0.0; N_LOSS_TYPES],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.ground_up.iter().all(|&v| v == 0.0) && self.insured.iter().all(|&v| v == 0.0)
    }

    /// Column-wise sum, used both for summing assets into aggregate rows
    /// and for merging partial rows of one key from different chunks.
    pub fn add(&mut self, other: &LossColumns) {
        for (a, b) in self.ground_up.iter_mut().zip(other.ground_up) {
            *a += b;
        }
        for (a, b) in self.insured.iter_mut().zip(other.insured) {
            *a += b;
        }
    }
}

/// Loss curves of one asset for one loss type under one realization.
#[derive(Debug, Clone, Serialize)]
pub struct AssetOutput {
    pub realization: usize,
    pub asset: usize,
    pub loss_type: LossType,
    pub curve: LossCurve,
    pub insured_curve: Option<LossCurve>,
}

/// One sparse asset-level event loss row.
#[derive(Debug, Clone, Serialize)]
pub struct EventLoss {
    pub realization: usize,
    pub event: EventId,
    pub asset: usize,
    pub columns: LossColumns,
}

/// What one worker hands back for its chunk. Merging partials is the
/// aggregation engine's job; the map key orders aggregate rows by the
/// full (realization, event) tuple so reduction stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct RiskPartial {
    pub asset_outputs: Vec<AssetOutput>,
    pub asset_losses: Vec<EventLoss>,
    pub agg_losses: BTreeMap<(usize, EventId), LossColumns>,
}

/// Evaluate a chunk of risk inputs against the vulnerability model.
///
/// `events` is the calculation's shared event list; every input's gmv
/// slice is aligned with it.
pub fn evaluate_chunk(
    inputs: &[RiskInput<'_>],
    events: &[Event],
    model: &VulnerabilityModel,
    params: CurveParams,
) -> Result<RiskPartial, CurveError> {
    let mut partial = RiskPartial::default();
    for input in inputs {
        evaluate_input(input, events, model, params, &mut partial)?;
    }
    Ok(partial)
}

fn evaluate_input(
    input: &RiskInput<'_>,
    events: &[Event],
    model: &VulnerabilityModel,
    params: CurveParams,
    out: &mut RiskPartial,
) -> Result<(), CurveError> {
    assert_eq!(
        input.gmvs.len(),
        events.len(),
        "gmvs for {} events but the catalog has {}",
        input.gmvs.len(),
        events.len(),
    );
    let num_events = events.len();

    for asset in &input.assets {
        let epsilons: Vec<f64> = (0..num_events)
            .map(|event_index| input.epsilons.eps_for(asset.ordinal, event_index))
            .collect();
        let mut columns = vec![LossColumns::zero(); num_events];

        for (loss_type, function) in model.functions_for(&asset.taxonomy) {
            if function.imt() != input.imt {
                continue;
            }
            let Some(value) = asset.value(loss_type) else {
                continue;
            };
            let ratios = function.evaluate(input.gmvs, &epsilons);
            let losses: Vec<f64> = ratios.iter().map(|r| r * value).collect();
            let curve = LossCurve::build(&losses, params.tses, params.time_span, params.resolution)?;

            let policy = if params.insured && loss_type.insurable() {
                asset
                    .deductible(loss_type)
                    .zip(asset.insurance_limit(loss_type))
            } else {
                None
            };
            let insured_curve = if let Some((deductible, limit)) = policy {
                let insured: Vec<f64> = ratios
                    .iter()
                    .map(|&r| insured_ratio(r, deductible, limit) * value)
                    .collect();
                for (row, &loss) in columns.iter_mut().zip(&insured) {
                    row.insured[loss_type.index()] += loss;
                }
                Some(LossCurve::build(
                    &insured,
                    params.tses,
                    params.time_span,
                    params.resolution,
                )?)
            } else {
                None
            };

            for (row, &loss) in columns.iter_mut().zip(&losses) {
                row.ground_up[loss_type.index()] += loss;
            }
            out.asset_outputs.push(AssetOutput {
                realization: input.realization,
                asset: asset.ordinal,
                loss_type,
                curve,
                insured_curve,
            });
        }

        for (event, row) in events.iter().zip(columns) {
            if row.is_zero() {
                continue;
            }
            out.asset_losses.push(EventLoss {
                realization: input.realization,
                event: event.id,
                asset: asset.ordinal,
                columns: row,
            });
            out.agg_losses
                .entry((input.realization, event.id))
                .or_insert_with(LossColumns::zero)
                .add(&row);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epsilons::{make_epsilons, AssetCorrelation, EpsilonMatrix};
    use crate::exposure::{Asset, AssetCollection, Site};
    use crate::types::{Imt, SiteId};
    use crate::vulnerability::VulnerabilityFunction;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual} (tol {tol})"
        );
    }

    const TSES: f64 = 50.0;
    const TIME_SPAN: f64 = 1.0;

    fn params(insured: bool) -> CurveParams {
        CurveParams {
            tses: TSES,
            time_span: TIME_SPAN,
            resolution: 5,
            insured,
        }
    }

    fn scenario_model() -> VulnerabilityModel {
        let mut model = VulnerabilityModel::new();
        let vf = VulnerabilityFunction::new(
            Imt::Pga,
            vec![0.1, 0.3, 0.5],
            vec![0.05, 0.2, 0.5],
            vec![0.0; 3],
        )
        .unwrap();
        model.insert("rc", LossType::Structural, vf).unwrap();
        model
    }

    fn scenario_events() -> Vec<Event> {
        (0..5)
            .map(|i| Event {
                id: EventId(i),
                ses: 1,
                sample: 0,
                magnitude: 6.0,
            })
            .collect()
    }

    fn scenario_collection(with_policy: bool) -> AssetCollection {
        let sites = vec![Site { id: SiteId(0), lon: 0.0, lat: 0.0 }];
        let mut asset = Asset::new("a1", SiteId(0), "rc");
        asset.set_value(LossType::Structural, 1000.0);
        if with_policy {
            asset.set_insurance(LossType::Structural, 0.1, 0.4);
        }
        AssetCollection::new(sites, vec![asset]).unwrap()
    }

    fn scenario_epsilons(assets: &AssetCollection) -> EpsilonMatrix {
        make_epsilons(&assets.grouped_by_site(), 5, 42, AssetCorrelation::None).unwrap()
    }

    const SCENARIO_GMVS: [f32; 5] = [0.1, 0.1, 0.3, 0.5, 0.5];

    fn scenario_input<'a>(
        assets: &'a AssetCollection,
        epsilons: &'a EpsilonMatrix,
    ) -> RiskInput<'a> {
        RiskInput {
            realization: 0,
            imt: Imt::Pga,
            site: SiteId(0),
            assets: assets.iter().collect(),
            gmvs: &SCENARIO_GMVS,
            epsilons,
        }
    }

    // ── Single-asset scenario ───────────────────────────────────────────

    #[test]
    fn per_event_losses_follow_the_vulnerability_function() {
        let assets = scenario_collection(false);
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(false))
                .unwrap();

        // 1000 * [0.05, 0.05, 0.2, 0.5, 0.5]
        let expected = [50.0, 50.0, 200.0, 500.0, 500.0];
        assert_eq!(partial.asset_losses.len(), 5);
        for (row, want) in partial.asset_losses.iter().zip(expected) {
            assert_close(row.columns.ground_up[LossType::Structural.index()], want, 1e-3);
            assert_eq!(row.asset, 0);
            assert_eq!(row.realization, 0);
        }
    }

    #[test]
    fn scenario_curve_is_well_formed() {
        let assets = scenario_collection(false);
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(false))
                .unwrap();

        assert_eq!(partial.asset_outputs.len(), 1);
        let output = &partial.asset_outputs[0];
        assert_eq!(output.loss_type, LossType::Structural);
        assert!(output.insured_curve.is_none());
        let curve = &output.curve;
        assert_eq!(curve.losses.len(), 5);
        for w in curve.poes.windows(2) {
            assert!(w[0] >= w[1], "poes must not increase: {:?}", curve.poes);
        }
        assert!(curve.average_loss > 0.0);
        assert!(curve.average_loss < 500.0);
    }

    #[test]
    fn changing_epsilons_does_not_move_mean_based_losses() {
        let assets = scenario_collection(false);
        let ones = make_epsilons(&assets.grouped_by_site(), 5, 7, AssetCorrelation::None).unwrap();
        let other = make_epsilons(&assets.grouped_by_site(), 5, 8, AssetCorrelation::None).unwrap();
        let events = scenario_events();
        let model = scenario_model();

        let a = evaluate_chunk(&[scenario_input(&assets, &ones)], &events, &model, params(false))
            .unwrap();
        let b = evaluate_chunk(&[scenario_input(&assets, &other)], &events, &model, params(false))
            .unwrap();
        for (x, y) in a.asset_losses.iter().zip(&b.asset_losses) {
            assert_eq!(x.columns, y.columns);
        }
    }

    // ── Insurance ───────────────────────────────────────────────────────

    #[test]
    fn insured_columns_apply_deductible_and_limit() {
        let assets = scenario_collection(true);
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(true))
                .unwrap();

        // ratios [0.05, 0.05, 0.2, 0.5, 0.5] under deductible 0.1, limit 0.4:
        // max(0, min(r, 0.4) - 0.1) -> [0, 0, 0.1, 0.3, 0.3]
        let expected = [0.0, 0.0, 100.0, 300.0, 300.0];
        let idx = LossType::Structural.index();
        for (row, want) in partial.asset_losses.iter().zip(expected) {
            assert_close(row.columns.insured[idx], want, 1e-3);
        }
        let output = &partial.asset_outputs[0];
        let insured = output.insured_curve.as_ref().unwrap();
        assert!(insured.average_loss <= output.curve.average_loss);
        assert!(insured.losses[insured.losses.len() - 1] <= 300.0 + 1e-6);
    }

    #[test]
    fn insurance_is_skipped_when_disabled() {
        let assets = scenario_collection(true);
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(false))
                .unwrap();
        assert!(partial.asset_outputs[0].insured_curve.is_none());
        for row in &partial.asset_losses {
            assert_eq!(row.columns.insured, [0.0; N_LOSS_TYPES]);
        }
    }

    // ── Sparsity and aggregation ────────────────────────────────────────

    #[test]
    fn zero_loss_events_produce_no_rows() {
        let assets = scenario_collection(false);
        let eps = scenario_epsilons(&assets);
        let gmvs: [f32; 3] = [0.05, 0.3, 0.02];
        let events: Vec<Event> = (0..3)
            .map(|i| Event { id: EventId(i), ses: 1, sample: 0, magnitude: 5.0 })
            .collect();
        let input = RiskInput {
            realization: 0,
            imt: Imt::Pga,
            site: SiteId(0),
            assets: assets.iter().collect(),
            gmvs: &gmvs,
            epsilons: &eps,
        };
        let partial = evaluate_chunk(&[input], &events, &scenario_model(), params(false)).unwrap();
        assert_eq!(partial.asset_losses.len(), 1);
        assert_eq!(partial.asset_losses[0].event, EventId(1));
        assert_eq!(partial.agg_losses.len(), 1);
    }

    #[test]
    fn aggregate_rows_sum_across_assets() {
        let sites = vec![Site { id: SiteId(0), lon: 0.0, lat: 0.0 }];
        let mut small = Asset::new("small", SiteId(0), "rc");
        small.set_value(LossType::Structural, 1000.0);
        let mut large = Asset::new("large", SiteId(0), "rc");
        large.set_value(LossType::Structural, 3000.0);
        let assets = AssetCollection::new(sites, vec![small, large]).unwrap();
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(false))
                .unwrap();

        assert_eq!(partial.asset_losses.len(), 10);
        assert_eq!(partial.agg_losses.len(), 5);
        let idx = LossType::Structural.index();
        let expected = [200.0, 200.0, 800.0, 2000.0, 2000.0];
        for (((_, event), row), want) in partial.agg_losses.iter().zip(expected) {
            assert!(event.0 < 5);
            assert_close(row.ground_up[idx], want, 1e-2);
        }
    }

    #[test]
    fn assets_without_a_value_for_the_loss_type_are_skipped() {
        let sites = vec![Site { id: SiteId(0), lon: 0.0, lat: 0.0 }];
        // carries no structural value at all
        let bare = Asset::new("bare", SiteId(0), "rc");
        let assets = AssetCollection::new(sites, vec![bare]).unwrap();
        let eps = scenario_epsilons(&assets);
        let input = scenario_input(&assets, &eps);
        let partial =
            evaluate_chunk(&[input], &scenario_events(), &scenario_model(), params(false))
                .unwrap();
        assert!(partial.asset_outputs.is_empty());
        assert!(partial.asset_losses.is_empty());
        assert!(partial.agg_losses.is_empty());
    }
}
