//! Event-based probabilistic seismic risk: exceedance curves, loss maps
//! and aggregate tables from stochastic event sets.

pub mod aggregation;
pub mod calculator;
pub mod config;
pub mod curves;
pub mod epsilons;
pub mod evaluator;
pub mod exposure;
pub mod hazard;
pub mod output;
pub mod parallel;
pub mod riskinput;
pub mod stats;
pub mod types;
pub mod vulnerability;

pub use {
    aggregation::{AggLoss, AggregateCurve, Aggregator, Cube, RiskOutputs},
    calculator::{CalcError, CalculationResults, EventBasedCalculator},
    config::{ConfigError, RiskConfig, VulnerabilityConfig},
    curves::{
        CurveError, LossCurve, average_loss, conditional_loss_ratio, event_based, loss_map_matrix,
    },
    epsilons::{AssetCorrelation, EpsilonError, EpsilonMatrix, make_epsilons},
    evaluator::{AssetOutput, CurveParams, EventLoss, LossColumns, RiskPartial, evaluate_chunk},
    exposure::{Asset, AssetCollection, ExposureError, Site, synthetic_portfolio},
    hazard::{Event, GmfCatalog, GmfRecord, GmfSet, MIN_GMV, synthetic_catalog},
    output::{MemorySink, NdjsonDirSink, OutputError, OutputSink, export_results},
    parallel::{TaskError, TaskManager, block_splitter, split_in_blocks},
    riskinput::{RiskInput, RiskInputError, build_inputs},
    stats::{
        LossTypeStats, StatsError, StatsOutputs, compute_stats, mean_curve, quantile_curve,
        weighted_quantile_curve,
    },
    types::{EventId, Imt, LossType, N_LOSS_TYPES, Realization, SiteId},
    vulnerability::{
        LossRatioDistribution, VulnerabilityError, VulnerabilityFunction, VulnerabilityModel,
        insured_ratio,
    },
};
